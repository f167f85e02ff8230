// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use ndarray::prelude::*;

use super::*;
use crate::{
    context::PointingEntry,
    iter::{VisIterConfig, VisIterError},
    polarization::{PolarizationError, StokesRequest},
    source::{Column, ColumnSource, CountingSource, MemorySource, ReadCounter},
    synthetic::{vis_value, weight_value, SyntheticDataset},
};

fn iter_over(source: MemorySource) -> (VisIter, ReadCounter) {
    let source = CountingSource::new(source);
    let counter = source.counter();
    let iter = VisIter::new(source, VisIterConfig::default()).unwrap();
    iter.origin_chunks().unwrap();
    iter.origin();
    counter.reset();
    (iter, counter)
}

fn setup(synth: SyntheticDataset) -> (VisIter, ReadCounter) {
    iter_over(synth.build().unwrap())
}

#[test]
fn test_fields_are_read_at_most_once() {
    let (iter, counter) = setup(SyntheticDataset::default());
    let mut vb = VisBuffer::attached(&iter);
    let first = vb.vis_cube().unwrap().clone();
    let second = vb.vis_cube().unwrap().clone();
    assert_eq!(first, second);
    assert_eq!(counter.reads(Column::Data), 1);
    assert_eq!(first.dim(), (3, 3, 4));
    assert_eq!(first[(2, 1, 3)], vis_value(2, 1, 3));

    assert_eq!(vb.time().unwrap().len(), 3);
    vb.time().unwrap();
    assert_eq!(counter.reads(Column::Time), 1);
}

#[test]
fn test_advance_invalidates_everything() {
    let (iter, counter) = setup(SyntheticDataset::default());
    let mut vb = VisBuffer::attached(&iter);
    vb.ensure_all(&[Field::VisCube, Field::Antenna1, Field::Uvw])
        .unwrap();
    assert!(vb.is_valid(Field::Uvw));

    iter.advance();
    assert!(vb.valid_fields().is_empty());
    assert_eq!(vb.vis_cube().unwrap()[(0, 0, 0)], vis_value(3, 0, 0));
    assert_eq!(counter.reads(Column::Data), 2);
    assert_eq!(vb.row_ids().unwrap(), &[3, 4, 5]);
}

#[test]
fn test_prerequisites_are_filled_first() {
    let (iter, counter) = setup(SyntheticDataset::default());
    let mut vb = VisBuffer::attached(&iter);
    vb.ensure(Field::Direction1).unwrap();
    for field in Field::Direction1.all_prerequisites() {
        assert!(vb.is_valid(field), "{field} should be valid");
    }
    assert!(!vb.is_valid(Field::Direction2));
    assert!(!vb.is_valid(Field::Antenna2));
    assert_eq!(counter.reads(Column::Antenna1), 1);
    assert_eq!(counter.reads(Column::Feed1), 1);
    assert_eq!(counter.reads(Column::Time), 1);
    assert_eq!(counter.reads(Column::Data), 0);

    // Again; nothing more is read.
    let reads = counter.total_reads();
    vb.ensure(Field::Direction1).unwrap();
    vb.ensure(Field::Feed1Pa).unwrap();
    assert_eq!(counter.total_reads(), reads);
}

#[test]
fn test_fill_order_does_not_matter() {
    let (iter, _) = setup(SyntheticDataset::default());
    let mut chained = VisBuffer::attached(&iter);
    let via_chain = chained.direction1().unwrap().to_vec();
    drop(chained);

    let mut direct = VisBuffer::attached(&iter);
    direct
        .ensure_all(&[Field::Feed1, Field::Antenna1, Field::Time, Field::Feed1Pa])
        .unwrap();
    assert_eq!(direct.direction1().unwrap(), via_chain.as_slice());
}

#[test]
fn test_derived_and_shape_fields() {
    let (iter, _) = setup(SyntheticDataset::default());
    let mut vb = VisBuffer::attached(&iter);
    assert_eq!(vb.n_row().unwrap(), 3);
    assert_eq!(vb.n_channel().unwrap(), 3);
    assert_eq!(vb.n_corr().unwrap(), 4);
    assert_eq!(vb.channel_list().unwrap(), &[0, 1, 2]);
    assert_abs_diff_eq!(vb.frequency().unwrap()[2], 150.08e6);
    assert_eq!(vb.pol_frame().unwrap(), Some(PolBasis::Linear));
    assert_eq!(vb.spectral_window().unwrap(), 0);
    assert_eq!(vb.polarization_id().unwrap(), 0);

    // Weights 1, 2, 3 and 4 for the four correlations.
    assert_abs_diff_eq!(vb.weight().unwrap(), &Array1::<f32>::from_elem(3, 2.5));
    assert!(vb.flag().unwrap().iter().all(|&f| !f));
    assert_eq!(vb.flag().unwrap().dim(), (3, 3));

    let uvw = vb.uvw().unwrap()[2];
    // Row 2 is baseline (1, 2).
    assert_abs_diff_eq!(uvw.u, 100.0);
    assert_abs_diff_eq!(uvw.v, 30.0);
    assert_abs_diff_eq!(uvw.w, 1.0);

    assert_eq!(vb.antenna1().unwrap(), &[0, 0, 1]);
    assert_eq!(vb.antenna2().unwrap(), &[1, 2, 2]);
    assert_eq!(vb.scan_number().unwrap(), &[1, 1, 1]);
}

#[test]
fn test_copies() {
    let (iter, counter) = setup(SyntheticDataset::default());
    let mut vb = VisBuffer::attached(&iter);
    vb.vis_cube().unwrap();
    let mut copy = vb.try_copy().unwrap();
    assert!(copy.is_one_way());
    assert!(!copy.is_attached());
    assert_eq!(copy.valid_fields(), vb.valid_fields());
    assert_eq!(copy.vis_cube().unwrap(), vb.vis_cube().unwrap());
    assert_eq!(counter.reads(Column::Data), 1);

    // The iterator hasn't moved, so the copy may still fill fields.
    assert!(!copy.is_valid(Field::Time));
    assert_eq!(copy.time().unwrap().len(), 3);
    let generation = iter.generation();

    iter.advance();
    assert!(vb.valid_fields().is_empty());
    // The copy isn't invalidated, and still holds the old rows.
    assert_eq!(copy.vis_cube().unwrap()[(0, 0, 0)], vis_value(0, 0, 0));
    match copy.weight_mat() {
        Err(VisBufferError::StalePosition {
            field,
            copied,
            current,
        }) => {
            assert_eq!(field, Field::WeightMat);
            assert_eq!(copied, generation);
            assert_eq!(current, generation + 1);
        }
        other => panic!("expected a StalePosition error, got {other:?}"),
    }

    // Copies of copies keep the link.
    let mut copy2 = copy.try_copy().unwrap();
    assert!(matches!(
        copy2.sigma_mat(),
        Err(VisBufferError::StalePosition { .. })
    ));
    copy2.detach().unwrap();
    assert!(matches!(
        copy2.sigma_mat(),
        Err(VisBufferError::DetachedAccess { .. })
    ));
}

#[test]
fn test_deep_copy_is_detached_and_complete() {
    let synth = SyntheticDataset {
        with_model: true,
        ..Default::default()
    };
    let (iter, _) = setup(synth);
    let mut vb = VisBuffer::attached(&iter);
    let mut copy = vb.deep_copy().unwrap();
    assert_eq!(copy.valid_fields(), FieldSet::all());
    assert!(!copy.is_attached());
    assert!(!copy.is_one_way());

    iter.advance();
    assert_eq!(copy.row_ids().unwrap(), &[0, 1, 2]);
    assert_eq!(copy.vis_cube().unwrap()[(1, 2, 3)], vis_value(1, 2, 3));

    // Copying a detached buffer keeps what it has.
    copy.invalidate();
    let mut copy2 = copy.deep_copy().unwrap();
    assert!(copy2.valid_fields().is_empty());
    assert!(matches!(
        copy2.time(),
        Err(VisBufferError::DetachedAccess { field: Field::Time })
    ));
}

#[test]
fn test_detached_buffers_cannot_fill() {
    let mut vb = VisBuffer::new();
    assert!(matches!(
        vb.time(),
        Err(VisBufferError::DetachedAccess { field: Field::Time })
    ));
    assert!(matches!(
        vb.detach(),
        Err(VisBufferError::Iter(VisIterError::NotAttached))
    ));

    let (iter, _) = setup(SyntheticDataset::default());
    vb.attach(&iter).unwrap();
    assert!(matches!(
        vb.attach(&iter),
        Err(VisBufferError::Iter(VisIterError::AlreadyAttached))
    ));
    vb.time().unwrap();
    vb.detach().unwrap();
    // Valid fields survive detaching.
    assert_eq!(vb.time().unwrap().len(), 3);
    assert!(matches!(
        vb.antenna1(),
        Err(VisBufferError::DetachedAccess { .. })
    ));
}

#[test]
fn test_buffers_detach_in_lifo_order() {
    let (iter, _) = setup(SyntheticDataset::default());
    let mut a = VisBuffer::attached(&iter);
    let mut b = VisBuffer::attached(&iter);
    assert_eq!(iter.num_attached(), 2);

    assert!(matches!(
        a.detach(),
        Err(VisBufferError::Iter(VisIterError::DetachNotTop {
            depth: 1,
            stack_len: 2
        }))
    ));
    assert!(matches!(
        a.time(),
        Err(VisBufferError::NotTopOfStack { field: Field::Time })
    ));
    b.time().unwrap();

    b.detach().unwrap();
    assert_eq!(a.time().unwrap().len(), 3);
    a.detach().unwrap();
    assert_eq!(iter.num_attached(), 0);
    assert!(matches!(
        a.detach(),
        Err(VisBufferError::Iter(VisIterError::NotAttached))
    ));
}

#[test]
fn test_dropping_the_top_buffer_exposes_the_one_below() {
    let (iter, _) = setup(SyntheticDataset::default());
    let mut a = VisBuffer::attached(&iter);
    {
        let mut b = VisBuffer::attached(&iter);
        b.time().unwrap();
    }
    assert_eq!(iter.num_attached(), 1);
    assert_eq!(a.time().unwrap().len(), 3);
}

#[test]
fn test_buffers_outlive_their_iterator() {
    let (iter, _) = setup(SyntheticDataset::default());
    let mut vb = VisBuffer::attached(&iter);
    vb.vis_cube().unwrap();
    drop(iter);
    assert!(!vb.is_attached());
    assert_eq!(vb.vis_cube().unwrap()[(0, 0, 1)], vis_value(0, 0, 1));
    assert!(matches!(
        vb.flag_cube(),
        Err(VisBufferError::DetachedAccess { .. })
    ));
    vb.detach().unwrap();
}

#[test]
fn test_sort_corr_round_trip() {
    use CorrType::*;
    let synth = SyntheticDataset {
        corrs: vec![XX, YY, XY, YX],
        with_corrected: true,
        ..Default::default()
    };
    let (iter, _) = setup(synth);
    let mut vb = VisBuffer::attached(&iter);
    let native = vb.vis_cube().unwrap().clone();
    let native_weights = vb.weight_mat().unwrap().clone();
    // Nothing to undo yet.
    vb.unsort_corr();
    assert_eq!(vb.corr_order(), &CorrOrder::Native);
    assert_eq!(vb.vis_cube().unwrap(), &native);

    vb.sort_corr().unwrap();
    assert_eq!(vb.corr_order(), &CorrOrder::Canonical(vec![0, 2, 3, 1]));
    assert_eq!(vb.corr_type().unwrap(), &[XX, XY, YX, YY]);
    assert_eq!(vb.vis_cube().unwrap()[(1, 2, 1)], vis_value(1, 2, 2));
    assert_eq!(vb.weight_mat().unwrap()[(0, 3)], weight_value(1));
    // Filled after sorting, but still in canonical order.
    assert_eq!(vb.corrected_cube().unwrap()[(0, 0, 3)], vis_value(0, 0, 1));

    assert!(matches!(
        vb.try_copy(),
        Err(VisBufferError::DestructiveState { operation: "copy", .. })
    ));
    assert!(matches!(
        vb.deep_copy(),
        Err(VisBufferError::DestructiveState {
            operation: "deep copy",
            state: "correlation-sorted"
        })
    ));

    vb.unsort_corr();
    assert_eq!(vb.corr_order(), &CorrOrder::Native);
    assert_eq!(vb.vis_cube().unwrap(), &native);
    assert_eq!(vb.weight_mat().unwrap(), &native_weights);
    assert_eq!(vb.corr_type().unwrap(), &[XX, YY, XY, YX]);
    assert_eq!(vb.corrected_cube().unwrap()[(0, 0, 3)], vis_value(0, 0, 3));
    assert!(vb.try_copy().is_ok());
    let mut copy = vb.deep_copy().unwrap();
    assert_eq!(copy.vis_cube().unwrap(), &native);
    assert_eq!(copy.corr_order(), &CorrOrder::Native);
}

#[test]
fn test_sorting_canonical_correlations_does_nothing() {
    let (iter, _) = setup(SyntheticDataset::default());
    let mut vb = VisBuffer::attached(&iter);
    vb.sort_corr().unwrap();
    assert_eq!(vb.corr_order(), &CorrOrder::Native);
    vb.unsort_corr();
    assert_eq!(vb.vis_cube().unwrap()[(0, 0, 2)], vis_value(0, 0, 2));
}

#[test]
fn test_sorting_is_forgotten_when_the_iterator_moves() {
    use CorrType::*;
    let synth = SyntheticDataset {
        corrs: vec![YY, XX],
        ..Default::default()
    };
    let (iter, _) = setup(synth);
    let mut vb = VisBuffer::attached(&iter);
    vb.sort_corr().unwrap();
    assert_eq!(vb.corr_type().unwrap(), &[XX, YY]);
    iter.advance();
    assert_eq!(vb.corr_order(), &CorrOrder::Native);
    assert_eq!(vb.corr_type().unwrap(), &[YY, XX]);
}

#[test]
fn test_channel_ave() {
    let (iter, _) = setup(SyntheticDataset::default());
    let mut vb = VisBuffer::attached(&iter);
    vb.channel_ave(&[(0, 1), (2, 2)]).unwrap();
    assert!(vb.is_chan_averaged());
    assert_eq!(vb.n_channel().unwrap(), 2);
    assert_eq!(vb.channel_list().unwrap(), &[0, 2]);
    let freqs = vb.frequency().unwrap().to_vec();
    assert_abs_diff_eq!(freqs[0], 150.02e6, epsilon = 1e-3);
    assert_abs_diff_eq!(freqs[1], 150.08e6, epsilon = 1e-3);

    let vis = vb.vis_cube().unwrap();
    assert_eq!(vis.dim(), (3, 2, 4));
    // Uniform weights, so a plain mean of channels 0 and 1.
    assert_abs_diff_eq!(vis[(1, 0, 2)], c32::new(107.0, -100.5));
    assert_eq!(vis[(1, 1, 2)], vis_value(1, 2, 2));
    // Every channel was covered.
    assert_abs_diff_eq!(vb.weight_mat().unwrap()[(0, 1)], weight_value(1));
    assert_eq!(vb.flag().unwrap().dim(), (3, 2));

    // Channel-dependent fields which weren't averaged can't be filled now.
    assert!(matches!(
        vb.lsr_frequency(),
        Err(VisBufferError::DestructiveState { .. })
    ));
    vb.set_flag_cube(Array3::from_elem((3, 2, 4), true)).unwrap();
    assert!(matches!(
        vb.flush(),
        Err(VisBufferError::DestructiveState {
            operation: "flush",
            ..
        })
    ));

    // Moving on restores the dataset's layout.
    iter.advance();
    assert!(!vb.is_chan_averaged());
    assert!(vb.dirty_fields().is_empty());
    assert_eq!(vb.n_channel().unwrap(), 3);
}

#[test]
fn test_channel_ave_partial_coverage_scales_weights() {
    let synth = SyntheticDataset {
        with_weight_spectrum: true,
        ..Default::default()
    };
    let (iter, _) = setup(synth);
    let mut vb = VisBuffer::attached(&iter);
    vb.channel_ave(&[(1, 1)]).unwrap();
    let third = 1.0 / 3.0;
    assert_abs_diff_eq!(vb.weight_mat().unwrap()[(2, 3)], weight_value(3) * third);
    assert_abs_diff_eq!(
        vb.sigma_mat().unwrap()[(2, 3)],
        (1.0 / weight_value(3).sqrt()) / third.sqrt(),
        epsilon = 1e-6
    );
    let spectrum = vb.weight_spectrum().unwrap().unwrap();
    assert_eq!(spectrum.dim(), (3, 1, 4));
    assert_abs_diff_eq!(spectrum[(0, 0, 2)], weight_value(2));

    assert!(matches!(
        vb.channel_ave(&[(0, 3)]),
        Err(VisBufferError::Averaging(_))
    ));
}

#[test]
fn test_form_stokes() {
    let (iter, _) = setup(SyntheticDataset::default());
    let mut vb = VisBuffer::attached(&iter);
    vb.form_stokes(StokesRequest::Full).unwrap();
    assert!(vb.is_stokes_formed());
    assert_eq!(
        vb.corr_type().unwrap(),
        &[CorrType::I, CorrType::Q, CorrType::U, CorrType::V]
    );
    assert_eq!(vb.pol_frame().unwrap(), Some(PolBasis::Stokes));
    assert_eq!(vb.n_corr().unwrap(), 4);
    // I = (XX + YY) / 2
    assert_abs_diff_eq!(vb.vis_cube().unwrap()[(1, 2, 0)], c32::new(121.5, -120.0));
    // Weights 1 and 4 combine to 4 * 1 * 4 / 5.
    assert_abs_diff_eq!(vb.weight_mat().unwrap()[(0, 0)], 3.2, epsilon = 1e-6);

    assert!(matches!(
        vb.model_cube(),
        Err(VisBufferError::DestructiveState { .. })
    ));
    assert!(matches!(
        vb.sort_corr(),
        Err(VisBufferError::DestructiveState { .. })
    ));
    assert!(matches!(
        vb.form_stokes(StokesRequest::Full),
        Err(VisBufferError::DestructiveState { .. })
    ));
}

#[test]
fn test_form_stokes_from_one_correlation() {
    let synth = SyntheticDataset {
        corrs: vec![CorrType::XX],
        ..Default::default()
    };
    let (iter, _) = setup(synth);
    let mut vb = VisBuffer::attached(&iter);
    assert!(matches!(
        vb.form_stokes(StokesRequest::Full),
        Err(VisBufferError::UnsupportedPolarization(
            PolarizationError::NotEnoughCorrelations { num_corrs: 1, .. }
        ))
    ));
    assert!(!vb.is_stokes_formed());

    vb.form_stokes(StokesRequest::Available).unwrap();
    assert_eq!(vb.corr_type().unwrap(), &[CorrType::I]);
    assert_eq!(vb.vis_cube().unwrap()[(0, 1, 0)], vis_value(0, 1, 0));
}

#[test]
fn test_flush_writes_only_the_selection() {
    let (iter, counter) = setup(SyntheticDataset::default());
    iter.select_channel_groups(&[1], &[1], &[1], &[1]).unwrap();
    iter.origin_chunks().unwrap();
    iter.origin();
    let mut vb = VisBuffer::attached(&iter);

    let new = Array3::from_elem((3, 1, 4), c32::new(7.0, 0.0));
    assert!(matches!(
        vb.set_vis_cube(VisCubeKind::Observed, Array3::zeros((3, 3, 4))),
        Err(VisBufferError::BadArrayShape { .. })
    ));
    vb.set_vis_cube(VisCubeKind::Observed, new.clone()).unwrap();
    assert_eq!(vb.vis_cube().unwrap(), &new);
    assert!(vb.dirty_fields().contains(Field::VisCube));
    assert_eq!(vb.flush().unwrap(), 1);
    assert!(vb.dirty_fields().is_empty());
    assert_eq!(counter.writes(Column::Data), 1);

    let data = iter.with_source(|s| {
        s.get_column(Column::Data, 0..6)
            .unwrap()
            .into_complex_cube(Column::Data)
            .unwrap()
    });
    assert_eq!(data[(2, 1, 3)], c32::new(7.0, 0.0));
    assert_eq!(data[(2, 0, 3)], vis_value(2, 0, 3));
    assert_eq!(data[(2, 2, 0)], vis_value(2, 2, 0));
    assert_eq!(data[(3, 1, 0)], vis_value(3, 1, 0));

    // Nothing dirty, nothing written.
    assert_eq!(vb.flush().unwrap(), 0);
}

#[test]
fn test_unflushed_changes_are_dropped_on_move() {
    let (iter, counter) = setup(SyntheticDataset::default());
    let mut vb = VisBuffer::attached(&iter);
    vb.set_flag_cube(Array3::from_elem((3, 3, 4), true)).unwrap();
    vb.set_flag_row(Array1::from_elem(3, true)).unwrap();
    iter.advance();
    assert_eq!(vb.flush().unwrap(), 0);
    assert_eq!(counter.total_writes(), 0);
    assert!(vb.flag_cube().unwrap().iter().all(|&f| !f));
}

#[test]
fn test_setters_invalidate_derived_fields() {
    let synth = SyntheticDataset {
        with_weight_spectrum: true,
        ..Default::default()
    };
    let (iter, _) = setup(synth);
    let mut vb = VisBuffer::attached(&iter);
    assert!(!vb.flag().unwrap()[(0, 0)]);
    let mut flags = Array3::from_elem((3, 3, 4), false);
    flags[(0, 0, 2)] = true;
    vb.set_flag_cube(flags).unwrap();
    assert!(vb.flag().unwrap()[(0, 0)]);
    assert!(!vb.flag().unwrap()[(0, 1)]);

    vb.set_weight_mat(Array2::from_elem((3, 4), 8.0)).unwrap();
    assert_abs_diff_eq!(vb.weight().unwrap()[1], 8.0);

    vb.set_weight_spectrum(Array3::ones((3, 3, 4))).unwrap();
    assert_eq!(vb.weight_spectrum().unwrap().map(|w| w.dim()), Some((3, 3, 4)));
    assert_eq!(vb.flush().unwrap(), 3);
}

#[test]
fn test_optional_columns() {
    let (iter, counter) = setup(SyntheticDataset::default());
    let mut vb = VisBuffer::attached(&iter);
    assert_eq!(vb.model_cube().unwrap(), &Array3::zeros((3, 3, 4)));
    let data = vb.vis_cube().unwrap().clone();
    assert_eq!(vb.corrected_cube().unwrap(), &data);
    assert!(vb.float_cube().unwrap().is_none());
    assert!(vb.weight_spectrum().unwrap().is_none());
    assert_eq!(counter.reads(Column::ModelData), 0);

    let synth = SyntheticDataset {
        with_float: true,
        with_weight_spectrum: true,
        ..Default::default()
    };
    let (iter, _) = setup(synth);
    let mut vb = VisBuffer::attached(&iter);
    let float = vb.float_cube().unwrap().unwrap();
    assert_abs_diff_eq!(float[(1, 1, 1)], vis_value(1, 1, 1).re);
    assert!(vb.weight_spectrum().unwrap().is_some());
}

#[test]
fn test_parallactic_angles_are_computed_once_per_timestamp() {
    let (iter, _) = setup(SyntheticDataset::default());
    let mut vb = VisBuffer::attached(&iter);
    vb.ensure_all(&[Field::Feed1Pa, Field::Feed2Pa]).unwrap();
    // Three rows, one timestamp.
    assert_eq!(iter.num_pa_computations(), 1);

    // Antenna 0 sits at the array position and its feed has no receptor
    // angle.
    let par_angle = vb.par_angle().unwrap()[0];
    assert_abs_diff_eq!(vb.feed1_pa().unwrap()[0], par_angle, epsilon = 1e-10);

    iter.advance();
    vb.feed1_pa().unwrap();
    assert_eq!(iter.num_pa_computations(), 2);
}

#[test]
fn test_pointing_directions() {
    let synth = SyntheticDataset::default();
    let mut source = synth.build().unwrap();
    let pointed = RADec::from_degrees(10.0, -30.0);
    {
        let ctx = source.obs_context_mut();
        ctx.feeds[2].beam_offset = (0.01, 0.0);
        ctx.pointing.push(PointingEntry {
            antenna: 1,
            time: 0.0,
            interval: 0.0,
            direction: pointed,
        });
    }
    let (iter, _) = iter_over(source);
    let mut vb = VisBuffer::attached(&iter);

    // Rows are (0, 1), (0, 2) and (1, 2).
    let d1 = vb.direction1().unwrap().to_vec();
    assert_abs_diff_eq!(d1[0], synth.phase_centre, epsilon = 1e-12);
    assert_abs_diff_eq!(d1[2], pointed, epsilon = 1e-12);

    let pa = vb.feed2_pa().unwrap()[1];
    let d2 = vb.direction2().unwrap().to_vec();
    assert_abs_diff_eq!(d2[0], pointed, epsilon = 1e-12);
    let expected = synth
        .phase_centre
        .offset_by(0.01 * pa.cos(), 0.01 * pa.sin());
    assert_abs_diff_eq!(d2[1], expected, epsilon = 1e-12);
}

#[test]
fn test_lsr_frequencies() {
    let (iter, _) = setup(SyntheticDataset::default());
    let mut vb = VisBuffer::attached(&iter);
    let topo = vb.frequency().unwrap().to_vec();
    let lsr = vb.lsr_frequency().unwrap().to_vec();
    // Less than 1 part in 1000 (300 km/s) apart, but not the same.
    for (t, l) in topo.iter().zip(&lsr) {
        assert!((t - l).abs() / t < 1e-3);
        assert!((t - l).abs() > 0.0);
    }
    assert!(vb.is_valid(Field::PhaseCenter));
}

#[test]
fn test_fill_errors_carry_the_position() {
    let mut source = SyntheticDataset::default().build().unwrap();
    source
        .insert_column(
            Column::Antenna1,
            ColumnData::Int(Array1::from(vec![0, 0, 1, 0, 7, 1])),
        )
        .unwrap();
    let (iter, _) = iter_over(source);
    let mut vb = VisBuffer::attached(&iter);
    vb.antenna1().unwrap();
    iter.advance();
    let err = vb.antenna1().unwrap_err();
    assert_eq!(err.position().map(|p| p.rows.clone()), Some(3..6));
    assert!(matches!(
        err,
        VisBufferError::Fill {
            field: Field::Antenna1,
            source: VisIterError::BadIndex { row: 4, value: 7, .. },
            ..
        }
    ));
}
