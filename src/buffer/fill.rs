// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Filling single fields, either from the iterator or from other fields.

use log::{debug, trace};
use ndarray::prelude::*;

use super::{transform::permute_field, CorrOrder, Field, VisBuffer, VisBufferError, VisFields};
use crate::{
    iter::{to_index, IterState, VisIterError},
    polarization::common_basis,
    pos::{get_parallactic_angle, lsr::topo_to_lsrk},
    source::{Column, ColumnData},
    RADec, UVW,
};

impl VisBuffer {
    /// Fill one field. Its prerequisites are already valid.
    pub(super) fn fill(&mut self, field: Field) -> Result<(), VisBufferError> {
        if field.is_derived() {
            derive(&mut self.store, field);
            return Ok(());
        }
        if self.chan_averaged && field.has_chan_axis() {
            return Err(VisBufferError::DestructiveState {
                operation: "fill a channel-dependent field of",
                state: "channel-averaged",
            });
        }
        if self.stokes_formed && field.has_corr_axis() {
            return Err(VisBufferError::DestructiveState {
                operation: "fill a correlation-dependent field of",
                state: "Stokes-formed",
            });
        }

        let iter = self.pull_link(field)?;
        let mut state = iter.borrow_mut();
        trace!("Filling {field} at {}", state.position());
        if let Err(source) = read(&mut self.store, &mut state, field) {
            return Err(VisBufferError::Fill {
                field,
                position: state.position(),
                source,
            });
        }
        drop(state);

        if let CorrOrder::Canonical(perm) = &self.corr_order {
            permute_field(&mut self.store, field, perm);
        }
        Ok(())
    }
}

/// Compute a field which only depends on other fields of the buffer.
fn derive(store: &mut VisFields, field: Field) {
    match field {
        Field::Uvw => {
            store.uvw = store
                .uvw_mat
                .outer_iter()
                .map(|row| UVW::from_array([row[0], row[1], row[2]]))
                .collect();
        }
        Field::Weight => store.weight = mean_over_corrs(store.weight_mat.view()),
        Field::Sigma => store.sigma = mean_over_corrs(store.sigma_mat.view()),
        Field::Flag => {
            store.flag = store
                .flag_cube
                .map_axis(Axis(2), |corrs| corrs.iter().any(|&f| f));
        }
        Field::PolFrame => store.pol_frame = common_basis(&store.corr_type),
        _ => unreachable!("{field} is not derived"),
    }
}

fn mean_over_corrs(a: ArrayView2<f32>) -> Array1<f32> {
    a.mean_axis(Axis(1))
        .unwrap_or_else(|| Array1::zeros(a.len_of(Axis(0))))
}

fn get(state: &IterState, column: Column) -> Result<ColumnData, VisIterError> {
    Ok(state.source().get_column(column, state.rows())?)
}

fn get_sliced(state: &IterState, column: Column) -> Result<ColumnData, VisIterError> {
    Ok(state
        .source()
        .get_column_sliced(column, state.rows(), &state.slicer())?)
}

fn ints(state: &IterState, column: Column) -> Result<Vec<i32>, VisIterError> {
    if !state.source().has_column(column)
        && matches!(column, Column::ArrayId | Column::FieldId)
    {
        return Ok(vec![0; state.rows().len()]);
    }
    Ok(get(state, column)?.into_int(column)?.to_vec())
}

/// Read an id column whose values index a table with `len` entries.
fn indices(state: &IterState, column: Column, len: usize) -> Result<Vec<usize>, VisIterError> {
    let start = state.rows().start;
    ints(state, column)?
        .into_iter()
        .enumerate()
        .map(|(i, v)| to_index(column, start + i, v, len))
        .collect()
}

fn floats(state: &IterState, column: Column) -> Result<Vec<f64>, VisIterError> {
    Ok(get(state, column)?.into_float64(column)?.to_vec())
}

/// The field of the current chunk.
fn chunk_field(state: &IterState) -> usize {
    state.chunk().map(|c| c.field).unwrap_or(0)
}

/// Per-row feed parallactic angles: the antenna's parallactic angle plus the
/// feed's receptor angle.
fn feed_angles(
    state: &mut IterState,
    ants: &[usize],
    feeds: &[usize],
    times: &[f64],
) -> Result<Vec<f64>, VisIterError> {
    let field = chunk_field(state);
    let mut angles = Vec::with_capacity(ants.len());
    for ((&ant, &feed), &time) in ants.iter().zip(feeds).zip(times) {
        let pas = state.antenna_parallactic_angles(time, field)?;
        let receptor = state
            .obs_context()
            .feed(ant, feed)
            .map(|f| f.receptor_angle)
            .unwrap_or(0.0);
        angles.push(pas[ant] + receptor);
    }
    Ok(angles)
}

/// Per-row pointing directions of one side of each baseline. Antennas
/// without a POINTING entry look at the phase centre; feeds with a beam
/// offset are offset from there, rotated by the feed's parallactic angle.
fn directions(
    state: &IterState,
    ants: &[usize],
    feeds: &[usize],
    times: &[f64],
    pas: &[f64],
) -> Vec<RADec> {
    let obs_context = state.obs_context();
    let phase_centre = obs_context
        .phase_centres
        .get(chunk_field(state))
        .copied()
        .unwrap_or_default();
    itertools::izip!(ants, feeds, times, pas)
        .map(|(&ant, &feed, &time, &pa)| {
            let base = obs_context
                .pointing_direction(ant, time)
                .unwrap_or(phase_centre);
            match obs_context.feed(ant, feed).map(|f| f.beam_offset) {
                Some((dx, dy)) if dx != 0.0 || dy != 0.0 => {
                    let (s, c) = pa.sin_cos();
                    base.offset_by(dx * c - dy * s, dx * s + dy * c)
                }
                _ => base,
            }
        })
        .collect()
}

/// Read one field from the iterator's dataset into `store`.
fn read(store: &mut VisFields, state: &mut IterState, field: Field) -> Result<(), VisIterError> {
    let num_ants = state.obs_context().num_ants();
    let num_feeds = state.obs_context().feeds.len();
    match field {
        Field::Antenna1 => store.antenna1 = indices(state, Column::Antenna1, num_ants)?,
        Field::Antenna2 => store.antenna2 = indices(state, Column::Antenna2, num_ants)?,
        Field::Feed1 => store.feed1 = indices(state, Column::Feed1, num_feeds)?,
        Field::Feed2 => store.feed2 = indices(state, Column::Feed2, num_feeds)?,
        Field::ArrayId => store.array_id = ints(state, Column::ArrayId)?,
        Field::FieldId => store.field_id = ints(state, Column::FieldId)?,
        Field::DataDescId => store.data_desc_id = ints(state, Column::DataDescId)?,
        Field::ObservationId => store.observation_id = ints(state, Column::ObservationId)?,
        Field::ProcessorId => store.processor_id = ints(state, Column::ProcessorId)?,
        Field::StateId => store.state_id = ints(state, Column::StateId)?,
        Field::ScanNumber => store.scan_number = ints(state, Column::ScanNumber)?,

        Field::SpectralWindow | Field::PolarizationId => {
            let obs_context = state.obs_context();
            let data_desc = match store.data_desc_id.first() {
                Some(&ddid) => to_index(
                    Column::DataDescId,
                    state.rows().start,
                    ddid,
                    obs_context.data_descriptions.len(),
                )?,
                None => state.chunk().map(|c| c.data_desc).unwrap_or(0),
            };
            let dd = obs_context.data_descriptions.get(data_desc).ok_or(
                VisIterError::BadIndex {
                    column: Column::DataDescId,
                    row: state.rows().start,
                    value: data_desc as i64,
                    len: obs_context.data_descriptions.len(),
                },
            )?;
            if field == Field::SpectralWindow {
                store.spectral_window = dd.spw;
            } else {
                store.polarization_id = dd.polarization;
            }
        }

        Field::Time => store.time = floats(state, Column::Time)?,
        Field::TimeInterval => store.time_interval = floats(state, Column::Interval)?,
        Field::TimeCentroid => store.time_centroid = floats(state, Column::TimeCentroid)?,
        Field::Exposure => store.exposure = floats(state, Column::Exposure)?,
        Field::UvwMat => {
            store.uvw_mat = get(state, Column::Uvw)?.into_float64_matrix(Column::Uvw)?;
        }
        Field::FlagRow => store.flag_row = get(state, Column::FlagRow)?.into_bool(Column::FlagRow)?,
        Field::FlagCube => {
            store.flag_cube = get_sliced(state, Column::Flag)?.into_bool_cube(Column::Flag)?;
        }
        Field::VisCube => {
            store.vis_cube = get_sliced(state, Column::Data)?.into_complex_cube(Column::Data)?;
        }
        Field::ModelCube => {
            store.model_cube = if state.source().has_column(Column::ModelData) {
                get_sliced(state, Column::ModelData)?.into_complex_cube(Column::ModelData)?
            } else {
                Array3::zeros(state.cube_shape())
            };
        }
        Field::CorrectedCube => {
            store.corrected_cube = if state.source().has_column(Column::CorrectedData) {
                get_sliced(state, Column::CorrectedData)?
                    .into_complex_cube(Column::CorrectedData)?
            } else {
                debug!("CORRECTED_DATA is absent; using DATA");
                get_sliced(state, Column::Data)?.into_complex_cube(Column::Data)?
            };
        }
        Field::FloatCube => {
            store.float_cube = if state.source().has_column(Column::FloatData) {
                Some(get_sliced(state, Column::FloatData)?.into_float_cube(Column::FloatData)?)
            } else {
                None
            };
        }
        Field::WeightMat => {
            store.weight_mat =
                get_sliced(state, Column::Weight)?.into_float_matrix(Column::Weight)?;
        }
        Field::WeightSpectrum => {
            store.weight_spectrum = if state.source().has_column(Column::WeightSpectrum) {
                Some(
                    get_sliced(state, Column::WeightSpectrum)?
                        .into_float_cube(Column::WeightSpectrum)?,
                )
            } else {
                None
            };
        }
        Field::SigmaMat => {
            store.sigma_mat = get_sliced(state, Column::Sigma)?.into_float_matrix(Column::Sigma)?;
        }

        Field::Frequency => {
            let spw = &state.obs_context().spectral_windows[store.spectral_window];
            store.frequency = state
                .channels()
                .into_iter()
                .map(|c| spw.chan_freqs_hz[c])
                .collect();
        }
        Field::LsrFrequency => {
            let is_lsrk = state.obs_context().spectral_windows[store.spectral_window].is_lsrk;
            store.lsr_frequency = match store.time.first() {
                Some(&time) if !is_lsrk => {
                    topo_to_lsrk(&store.frequency, store.phase_center, time)
                }
                _ => store.frequency.clone(),
            };
        }
        Field::ChannelList => store.channel_list = state.channels(),
        Field::NChannel => store.n_channel = state.cube_shape().1,
        Field::NCorr => store.n_corr = state.cube_shape().2,
        Field::NRow => store.n_row = state.cube_shape().0,
        Field::CorrType => {
            let corrs = &state.obs_context().polarizations[store.polarization_id];
            store.corr_type = state
                .corr_indices()
                .into_iter()
                .map(|i| corrs[i])
                .collect();
        }
        Field::PhaseCenter => {
            let obs_context = state.obs_context();
            let field_id = match store.field_id.first() {
                Some(&f) => to_index(
                    Column::FieldId,
                    state.rows().start,
                    f,
                    obs_context.phase_centres.len(),
                )?,
                None => chunk_field(state),
            };
            store.phase_center = obs_context.phase_centres[field_id];
        }

        Field::Feed1Pa => {
            store.feed1_pa = feed_angles(state, &store.antenna1, &store.feed1, &store.time)?;
        }
        Field::Feed2Pa => {
            store.feed2_pa = feed_angles(state, &store.antenna2, &store.feed2, &store.time)?;
        }
        Field::ParAngle => {
            let obs_context = state.obs_context();
            let phase_centre = obs_context.phase_centres[chunk_field(state)];
            store.par_angle = store
                .time
                .iter()
                .map(|&t| get_parallactic_angle(obs_context.array_pos, phase_centre, t))
                .collect();
        }
        Field::Direction1 => {
            store.direction1 = directions(
                state,
                &store.antenna1,
                &store.feed1,
                &store.time,
                &store.feed1_pa,
            );
        }
        Field::Direction2 => {
            store.direction2 = directions(
                state,
                &store.antenna2,
                &store.feed2,
                &store.time,
                &store.feed2_pa,
            );
        }
        Field::RowIds => store.row_ids = state.rows().collect(),

        Field::Uvw | Field::Weight | Field::Sigma | Field::Flag | Field::PolFrame => {
            derive(store, field)
        }
    }
    Ok(())
}
