// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Operations which reshape a buffer's contents in place: correlation
//! sorting, channel averaging and Stokes formation.
//!
//! Averaging and Stokes formation are destructive. Afterwards the buffer no
//! longer matches the dataset's layout, so it can't be flushed, and fields
//! with the changed axis can't be filled until the iterator moves.

use log::trace;
use ndarray::prelude::*;

use super::{CorrOrder, Field, VisBuffer, VisBufferError, VisFields};
use crate::{
    averaging::{average_channels, average_vector, check_bounds},
    polarization::{canonical_permutation, invert_permutation, PolBasis, StokesPlan, StokesRequest},
};

/// Fields whose last axis (or elements) are correlations.
const CORR_FIELDS: [Field; 9] = [
    Field::FlagCube,
    Field::VisCube,
    Field::ModelCube,
    Field::CorrectedCube,
    Field::FloatCube,
    Field::WeightMat,
    Field::WeightSpectrum,
    Field::SigmaMat,
    Field::CorrType,
];

/// Reorder the correlations of one field so that position `i` holds what was
/// at `perm[i]`. Fields without a correlation axis are untouched.
pub(super) fn permute_field(store: &mut VisFields, field: Field, perm: &[usize]) {
    match field {
        Field::FlagCube => store.flag_cube = store.flag_cube.select(Axis(2), perm),
        Field::VisCube => store.vis_cube = store.vis_cube.select(Axis(2), perm),
        Field::ModelCube => store.model_cube = store.model_cube.select(Axis(2), perm),
        Field::CorrectedCube => store.corrected_cube = store.corrected_cube.select(Axis(2), perm),
        Field::FloatCube => {
            store.float_cube = store.float_cube.as_ref().map(|c| c.select(Axis(2), perm));
        }
        Field::WeightMat => store.weight_mat = store.weight_mat.select(Axis(1), perm),
        Field::WeightSpectrum => {
            store.weight_spectrum = store
                .weight_spectrum
                .as_ref()
                .map(|c| c.select(Axis(2), perm));
        }
        Field::SigmaMat => store.sigma_mat = store.sigma_mat.select(Axis(1), perm),
        Field::CorrType => store.corr_type = perm.iter().map(|&p| store.corr_type[p]).collect(),
        _ => (),
    }
}

impl VisBuffer {
    /// Put the correlations of every correlation-axis field into canonical
    /// order. Fields filled later are reordered as they are filled. Does
    /// nothing if the correlations are already canonical.
    pub fn sort_corr(&mut self) -> Result<(), VisBufferError> {
        self.sync();
        if self.stokes_formed {
            return Err(VisBufferError::DestructiveState {
                operation: "sort the correlations of",
                state: "Stokes-formed",
            });
        }
        if matches!(self.corr_order, CorrOrder::Canonical(_)) {
            return Ok(());
        }
        for field in [
            Field::CorrType,
            Field::VisCube,
            Field::FlagCube,
            Field::WeightMat,
        ] {
            self.ensure_inner(field)?;
        }
        let perm = match canonical_permutation(&self.store.corr_type) {
            Some(perm) => perm,
            None => {
                trace!("Correlations {:?} need no sorting", self.store.corr_type);
                return Ok(());
            }
        };
        let valid = self.valid_fields();
        for field in CORR_FIELDS.into_iter().filter(|&f| valid.contains(f)) {
            permute_field(&mut self.store, field, &perm);
        }
        self.corr_order = CorrOrder::Canonical(perm);
        Ok(())
    }

    /// Undo [`VisBuffer::sort_corr`]. Does nothing if the buffer isn't
    /// sorted.
    pub fn unsort_corr(&mut self) {
        self.sync();
        let perm = match std::mem::take(&mut self.corr_order) {
            CorrOrder::Native => return,
            CorrOrder::Canonical(perm) => perm,
        };
        let inverse = invert_permutation(&perm);
        let valid = self.valid_fields();
        for field in CORR_FIELDS.into_iter().filter(|&f| valid.contains(f)) {
            permute_field(&mut self.store, field, &inverse);
        }
    }

    /// Average channels into the inclusive `(start, end)` ranges of `bounds`
    /// (indices into the buffer's current channels).
    ///
    /// Visibilities are weighted means over unflagged channels; an output
    /// channel with no good input is flagged. Weights scale by the fraction
    /// of input channels covered, sigmas by its inverse square root.
    pub fn channel_ave(&mut self, bounds: &[(usize, usize)]) -> Result<(), VisBufferError> {
        self.sync();
        for field in [
            Field::VisCube,
            Field::FlagCube,
            Field::WeightMat,
            Field::SigmaMat,
            Field::Frequency,
            Field::ChannelList,
            Field::WeightSpectrum,
            Field::NChannel,
        ] {
            self.ensure_inner(field)?;
        }
        let valid = self.valid_fields();
        let s = &mut self.store;
        let num_chans = s.vis_cube.len_of(Axis(1));
        let covered = check_bounds(bounds, num_chans)?;

        let weights = match &s.weight_spectrum {
            Some(spectrum) => spectrum.clone(),
            None => {
                let weight_mat = &s.weight_mat;
                Array3::from_shape_fn(s.vis_cube.dim(), |(r, _, p)| weight_mat[(r, p)])
            }
        };
        let (vis, averaged_weights, flags) =
            average_channels(s.vis_cube.view(), weights.view(), s.flag_cube.view(), bounds)?;
        if valid.contains(Field::ModelCube) {
            s.model_cube = average_channels(
                s.model_cube.view(),
                weights.view(),
                s.flag_cube.view(),
                bounds,
            )?
            .0;
        }
        if valid.contains(Field::CorrectedCube) {
            s.corrected_cube = average_channels(
                s.corrected_cube.view(),
                weights.view(),
                s.flag_cube.view(),
                bounds,
            )?
            .0;
        }
        if let (true, Some(float)) = (valid.contains(Field::FloatCube), &s.float_cube) {
            s.float_cube =
                Some(average_channels(float.view(), weights.view(), s.flag_cube.view(), bounds)?.0);
        }
        s.vis_cube = vis;
        s.flag_cube = flags;
        if s.weight_spectrum.is_some() {
            s.weight_spectrum = Some(averaged_weights);
        }

        let scale = covered as f32 / num_chans as f32;
        s.weight_mat.mapv_inplace(|w| w * scale);
        s.sigma_mat.mapv_inplace(|sigma| sigma / scale.sqrt());

        s.frequency = average_vector(&s.frequency, bounds);
        if valid.contains(Field::LsrFrequency) {
            s.lsr_frequency = average_vector(&s.lsr_frequency, bounds);
        }
        s.channel_list = bounds.iter().map(|&(start, _)| s.channel_list[start]).collect();
        s.n_channel = bounds.len();

        for field in [Field::Flag, Field::Weight, Field::Sigma] {
            self.mark_invalid(field);
        }
        self.chan_averaged = true;
        trace!("Averaged {num_chans} channels into {}", bounds.len());
        Ok(())
    }

    /// Replace the correlations with Stokes parameters.
    pub fn form_stokes(&mut self, request: StokesRequest) -> Result<(), VisBufferError> {
        self.sync();
        if self.stokes_formed {
            return Err(VisBufferError::DestructiveState {
                operation: "form Stokes parameters from",
                state: "Stokes-formed",
            });
        }
        for field in [
            Field::CorrType,
            Field::VisCube,
            Field::FlagCube,
            Field::WeightMat,
            Field::SigmaMat,
            Field::WeightSpectrum,
        ] {
            self.ensure_inner(field)?;
        }
        let plan = StokesPlan::new(&self.store.corr_type, request)?;
        let valid = self.valid_fields();
        let s = &mut self.store;

        s.vis_cube = plan.apply_vis(s.vis_cube.view());
        if valid.contains(Field::ModelCube) {
            s.model_cube = plan.apply_vis(s.model_cube.view());
        }
        if valid.contains(Field::CorrectedCube) {
            s.corrected_cube = plan.apply_vis(s.corrected_cube.view());
        }
        if valid.contains(Field::FloatCube) {
            s.float_cube = s.float_cube.as_ref().map(|f| plan.apply_float(f.view()));
        }
        s.flag_cube = plan.apply_flags(s.flag_cube.view());
        s.weight_mat = plan.apply_weights(s.weight_mat.view());
        s.sigma_mat = plan.apply_sigmas(s.sigma_mat.view());
        s.weight_spectrum = s
            .weight_spectrum
            .as_ref()
            .map(|w| plan.apply_weight_spectrum(w.view()));
        s.corr_type = plan.output_types();
        s.n_corr = s.corr_type.len();
        s.pol_frame = Some(PolBasis::Stokes);

        for field in [Field::CorrType, Field::NCorr, Field::PolFrame] {
            self.mark_valid(field);
        }
        for field in [Field::Flag, Field::Weight, Field::Sigma] {
            self.mark_invalid(field);
        }
        self.corr_order = CorrOrder::Native;
        self.stokes_formed = true;
        trace!("Formed Stokes {:?}", self.store.corr_type);
        Ok(())
    }
}
