// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Fourier-transform machines: the consumers that move visibilities between a
//! [`VisBuffer`] and the sky.

use std::collections::BTreeMap;

use itertools::izip;
use log::trace;
use ndarray::prelude::*;
use rayon::prelude::*;
use thiserror::Error;

use crate::{
    buffer::{Field, VisBuffer, VisBufferError, VisCubeKind},
    c32, c64,
    polarization::CorrType,
    RADec, LMN,
};

#[derive(Error, Debug)]
pub enum FtError {
    #[error("{machine} can't {operation}")]
    Unsupported {
        machine: &'static str,
        operation: &'static str,
    },

    #[error("Point source '{name}' has a non-positive reference frequency ({freq_hz} Hz)")]
    BadReferenceFrequency { name: String, freq_hz: f64 },

    #[error(transparent)]
    Buffer(#[from] VisBufferError),
}

/// Grids visibilities from, and degrids them into, a [`VisBuffer`].
pub trait FtMachine {
    /// Grid the `kind` cube of the buffer's current sub-chunk.
    fn put(&mut self, vb: &mut VisBuffer, kind: VisCubeKind) -> Result<(), FtError>;

    /// Predict visibilities for the buffer's current sub-chunk into its model
    /// cube.
    fn get(&mut self, vb: &mut VisBuffer) -> Result<(), FtError>;
}

/// An unpolarised point source with a power-law spectrum.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PointSource {
    pub name: String,
    pub radec: RADec,
    /// Stokes I at `ref_freq_hz` \[Jy\]
    pub flux_density_jy: f64,
    /// \[Hz\]
    pub ref_freq_hz: f64,
    pub spectral_index: f64,
}

impl PointSource {
    /// Stokes I \[Jy\] at a frequency \[Hz\].
    pub fn flux_density_at(&self, freq_hz: f64) -> f64 {
        self.flux_density_jy * (freq_hz / self.ref_freq_hz).powf(self.spectral_index)
    }
}

/// How much of Stokes I an unpolarised source puts into a correlation.
fn stokes_i_coefficient(corr: CorrType) -> f64 {
    match corr {
        CorrType::XX | CorrType::YY | CorrType::RR | CorrType::LL | CorrType::I => 1.0,
        _ => 0.0,
    }
}

/// Predicts model visibilities of point sources with a direct Fourier
/// transform. Rows are predicted in parallel.
#[derive(Clone, Debug, Default)]
pub struct PointSourcePredictor {
    sources: Vec<PointSource>,
    num_rows: usize,
}

impl PointSourcePredictor {
    pub fn new(sources: Vec<PointSource>) -> Result<PointSourcePredictor, FtError> {
        if let Some(bad) = sources.iter().find(|s| s.ref_freq_hz <= 0.0) {
            return Err(FtError::BadReferenceFrequency {
                name: bad.name.clone(),
                freq_hz: bad.ref_freq_hz,
            });
        }
        Ok(PointSourcePredictor {
            sources,
            num_rows: 0,
        })
    }

    pub fn sources(&self) -> &[PointSource] {
        &self.sources
    }

    /// Rows predicted so far.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }
}

impl FtMachine for PointSourcePredictor {
    fn put(&mut self, _vb: &mut VisBuffer, _kind: VisCubeKind) -> Result<(), FtError> {
        Err(FtError::Unsupported {
            machine: "PointSourcePredictor",
            operation: "grid",
        })
    }

    fn get(&mut self, vb: &mut VisBuffer) -> Result<(), FtError> {
        vb.ensure_all(&[
            Field::Uvw,
            Field::Frequency,
            Field::PhaseCenter,
            Field::CorrType,
            Field::NRow,
        ])?;
        let fields = vb.cached();
        let lmns: Vec<LMN> = self
            .sources
            .iter()
            .map(|s| s.radec.to_lmn(fields.phase_center))
            .collect();
        let coeffs: Vec<f64> = fields
            .corr_type
            .iter()
            .map(|&c| stokes_i_coefficient(c))
            .collect();
        let freqs = &fields.frequency;
        let sources = &self.sources;

        let mut model = Array3::<c32>::zeros((fields.n_row, freqs.len(), coeffs.len()));
        model
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(fields.uvw.par_iter())
            .for_each(|(mut row, &uvw)| {
                for (mut vis_chan, &freq_hz) in izip!(row.outer_iter_mut(), freqs) {
                    let uvw = uvw.in_wavelengths(freq_hz);
                    let stokes_i: c64 = izip!(sources, &lmns)
                        .map(|(s, lmn)| c64::cis(-lmn.phase(uvw)) * s.flux_density_at(freq_hz))
                        .sum();
                    for (vis, &coeff) in izip!(vis_chan.iter_mut(), &coeffs) {
                        let v = stokes_i * coeff;
                        *vis = c32::new(v.re as f32, v.im as f32);
                    }
                }
            });
        let num_rows = fields.n_row;

        vb.set_vis_cube(VisCubeKind::Model, model)?;
        self.num_rows += num_rows;
        trace!("Predicted {} sources on {num_rows} rows", self.sources.len());
        Ok(())
    }
}

/// Accumulates the weights of unflagged visibilities, and the weighted sum of
/// the visibilities themselves. Used to check what a gridder would see.
#[derive(Clone, Debug, Default)]
pub struct WeightGridder {
    /// The sum of all unflagged weights.
    pub sum_weights: f64,
    /// The weighted sum of all unflagged visibilities.
    pub sum_weighted_vis: c64,
    /// Summed weights, keyed by spectral window channel.
    pub per_channel: BTreeMap<usize, f64>,
    pub num_rows: usize,
}

impl WeightGridder {
    pub fn new() -> WeightGridder {
        WeightGridder::default()
    }

    /// The weighted mean of the gridded visibilities; the brightness at the
    /// phase centre of a dirty image.
    pub fn mean_vis(&self) -> Option<c64> {
        (self.sum_weights > 0.0).then(|| self.sum_weighted_vis / self.sum_weights)
    }
}

impl FtMachine for WeightGridder {
    fn put(&mut self, vb: &mut VisBuffer, kind: VisCubeKind) -> Result<(), FtError> {
        vb.ensure_all(&[
            kind.field(),
            Field::FlagCube,
            Field::FlagRow,
            Field::WeightMat,
            Field::WeightSpectrum,
            Field::ChannelList,
        ])?;
        let fields = vb.cached();
        let cube = match kind {
            VisCubeKind::Observed => &fields.vis_cube,
            VisCubeKind::Model => &fields.model_cube,
            VisCubeKind::Corrected => &fields.corrected_cube,
        };

        for (r, (vis_row, flag_row_cube, &flag_row)) in
            izip!(cube.outer_iter(), fields.flag_cube.outer_iter(), &fields.flag_row).enumerate()
        {
            if flag_row {
                continue;
            }
            for (c, (vis_chan, flags, &chan)) in izip!(
                vis_row.outer_iter(),
                flag_row_cube.outer_iter(),
                &fields.channel_list
            )
            .enumerate()
            {
                for (p, (vis, &flag)) in izip!(vis_chan, flags).enumerate() {
                    if flag {
                        continue;
                    }
                    let weight = match &fields.weight_spectrum {
                        Some(ws) => ws[(r, c, p)],
                        None => fields.weight_mat[(r, p)],
                    } as f64;
                    self.sum_weights += weight;
                    self.sum_weighted_vis += c64::new(vis.re as f64, vis.im as f64) * weight;
                    *self.per_channel.entry(chan).or_default() += weight;
                }
            }
        }
        self.num_rows += fields.flag_row.len();
        Ok(())
    }

    fn get(&mut self, _vb: &mut VisBuffer) -> Result<(), FtError> {
        Err(FtError::Unsupported {
            machine: "WeightGridder",
            operation: "degrid",
        })
    }
}
