// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Correlation types, canonical correlation ordering and Stokes formation.
//!
//! The canonical correlation order is PP, PQ, QP, QQ (XX, XY, YX, YY for a
//! linear basis, RR, RL, LR, LL for a circular basis).

use ndarray::prelude::*;
use thiserror::Error;

use crate::c32;

/// A correlation type, with the codes used by casacore's `Stokes` enum in the
/// POLARIZATION table's CORR_TYPE column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(clippy::upper_case_acronyms)]
pub enum CorrType {
    I = 1,
    Q = 2,
    U = 3,
    V = 4,
    RR = 5,
    RL = 6,
    LR = 7,
    LL = 8,
    XX = 9,
    XY = 10,
    YX = 11,
    YY = 12,
}

impl CorrType {
    /// Get the [`CorrType`] for a casacore Stokes code.
    pub fn from_code(code: i32) -> Option<CorrType> {
        use CorrType::*;
        Some(match code {
            1 => I,
            2 => Q,
            3 => U,
            4 => V,
            5 => RR,
            6 => RL,
            7 => LR,
            8 => LL,
            9 => XX,
            10 => XY,
            11 => YX,
            12 => YY,
            _ => return None,
        })
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn basis(self) -> PolBasis {
        use CorrType::*;
        match self {
            I | Q | U | V => PolBasis::Stokes,
            RR | RL | LR | LL => PolBasis::Circular,
            XX | XY | YX | YY => PolBasis::Linear,
        }
    }

    /// The position of this correlation in the canonical order of its basis.
    fn canonical_index(self) -> usize {
        use CorrType::*;
        match self {
            I | RR | XX => 0,
            Q | RL | XY => 1,
            U | LR | YX => 2,
            V | LL | YY => 3,
        }
    }
}

impl std::fmt::Display for CorrType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The polarization basis of a set of correlations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PolBasis {
    Linear,
    Circular,
    Stokes,
}

/// Get the common basis of some correlations. `None` if the correlations are
/// empty or mix bases.
pub fn common_basis(corrs: &[CorrType]) -> Option<PolBasis> {
    let basis = corrs.first()?.basis();
    corrs.iter().all(|c| c.basis() == basis).then_some(basis)
}

/// Get the permutation that puts `corrs` into canonical order, i.e. the
/// returned `perm` satisfies `canonical[i] = native[perm[i]]`. `None` if the
/// correlations are already canonical or the basis is mixed.
pub fn canonical_permutation(corrs: &[CorrType]) -> Option<Vec<usize>> {
    common_basis(corrs)?;
    let mut perm: Vec<usize> = (0..corrs.len()).collect();
    perm.sort_by_key(|&i| corrs[i].canonical_index());
    if perm.iter().enumerate().all(|(i, &p)| i == p) {
        None
    } else {
        Some(perm)
    }
}

/// The inverse of a permutation.
pub fn invert_permutation(perm: &[usize]) -> Vec<usize> {
    let mut inv = vec![0; perm.len()];
    for (i, &p) in perm.iter().enumerate() {
        inv[p] = i;
    }
    inv
}

/// Which Stokes parameters to form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StokesRequest {
    /// Form whatever the correlations support: I from one correlation, I and V
    /// (circular) or I and Q (linear) from two, all four from four.
    #[default]
    Available,
    /// Form I, Q, U and V. Requires four correlations.
    Full,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PolarizationError {
    #[error("Cannot form all four Stokes parameters from {num_corrs} correlation(s) ({corrs})")]
    NotEnoughCorrelations { num_corrs: usize, corrs: String },

    #[error("Cannot form Stokes parameters from correlations {corrs}: unsupported basis")]
    UnsupportedBasis { corrs: String },

    #[error("Cannot form Stokes parameters from {num_corrs} correlations")]
    UnsupportedCount { num_corrs: usize },
}

/// How one output Stokes parameter is made from the input correlations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Combination {
    /// The input correlation itself.
    Copy(usize),
    /// `(a + b) / 2`
    Half(usize, usize),
    /// `(a - b) / 2`
    HalfDiff(usize, usize),
    /// `-i (a - b) / 2`
    ImagHalfDiff(usize, usize),
}

impl Combination {
    fn inputs(self) -> (usize, Option<usize>) {
        match self {
            Combination::Copy(a) => (a, None),
            Combination::Half(a, b)
            | Combination::HalfDiff(a, b)
            | Combination::ImagHalfDiff(a, b) => (a, Some(b)),
        }
    }
}

/// A precomputed recipe turning correlations into Stokes parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct StokesPlan {
    num_input_corrs: usize,
    outputs: Vec<(CorrType, Combination)>,
}

impl StokesPlan {
    /// Work out how to form Stokes parameters from `corrs`. The correlations
    /// may be in any order.
    pub fn new(
        corrs: &[CorrType],
        request: StokesRequest,
    ) -> Result<StokesPlan, PolarizationError> {
        use CorrType::*;
        let corrs_str = || format!("{corrs:?}");
        let basis = common_basis(corrs).ok_or_else(|| PolarizationError::UnsupportedBasis {
            corrs: corrs_str(),
        })?;
        if basis == PolBasis::Stokes {
            return Err(PolarizationError::UnsupportedBasis { corrs: corrs_str() });
        }
        if request == StokesRequest::Full && corrs.len() != 4 {
            return Err(PolarizationError::NotEnoughCorrelations {
                num_corrs: corrs.len(),
                corrs: corrs_str(),
            });
        }
        let pos = |c: CorrType| corrs.iter().position(|&x| x == c);
        let not_supported = || PolarizationError::UnsupportedBasis { corrs: corrs_str() };

        let outputs = match (corrs.len(), basis) {
            (1, _) => vec![(I, Combination::Copy(0))],
            (2, PolBasis::Linear) => {
                let (xx, yy) = pos(XX).zip(pos(YY)).ok_or_else(not_supported)?;
                vec![
                    (I, Combination::Half(xx, yy)),
                    (Q, Combination::HalfDiff(xx, yy)),
                ]
            }
            (2, _) => {
                let (rr, ll) = pos(RR).zip(pos(LL)).ok_or_else(not_supported)?;
                vec![
                    (I, Combination::Half(rr, ll)),
                    (V, Combination::HalfDiff(rr, ll)),
                ]
            }
            (4, PolBasis::Linear) => {
                let (xx, xy, yx, yy) = (
                    pos(XX).ok_or_else(not_supported)?,
                    pos(XY).ok_or_else(not_supported)?,
                    pos(YX).ok_or_else(not_supported)?,
                    pos(YY).ok_or_else(not_supported)?,
                );
                vec![
                    (I, Combination::Half(xx, yy)),
                    (Q, Combination::HalfDiff(xx, yy)),
                    (U, Combination::Half(xy, yx)),
                    (V, Combination::ImagHalfDiff(xy, yx)),
                ]
            }
            (4, _) => {
                let (rr, rl, lr, ll) = (
                    pos(RR).ok_or_else(not_supported)?,
                    pos(RL).ok_or_else(not_supported)?,
                    pos(LR).ok_or_else(not_supported)?,
                    pos(LL).ok_or_else(not_supported)?,
                );
                vec![
                    (I, Combination::Half(rr, ll)),
                    (Q, Combination::Half(rl, lr)),
                    (U, Combination::ImagHalfDiff(rl, lr)),
                    (V, Combination::HalfDiff(rr, ll)),
                ]
            }
            (n, _) => return Err(PolarizationError::UnsupportedCount { num_corrs: n }),
        };

        Ok(StokesPlan {
            num_input_corrs: corrs.len(),
            outputs,
        })
    }

    pub fn num_input_corrs(&self) -> usize {
        self.num_input_corrs
    }

    /// The correlation types of the output.
    pub fn output_types(&self) -> Vec<CorrType> {
        self.outputs.iter().map(|(c, _)| *c).collect()
    }

    /// Form Stokes visibilities from a `[row][chan][corr]` cube.
    pub fn apply_vis(&self, vis: ArrayView3<c32>) -> Array3<c32> {
        let (num_rows, num_chans, _) = vis.dim();
        let half = c32::new(0.5, 0.0);
        let minus_half_i = c32::new(0.0, -0.5);
        Array3::from_shape_fn((num_rows, num_chans, self.outputs.len()), |(r, c, o)| {
            let v = vis.slice(s![r, c, ..]);
            match self.outputs[o].1 {
                Combination::Copy(a) => v[a],
                Combination::Half(a, b) => (v[a] + v[b]) * half,
                Combination::HalfDiff(a, b) => (v[a] - v[b]) * half,
                Combination::ImagHalfDiff(a, b) => (v[a] - v[b]) * minus_half_i,
            }
        })
    }

    /// Form Stokes float data (e.g. single-dish FLOAT_DATA). The imaginary
    /// combination has no real counterpart, so it yields zero.
    pub fn apply_float(&self, data: ArrayView3<f32>) -> Array3<f32> {
        let (num_rows, num_chans, _) = data.dim();
        Array3::from_shape_fn((num_rows, num_chans, self.outputs.len()), |(r, c, o)| {
            let d = data.slice(s![r, c, ..]);
            match self.outputs[o].1 {
                Combination::Copy(a) => d[a],
                Combination::Half(a, b) => (d[a] + d[b]) * 0.5,
                Combination::HalfDiff(a, b) => (d[a] - d[b]) * 0.5,
                Combination::ImagHalfDiff(..) => 0.0,
            }
        })
    }

    /// Form Stokes flags: an output is flagged if any contributing input is.
    pub fn apply_flags(&self, flags: ArrayView3<bool>) -> Array3<bool> {
        let (num_rows, num_chans, _) = flags.dim();
        Array3::from_shape_fn((num_rows, num_chans, self.outputs.len()), |(r, c, o)| {
            let (a, b) = self.outputs[o].1.inputs();
            flags[(r, c, a)] || b.map(|b| flags[(r, c, b)]).unwrap_or(false)
        })
    }

    /// Form Stokes weights from `[row][corr]` (or, via
    /// [`StokesPlan::apply_weight_spectrum`], `[row][chan][corr]`) weights.
    /// Combining two inputs gives `4 wa wb / (wa + wb)`, the inverse variance
    /// of their half-sum.
    pub fn apply_weights(&self, weights: ArrayView2<f32>) -> Array2<f32> {
        let (num_rows, _) = weights.dim();
        Array2::from_shape_fn((num_rows, self.outputs.len()), |(r, o)| {
            let (a, b) = self.outputs[o].1.inputs();
            combine_weights(weights[(r, a)], b.map(|b| weights[(r, b)]))
        })
    }

    pub fn apply_weight_spectrum(&self, weights: ArrayView3<f32>) -> Array3<f32> {
        let (num_rows, num_chans, _) = weights.dim();
        Array3::from_shape_fn((num_rows, num_chans, self.outputs.len()), |(r, c, o)| {
            let (a, b) = self.outputs[o].1.inputs();
            combine_weights(weights[(r, c, a)], b.map(|b| weights[(r, c, b)]))
        })
    }

    /// Form Stokes sigmas from `[row][corr]` sigmas: `sqrt(sa^2 + sb^2) / 2`.
    pub fn apply_sigmas(&self, sigmas: ArrayView2<f32>) -> Array2<f32> {
        let (num_rows, _) = sigmas.dim();
        Array2::from_shape_fn((num_rows, self.outputs.len()), |(r, o)| {
            let (a, b) = self.outputs[o].1.inputs();
            match b {
                None => sigmas[(r, a)],
                Some(b) => sigmas[(r, a)].hypot(sigmas[(r, b)]) / 2.0,
            }
        })
    }
}

fn combine_weights(wa: f32, wb: Option<f32>) -> f32 {
    match wb {
        None => wa,
        Some(wb) => {
            let sum = wa + wb;
            if sum > 0.0 {
                4.0 * wa * wb / sum
            } else {
                0.0
            }
        }
    }
}
