// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Spectral averaging

use std::ops::{Add, Div, Mul};

use itertools::izip;
use ndarray::{s, Array3, ArrayView3, Axis};
use num_traits::Zero;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AveragingError {
    #[error("bad array shape supplied to argument {argument} of function {function}. expected {expected}, received {received}")]
    BadArrayShape {
        argument: String,
        function: String,
        expected: String,
        received: String,
    },

    #[error("Channel bounds ({start}, {end}) for output channel {output} are invalid with {num_chans} input channels")]
    BadBounds {
        output: usize,
        start: usize,
        end: usize,
        num_chans: usize,
    },

    #[error("No channel bounds were given")]
    NoBounds,
}

/// Check inclusive `(start, end)` channel bounds against the number of input
/// channels, returning the number of input channels they cover.
pub fn check_bounds(bounds: &[(usize, usize)], num_chans: usize) -> Result<usize, AveragingError> {
    if bounds.is_empty() {
        return Err(AveragingError::NoBounds);
    }
    let mut covered = 0;
    for (output, &(start, end)) in bounds.iter().enumerate() {
        if start > end || end >= num_chans {
            return Err(AveragingError::BadBounds {
                output,
                start,
                end,
                num_chans,
            });
        }
        covered += end - start + 1;
    }
    Ok(covered)
}

/// Average the channels of a `[row][chan][corr]` cube into the inclusive
/// `(start, end)` input channel ranges in `bounds`.
///
/// `weights` and `flags` have the same shape as `data`.
///
/// # Gorey details
///
/// For each output channel, row and correlation:
/// - input channels that are unflagged with a positive weight are "good";
/// - the output weight is the sum of the good weights;
/// - if there are good channels, the output is their weighted mean, and is
///     unflagged;
/// - otherwise the output is the unweighted mean of all the input channels,
///     and is flagged.
pub fn average_channels<T>(
    data: ArrayView3<T>,
    weights: ArrayView3<f32>,
    flags: ArrayView3<bool>,
    bounds: &[(usize, usize)],
) -> Result<(Array3<T>, Array3<f32>, Array3<bool>), AveragingError>
where
    T: Copy + Zero + Add<Output = T> + Mul<f32, Output = T> + Div<f32, Output = T>,
{
    let data_dims = data.dim();
    for (argument, dims) in [("weights", weights.dim()), ("flags", flags.dim())] {
        if dims != data_dims {
            return Err(AveragingError::BadArrayShape {
                argument: argument.to_string(),
                function: "average_channels".to_string(),
                expected: format!("{data_dims:?}"),
                received: format!("{dims:?}"),
            });
        }
    }
    check_bounds(bounds, data_dims.1)?;

    let averaged_dims = (data_dims.0, bounds.len(), data_dims.2);
    let mut averaged_data = Array3::<T>::zeros(averaged_dims);
    let mut averaged_weights = Array3::<f32>::zeros(averaged_dims);
    let mut averaged_flags = Array3::<bool>::from_elem(averaged_dims, false);

    for (
        data_row,
        weight_row,
        flag_row,
        mut averaged_data_row,
        mut averaged_weight_row,
        mut averaged_flag_row,
    ) in izip!(
        data.outer_iter(),
        weights.outer_iter(),
        flags.outer_iter(),
        averaged_data.outer_iter_mut(),
        averaged_weights.outer_iter_mut(),
        averaged_flags.outer_iter_mut(),
    ) {
        for (i_out, &(start, end)) in bounds.iter().enumerate() {
            let data_chunk = data_row.slice(s![start..=end, ..]);
            let weight_chunk = weight_row.slice(s![start..=end, ..]);
            let flag_chunk = flag_row.slice(s![start..=end, ..]);
            let chunk_size = (end - start + 1) as f32;

            for (corr, ((data_corr, weight_corr), flag_corr)) in data_chunk
                .axis_iter(Axis(1))
                .zip(weight_chunk.axis_iter(Axis(1)))
                .zip(flag_chunk.axis_iter(Axis(1)))
                .enumerate()
            {
                let mut sum = T::zero();
                let mut weighted_sum = T::zero();
                let mut weight_sum = 0.0;
                for (&d, &w, &f) in izip!(data_corr.iter(), weight_corr.iter(), flag_corr.iter()) {
                    sum = sum + d;
                    if !f && w > 0.0 {
                        weighted_sum = weighted_sum + d * w;
                        weight_sum += w;
                    }
                }

                if weight_sum > 0.0 {
                    averaged_data_row[(i_out, corr)] = weighted_sum / weight_sum;
                    averaged_weight_row[(i_out, corr)] = weight_sum;
                } else {
                    averaged_data_row[(i_out, corr)] = sum / chunk_size;
                    averaged_flag_row[(i_out, corr)] = true;
                }
            }
        }
    }

    Ok((averaged_data, averaged_weights, averaged_flags))
}

/// Average a per-channel vector (e.g. channel frequencies) into the same
/// bounds as [`average_channels`].
pub fn average_vector(values: &[f64], bounds: &[(usize, usize)]) -> Vec<f64> {
    bounds
        .iter()
        .map(|&(start, end)| values[start..=end].iter().sum::<f64>() / (end - start + 1) as f64)
        .collect()
}
