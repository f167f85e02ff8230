// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from flagging agents and the shared flag cube.

use thiserror::Error;

use super::{AgentStatus, LatticeShape};
use crate::buffer::VisBufferError;

#[derive(Error, Debug)]
pub enum FlagCubeError {
    #[error("All {max} agent bits of the flag cube are in use ({num_corrs} of the {word_bits} bits are a-priori flags)")]
    TooManyAgents {
        max: usize,
        num_corrs: usize,
        word_bits: u32,
    },

    #[error("A flag cube needs between 1 and {max} correlations, got {num_corrs}")]
    BadCorrelationCount { num_corrs: usize, max: usize },

    #[error("Correlation mask {mask:#b} doesn't select any of the {num_corrs} correlations")]
    BadCorrMask { mask: u32, num_corrs: usize },

    #[error("Agent '{name}' is {status:?}; this operation needs it to be {expected}")]
    BadStatus {
        name: String,
        status: AgentStatus,
        expected: &'static str,
    },

    #[error("Flag cube position (chan {chan}, baseline {baseline}, time {time}) is outside the lattice {shape:?}")]
    OutOfRange {
        chan: usize,
        baseline: usize,
        time: usize,
        shape: LatticeShape,
    },

    #[error("Timestamp {time} would need more than the {num_times} time slots of the flag lattice")]
    TooManyTimes { time: f64, num_times: usize },

    #[error("bad array shape supplied to argument {argument} of function {function}. expected {expected}, received {received}")]
    BadArrayShape {
        argument: String,
        function: String,
        expected: String,
        received: String,
    },

    #[error(transparent)]
    Buffer(#[from] VisBufferError),
}
