// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from filling, reshaping or writing back a [`VisBuffer`](super::VisBuffer).

use thiserror::Error;

use super::Field;
use crate::{
    averaging::AveragingError,
    iter::{ChunkPosition, VisIterError},
    polarization::PolarizationError,
    source::ColumnSourceError,
};

#[derive(Error, Debug)]
pub enum VisBufferError {
    #[error("{field} is not valid, and this buffer has no iterator to fill it from")]
    DetachedAccess { field: Field },

    #[error("{field} is not valid, and this buffer is not the top of its iterator's buffer stack")]
    NotTopOfStack { field: Field },

    #[error("{field} is not valid, and the iterator has moved since this copy was made (generation {copied}, now {current})")]
    StalePosition {
        field: Field,
        copied: u64,
        current: u64,
    },

    #[error("Cannot {operation} a buffer which is {state}")]
    DestructiveState {
        operation: &'static str,
        state: &'static str,
    },

    #[error(transparent)]
    UnsupportedPolarization(#[from] PolarizationError),

    #[error("Could not fill {field} at {position}: {source}")]
    Fill {
        field: Field,
        position: ChunkPosition,
        source: VisIterError,
    },

    #[error("Could not write {field} at {position}: {source}")]
    Flush {
        field: Field,
        position: ChunkPosition,
        source: ColumnSourceError,
    },

    #[error(transparent)]
    Iter(#[from] VisIterError),

    #[error(transparent)]
    Averaging(#[from] AveragingError),

    #[error("bad array shape supplied to argument {argument} of function {function}. expected {expected}, received {received}")]
    BadArrayShape {
        argument: String,
        function: String,
        expected: String,
        received: String,
    },
}

impl VisBufferError {
    /// The iterator position at which a fill or flush failed, if this error
    /// came from one.
    pub fn position(&self) -> Option<&ChunkPosition> {
        match self {
            VisBufferError::Fill { position, .. } | VisBufferError::Flush { position, .. } => {
                Some(position)
            }
            _ => None,
        }
    }
}
