// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from driving a [`VisIter`](super::VisIter).

use thiserror::Error;

use crate::{
    selection::SelectionError,
    source::{Column, ColumnSourceError},
};

#[derive(Error, Debug)]
pub enum VisIterError {
    /// A malformed channel or correlation selection.
    #[error(transparent)]
    Configuration(#[from] SelectionError),

    #[error("The chunk interval must be a non-negative number of seconds, got {0}")]
    BadChunkInterval(f64),

    #[error("Buffers must be detached in the reverse order they were attached; this buffer is at depth {depth} of a stack of {stack_len}")]
    DetachNotTop { depth: usize, stack_len: usize },

    #[error("This buffer is not attached to an iterator")]
    NotAttached,

    #[error("This buffer is already attached to an iterator; detach it first")]
    AlreadyAttached,

    #[error("{column} value {value} in row {row} does not refer to one of the {len} entries of its table")]
    BadIndex {
        column: Column,
        row: usize,
        value: i64,
        len: usize,
    },

    #[error("DATA_DESCRIPTION row {data_desc} refers to spectral window {spw} and polarization {polarization}, which are not both present")]
    BadDataDescription {
        data_desc: usize,
        spw: usize,
        polarization: usize,
    },

    #[error(transparent)]
    Source(#[from] ColumnSourceError),
}
