// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from reading or writing columns.

use std::ops::Range;

use thiserror::Error;

use super::Column;

#[derive(Error, Debug)]
pub enum ColumnSourceError {
    #[error("Column {0} is not present in this dataset")]
    MissingColumn(Column),

    #[error("Rows {rows:?} are out of range; the dataset has {num_rows} rows")]
    RowsOutOfRange { rows: Range<usize>, num_rows: usize },

    #[error("Column {column} holds {received} data, but {expected} data was expected")]
    WrongType {
        column: Column,
        expected: &'static str,
        received: &'static str,
    },

    #[error("Slice index {index} is out of range for axis {axis} with length {len}")]
    SliceOutOfRange {
        axis: &'static str,
        index: usize,
        len: usize,
    },

    #[error("bad array shape supplied to argument {argument} of function {function}. expected {expected}, received {received}")]
    BadArrayShape {
        argument: String,
        function: String,
        expected: String,
        received: String,
    },

    #[error("This column source is read only")]
    ReadOnly,

    /// An error from casacore.
    #[cfg(feature = "ms")]
    #[error("casacore error on table {table}: {message}")]
    Casacore { table: String, message: String },

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
