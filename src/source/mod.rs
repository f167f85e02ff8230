// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Access to the rows of a tabular visibility dataset.
//!
//! Everything above this layer sees a dataset only through the
//! [`ColumnSource`] trait: read some rows of a column (optionally sliced in
//! channel and correlation), write some rows back, and look up the dataset's
//! sub-table metadata ([`ObsContext`]).

mod column;
mod error;
mod memory;
#[cfg(feature = "ms")]
mod ms;

pub use column::ColumnData;
pub use error::ColumnSourceError;
pub use memory::{CountingSource, MemorySource, ReadCounter};
#[cfg(feature = "ms")]
pub use ms::MsSource;

use std::ops::Range;

use ndarray::Array3;

use crate::context::ObsContext;

/// The main-table columns a [`ColumnSource`] may provide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    Antenna1,
    Antenna2,
    Feed1,
    Feed2,
    ArrayId,
    FieldId,
    DataDescId,
    ObservationId,
    ProcessorId,
    StateId,
    ScanNumber,
    Time,
    Interval,
    TimeCentroid,
    Exposure,
    Uvw,
    FlagRow,
    Flag,
    Data,
    ModelData,
    CorrectedData,
    FloatData,
    Weight,
    WeightSpectrum,
    Sigma,
}

impl Column {
    pub const ALL: [Column; 25] = [
        Column::Antenna1,
        Column::Antenna2,
        Column::Feed1,
        Column::Feed2,
        Column::ArrayId,
        Column::FieldId,
        Column::DataDescId,
        Column::ObservationId,
        Column::ProcessorId,
        Column::StateId,
        Column::ScanNumber,
        Column::Time,
        Column::Interval,
        Column::TimeCentroid,
        Column::Exposure,
        Column::Uvw,
        Column::FlagRow,
        Column::Flag,
        Column::Data,
        Column::ModelData,
        Column::CorrectedData,
        Column::FloatData,
        Column::Weight,
        Column::WeightSpectrum,
        Column::Sigma,
    ];

    /// The casacore name of this column.
    pub fn name(self) -> &'static str {
        match self {
            Column::Antenna1 => "ANTENNA1",
            Column::Antenna2 => "ANTENNA2",
            Column::Feed1 => "FEED1",
            Column::Feed2 => "FEED2",
            Column::ArrayId => "ARRAY_ID",
            Column::FieldId => "FIELD_ID",
            Column::DataDescId => "DATA_DESC_ID",
            Column::ObservationId => "OBSERVATION_ID",
            Column::ProcessorId => "PROCESSOR_ID",
            Column::StateId => "STATE_ID",
            Column::ScanNumber => "SCAN_NUMBER",
            Column::Time => "TIME",
            Column::Interval => "INTERVAL",
            Column::TimeCentroid => "TIME_CENTROID",
            Column::Exposure => "EXPOSURE",
            Column::Uvw => "UVW",
            Column::FlagRow => "FLAG_ROW",
            Column::Flag => "FLAG",
            Column::Data => "DATA",
            Column::ModelData => "MODEL_DATA",
            Column::CorrectedData => "CORRECTED_DATA",
            Column::FloatData => "FLOAT_DATA",
            Column::Weight => "WEIGHT",
            Column::WeightSpectrum => "WEIGHT_SPECTRUM",
            Column::Sigma => "SIGMA",
        }
    }

    /// Columns which a dataset need not have. Their absence is not an error,
    /// but they must be checked with [`ColumnSource::has_column`] before use.
    pub fn is_optional(self) -> bool {
        matches!(
            self,
            Column::ModelData | Column::CorrectedData | Column::FloatData | Column::WeightSpectrum
        )
    }

    /// Does this column have a channel axis?
    pub fn has_chan_axis(self) -> bool {
        matches!(
            self,
            Column::Flag
                | Column::Data
                | Column::ModelData
                | Column::CorrectedData
                | Column::FloatData
                | Column::WeightSpectrum
        )
    }

    /// Does this column have a correlation axis?
    pub fn has_corr_axis(self) -> bool {
        self.has_chan_axis() || matches!(self, Column::Weight | Column::Sigma)
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Channel and correlation indices to pick out of each row. `None` on an axis
/// means "all of them".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Slicer {
    pub chans: Option<Vec<usize>>,
    pub corrs: Option<Vec<usize>>,
}

impl Slicer {
    pub fn is_full(&self) -> bool {
        self.chans.is_none() && self.corrs.is_none()
    }
}

/// A tabular visibility dataset.
///
/// Rows are addressed by index; all reads and writes are over a contiguous
/// range of rows.
pub trait ColumnSource {
    /// The dataset's sub-table metadata.
    fn obs_context(&self) -> &ObsContext;

    /// The total number of rows.
    fn num_rows(&self) -> usize;

    /// Does the dataset have this column?
    fn has_column(&self, column: Column) -> bool;

    /// Read rows of a column.
    fn get_column(&self, column: Column, rows: Range<usize>)
        -> Result<ColumnData, ColumnSourceError>;

    /// Read rows of a column, keeping only the channels and correlations
    /// described by `slicer`.
    fn get_column_sliced(
        &self,
        column: Column,
        rows: Range<usize>,
        slicer: &Slicer,
    ) -> Result<ColumnData, ColumnSourceError> {
        let data = self.get_column(column, rows)?;
        if slicer.is_full() {
            Ok(data)
        } else {
            data.select(slicer)
        }
    }

    /// Write rows of a column.
    fn put_column(
        &mut self,
        column: Column,
        start_row: usize,
        data: &ColumnData,
    ) -> Result<(), ColumnSourceError>;

    /// Write rows of a column, where `data` only holds the channels and
    /// correlations described by `slicer`. Everything else in these rows is
    /// left untouched.
    fn put_column_sliced(
        &mut self,
        column: Column,
        start_row: usize,
        data: &ColumnData,
        slicer: &Slicer,
    ) -> Result<(), ColumnSourceError> {
        if slicer.is_full() {
            return self.put_column(column, start_row, data);
        }
        let rows = start_row..start_row + data.num_rows();
        let mut full = self.get_column(column, rows)?;
        full.scatter(column, data, slicer)?;
        self.put_column(column, start_row, &full)
    }

    /// Create an optional column which the dataset doesn't have yet, over
    /// every row. MODEL_DATA and FLOAT_DATA start as zeros, CORRECTED_DATA
    /// as a copy of DATA, and WEIGHT_SPECTRUM as WEIGHT spread over the
    /// channels. A column which is already present is left alone.
    fn add_column(&mut self, column: Column) -> Result<(), ColumnSourceError> {
        if self.has_column(column) {
            return Ok(());
        }
        let data = initial_column(self, column)?;
        self.put_column(column, 0, &data)
    }
}

/// The starting contents of a newly added optional column.
pub(crate) fn initial_column<S: ColumnSource + ?Sized>(
    source: &S,
    column: Column,
) -> Result<ColumnData, ColumnSourceError> {
    if !column.is_optional() {
        return Err(ColumnSourceError::MissingColumn(column));
    }
    let rows = 0..source.num_rows();
    let data = source.get_column(Column::Data, rows.clone())?;
    Ok(match column {
        Column::CorrectedData => data,
        Column::ModelData => {
            let dim = data.into_complex_cube(Column::Data)?.dim();
            ColumnData::ComplexCube(Array3::zeros(dim))
        }
        Column::FloatData => {
            let dim = data.into_complex_cube(Column::Data)?.dim();
            ColumnData::FloatCube(Array3::zeros(dim))
        }
        _ => {
            let (num_rows, num_chans, num_corrs) = data.into_complex_cube(Column::Data)?.dim();
            let weights = source
                .get_column(Column::Weight, rows)?
                .into_float_matrix(Column::Weight)?;
            if weights.dim() != (num_rows, num_corrs) {
                return Err(ColumnSourceError::BadArrayShape {
                    argument: "WEIGHT".into(),
                    function: "initial_column".into(),
                    expected: format!("{:?}", (num_rows, num_corrs)),
                    received: format!("{:?}", weights.dim()),
                });
            }
            ColumnData::FloatCube(Array3::from_shape_fn(
                (num_rows, num_chans, num_corrs),
                |(r, _, p)| weights[(r, p)],
            ))
        }
    })
}

/// Check that a row range lies within a dataset.
pub(crate) fn check_rows(rows: &Range<usize>, num_rows: usize) -> Result<(), ColumnSourceError> {
    if rows.start > rows.end || rows.end > num_rows {
        Err(ColumnSourceError::RowsOutOfRange {
            rows: rows.clone(),
            num_rows,
        })
    } else {
        Ok(())
    }
}
