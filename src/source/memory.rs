// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Column sources held entirely in memory.

use std::{cell::RefCell, collections::BTreeMap, ops::Range, rc::Rc};

use log::trace;

use super::{check_rows, Column, ColumnData, ColumnSource, ColumnSourceError, Slicer};
use crate::context::ObsContext;

/// A dataset held in memory, one [`ColumnData`] per column.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    obs_context: ObsContext,
    num_rows: usize,
    columns: BTreeMap<Column, ColumnData>,
    read_only: bool,
}

impl MemorySource {
    pub fn new(obs_context: ObsContext, num_rows: usize) -> MemorySource {
        MemorySource {
            obs_context,
            num_rows,
            columns: BTreeMap::new(),
            read_only: false,
        }
    }

    /// Add (or replace) a column. Its row count must match the dataset's.
    pub fn insert_column(
        &mut self,
        column: Column,
        data: ColumnData,
    ) -> Result<(), ColumnSourceError> {
        if data.num_rows() != self.num_rows {
            return Err(ColumnSourceError::BadArrayShape {
                argument: "data".into(),
                function: "MemorySource::insert_column".into(),
                expected: format!("{} rows", self.num_rows),
                received: format!("{} rows", data.num_rows()),
            });
        }
        self.columns.insert(column, data);
        Ok(())
    }

    /// Drop a column, e.g. to simulate a dataset without MODEL_DATA.
    pub fn remove_column(&mut self, column: Column) -> Option<ColumnData> {
        self.columns.remove(&column)
    }

    /// Reject all writes from now on.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// All of a column, if present.
    pub fn column(&self, column: Column) -> Option<&ColumnData> {
        self.columns.get(&column)
    }

    pub fn obs_context_mut(&mut self) -> &mut ObsContext {
        &mut self.obs_context
    }
}

impl ColumnSource for MemorySource {
    fn obs_context(&self) -> &ObsContext {
        &self.obs_context
    }

    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn has_column(&self, column: Column) -> bool {
        self.columns.contains_key(&column)
    }

    fn get_column(
        &self,
        column: Column,
        rows: Range<usize>,
    ) -> Result<ColumnData, ColumnSourceError> {
        check_rows(&rows, self.num_rows)?;
        let data = self
            .columns
            .get(&column)
            .ok_or(ColumnSourceError::MissingColumn(column))?;
        Ok(data.slice_rows(rows))
    }

    fn put_column(
        &mut self,
        column: Column,
        start_row: usize,
        data: &ColumnData,
    ) -> Result<(), ColumnSourceError> {
        if self.read_only {
            return Err(ColumnSourceError::ReadOnly);
        }
        check_rows(&(start_row..start_row + data.num_rows()), self.num_rows)?;
        trace!(
            "Writing {} rows of {column} from row {start_row}",
            data.num_rows()
        );
        match self.columns.get_mut(&column) {
            Some(existing) => existing.assign_rows(column, start_row, data),
            // Writing an optional column which isn't there yet creates it, as
            // long as the write covers every row. This is how `add_column`
            // lands here.
            None if start_row == 0 && data.num_rows() == self.num_rows => {
                self.columns.insert(column, data.clone());
                Ok(())
            }
            None => Err(ColumnSourceError::MissingColumn(column)),
        }
    }
}

/// Counts of the reads and writes made through a [`CountingSource`]. Clones
/// share the same counts, so a handle can be kept after the source has been
/// handed to an iterator.
#[derive(Clone, Debug, Default)]
pub struct ReadCounter {
    reads: Rc<RefCell<BTreeMap<Column, usize>>>,
    writes: Rc<RefCell<BTreeMap<Column, usize>>>,
}

impl ReadCounter {
    /// How many times has this column been read?
    pub fn reads(&self, column: Column) -> usize {
        self.reads.borrow().get(&column).copied().unwrap_or(0)
    }

    /// How many times has this column been written?
    pub fn writes(&self, column: Column) -> usize {
        self.writes.borrow().get(&column).copied().unwrap_or(0)
    }

    pub fn total_reads(&self) -> usize {
        self.reads.borrow().values().sum()
    }

    pub fn total_writes(&self) -> usize {
        self.writes.borrow().values().sum()
    }

    pub fn reset(&self) {
        self.reads.borrow_mut().clear();
        self.writes.borrow_mut().clear();
    }

    fn count_read(&self, column: Column) {
        *self.reads.borrow_mut().entry(column).or_default() += 1;
    }

    fn count_write(&self, column: Column) {
        *self.writes.borrow_mut().entry(column).or_default() += 1;
    }
}

/// A [`ColumnSource`] wrapper which counts every column read and write.
pub struct CountingSource<S: ColumnSource> {
    inner: S,
    counter: ReadCounter,
}

impl<S: ColumnSource> CountingSource<S> {
    pub fn new(inner: S) -> CountingSource<S> {
        CountingSource {
            inner,
            counter: ReadCounter::default(),
        }
    }

    /// A handle on the counts.
    pub fn counter(&self) -> ReadCounter {
        self.counter.clone()
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: ColumnSource> ColumnSource for CountingSource<S> {
    fn obs_context(&self) -> &ObsContext {
        self.inner.obs_context()
    }

    fn num_rows(&self) -> usize {
        self.inner.num_rows()
    }

    fn has_column(&self, column: Column) -> bool {
        self.inner.has_column(column)
    }

    fn get_column(
        &self,
        column: Column,
        rows: Range<usize>,
    ) -> Result<ColumnData, ColumnSourceError> {
        self.counter.count_read(column);
        self.inner.get_column(column, rows)
    }

    // Forwarded so a sliced read counts once, not as a read plus a select.
    fn get_column_sliced(
        &self,
        column: Column,
        rows: Range<usize>,
        slicer: &Slicer,
    ) -> Result<ColumnData, ColumnSourceError> {
        self.counter.count_read(column);
        self.inner.get_column_sliced(column, rows, slicer)
    }

    fn put_column(
        &mut self,
        column: Column,
        start_row: usize,
        data: &ColumnData,
    ) -> Result<(), ColumnSourceError> {
        self.counter.count_write(column);
        self.inner.put_column(column, start_row, data)
    }

    fn put_column_sliced(
        &mut self,
        column: Column,
        start_row: usize,
        data: &ColumnData,
        slicer: &Slicer,
    ) -> Result<(), ColumnSourceError> {
        self.counter.count_write(column);
        self.inner.put_column_sliced(column, start_row, data, slicer)
    }

    fn add_column(&mut self, column: Column) -> Result<(), ColumnSourceError> {
        self.inner.add_column(column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::c32;
    use ndarray::prelude::*;

    fn source() -> MemorySource {
        let mut source = MemorySource::new(ObsContext::default(), 3);
        source
            .insert_column(Column::Antenna1, ColumnData::Int(array![0, 0, 1]))
            .unwrap();
        source
            .insert_column(
                Column::Flag,
                ColumnData::BoolCube(Array3::from_elem((3, 2, 2), false)),
            )
            .unwrap();
        source
    }

    #[test]
    fn test_get_rows() {
        let source = source();
        assert_eq!(
            source.get_column(Column::Antenna1, 1..3).unwrap(),
            ColumnData::Int(array![0, 1])
        );
        assert!(matches!(
            source.get_column(Column::Antenna1, 2..4),
            Err(ColumnSourceError::RowsOutOfRange { num_rows: 3, .. })
        ));
        assert!(matches!(
            source.get_column(Column::ModelData, 0..1),
            Err(ColumnSourceError::MissingColumn(Column::ModelData))
        ));
        assert!(!source.has_column(Column::ModelData));
    }

    #[test]
    fn test_insert_wrong_rows() {
        let mut source = source();
        assert!(source
            .insert_column(Column::Antenna2, ColumnData::Int(array![0]))
            .is_err());
    }

    #[test]
    fn test_put_sliced() {
        let mut source = source();
        let slicer = Slicer {
            chans: Some(vec![1]),
            corrs: Some(vec![0]),
        };
        let data = ColumnData::BoolCube(Array3::from_elem((1, 1, 1), true));
        source
            .put_column_sliced(Column::Flag, 2, &data, &slicer)
            .unwrap();
        let flags = source
            .get_column(Column::Flag, 0..3)
            .unwrap()
            .into_bool_cube(Column::Flag)
            .unwrap();
        assert_eq!(flags.iter().filter(|&&f| f).count(), 1);
        assert!(flags[(2, 1, 0)]);
    }

    #[test]
    fn test_add_optional_columns() {
        let mut source = source();
        let data = Array3::from_shape_fn((3, 2, 2), |(r, c, p)| {
            c32::new((r * 4 + c * 2 + p) as f32, 1.0)
        });
        source
            .insert_column(Column::Data, ColumnData::ComplexCube(data.clone()))
            .unwrap();
        source
            .insert_column(
                Column::Weight,
                ColumnData::FloatMatrix(array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]),
            )
            .unwrap();

        for column in [
            Column::ModelData,
            Column::CorrectedData,
            Column::WeightSpectrum,
        ] {
            source.add_column(column).unwrap();
            assert!(source.has_column(column));
        }
        let model = source
            .get_column(Column::ModelData, 0..3)
            .unwrap()
            .into_complex_cube(Column::ModelData)
            .unwrap();
        assert_eq!(model.dim(), (3, 2, 2));
        assert!(model.iter().all(|v| v.norm() == 0.0));
        assert_eq!(
            source.column(Column::CorrectedData),
            Some(&ColumnData::ComplexCube(data))
        );
        let spectrum = source
            .get_column(Column::WeightSpectrum, 0..3)
            .unwrap()
            .into_float_cube(Column::WeightSpectrum)
            .unwrap();
        assert_eq!(spectrum[(2, 1, 1)], 6.0);
        assert_eq!(spectrum[(1, 0, 0)], 3.0);

        // Now that MODEL_DATA is there, partial writes go through.
        source
            .put_column(
                Column::ModelData,
                1,
                &ColumnData::ComplexCube(Array3::from_elem((1, 2, 2), c32::new(2.0, 0.0))),
            )
            .unwrap();
        // Required columns can't be made up.
        assert!(matches!(
            source.add_column(Column::Antenna2),
            Err(ColumnSourceError::MissingColumn(Column::Antenna2))
        ));
    }

    #[test]
    fn test_read_only() {
        let mut source = source();
        source.set_read_only(true);
        assert!(matches!(
            source.put_column(Column::Antenna1, 0, &ColumnData::Int(array![1])),
            Err(ColumnSourceError::ReadOnly)
        ));
    }

    #[test]
    fn test_counting() {
        let source = CountingSource::new(source());
        let counter = source.counter();
        source.get_column(Column::Antenna1, 0..1).unwrap();
        source
            .get_column_sliced(Column::Flag, 0..1, &Slicer::default())
            .unwrap();
        source.get_column(Column::Antenna1, 0..2).unwrap();
        assert_eq!(counter.reads(Column::Antenna1), 2);
        assert_eq!(counter.reads(Column::Flag), 1);
        assert_eq!(counter.total_reads(), 3);
        assert_eq!(counter.total_writes(), 0);
    }
}
