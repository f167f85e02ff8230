// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Splitting a dataset's rows into chunks and sub-chunks.

use std::ops::Range;

use log::{debug, warn};
use ndarray::Array1;

use super::VisIterError;
use crate::source::{Column, ColumnSource};

/// A maximal run of consecutive rows sharing ARRAY_ID, FIELD_ID and
/// DATA_DESC_ID (and not spanning more than the chunk interval).
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ChunkInfo {
    pub(crate) rows: Range<usize>,
    pub(crate) array_id: i32,
    pub(crate) field: usize,
    pub(crate) data_desc: usize,
    pub(crate) spw: usize,
    pub(crate) polarization: usize,
}

/// Convert a main-table id into an index of a table with `len` entries.
pub(crate) fn to_index(
    column: Column,
    row: usize,
    value: i32,
    len: usize,
) -> Result<usize, VisIterError> {
    usize::try_from(value)
        .ok()
        .filter(|&v| v < len)
        .ok_or(VisIterError::BadIndex {
            column,
            row,
            value: value.into(),
            len,
        })
}

/// Read the columns which decide chunk boundaries and split all rows into
/// chunks. The TIME column is returned too, as sub-chunking needs it.
pub(crate) fn scan_chunks(
    source: &dyn ColumnSource,
    chunk_interval_s: f64,
) -> Result<(Vec<ChunkInfo>, Vec<f64>), VisIterError> {
    let num_rows = source.num_rows();
    let all_rows = 0..num_rows;
    let times = source
        .get_column(Column::Time, all_rows.clone())?
        .into_float64(Column::Time)?
        .to_vec();
    let data_descs = source
        .get_column(Column::DataDescId, all_rows.clone())?
        .into_int(Column::DataDescId)?;
    let read_or_zeros = |column: Column| -> Result<Array1<i32>, VisIterError> {
        if source.has_column(column) {
            Ok(source.get_column(column, all_rows.clone())?.into_int(column)?)
        } else {
            debug!("{column} is absent; treating every row as 0");
            Ok(Array1::zeros(num_rows))
        }
    };
    let array_ids = read_or_zeros(Column::ArrayId)?;
    let field_ids = read_or_zeros(Column::FieldId)?;

    let obs_context = source.obs_context();
    let make_chunk = |rows: Range<usize>| -> Result<ChunkInfo, VisIterError> {
        let row = rows.start;
        let field = to_index(
            Column::FieldId,
            row,
            field_ids[row],
            obs_context.phase_centres.len(),
        )?;
        let data_desc = to_index(
            Column::DataDescId,
            row,
            data_descs[row],
            obs_context.data_descriptions.len(),
        )?;
        let dd = obs_context.data_descriptions[data_desc];
        if dd.spw >= obs_context.spectral_windows.len()
            || dd.polarization >= obs_context.polarizations.len()
        {
            return Err(VisIterError::BadDataDescription {
                data_desc,
                spw: dd.spw,
                polarization: dd.polarization,
            });
        }
        Ok(ChunkInfo {
            rows,
            array_id: array_ids[row],
            field,
            data_desc,
            spw: dd.spw,
            polarization: dd.polarization,
        })
    };

    let mut chunks = vec![];
    let mut start = 0;
    for row in 1..num_rows {
        if times[row] < times[row - 1] {
            warn!(
                "TIME goes backwards at row {row} ({} -> {}); chunks will not be in time order",
                times[row - 1],
                times[row]
            );
        }
        let new_key = array_ids[row] != array_ids[start]
            || field_ids[row] != field_ids[start]
            || data_descs[row] != data_descs[start];
        let too_long = chunk_interval_s > 0.0 && times[row] - times[start] > chunk_interval_s;
        if new_key || too_long {
            chunks.push(make_chunk(start..row)?);
            start = row;
        }
    }
    if num_rows > 0 {
        chunks.push(make_chunk(start..num_rows)?);
    }
    Ok((chunks, times))
}

/// Split a chunk's rows into sub-chunks: runs of equal timestamps, or, if
/// `row_blocking` is non-zero, blocks of that many rows. The last block is
/// clamped to the end of the chunk.
pub(crate) fn sub_chunks(
    rows: Range<usize>,
    times: &[f64],
    row_blocking: usize,
) -> Vec<Range<usize>> {
    let mut out = vec![];
    let mut start = rows.start;
    while start < rows.end {
        let end = if row_blocking > 0 {
            (start + row_blocking).min(rows.end)
        } else {
            let t = times[start];
            (start + 1..rows.end)
                .find(|&r| times[r] != t)
                .unwrap_or(rows.end)
        };
        out.push(start..end);
        start = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        context::{DataDescription, ObsContext, SpectralWindow},
        polarization::CorrType,
        source::{ColumnData, MemorySource},
        RADec,
    };
    use ndarray::array;

    fn make_source(times: Array1<f64>, ddids: Array1<i32>, fields: Array1<i32>) -> MemorySource {
        let ctx = ObsContext {
            phase_centres: vec![RADec::default(), RADec::default()],
            spectral_windows: vec![
                SpectralWindow {
                    name: "a".into(),
                    chan_freqs_hz: vec![1e8],
                    chan_widths_hz: vec![1e3],
                    is_lsrk: false,
                },
                SpectralWindow {
                    name: "b".into(),
                    chan_freqs_hz: vec![2e8, 2.1e8],
                    chan_widths_hz: vec![1e3, 1e3],
                    is_lsrk: false,
                },
            ],
            polarizations: vec![vec![CorrType::XX, CorrType::YY]],
            data_descriptions: vec![
                DataDescription {
                    spw: 0,
                    polarization: 0,
                },
                DataDescription {
                    spw: 1,
                    polarization: 0,
                },
            ],
            ..Default::default()
        };
        let mut source = MemorySource::new(ctx, times.len());
        source
            .insert_column(Column::Time, ColumnData::Float64(times))
            .unwrap();
        source
            .insert_column(Column::DataDescId, ColumnData::Int(ddids))
            .unwrap();
        source
            .insert_column(Column::FieldId, ColumnData::Int(fields))
            .unwrap();
        source
    }

    #[test]
    fn test_chunks_split_on_keys() {
        let source = make_source(
            array![0.0, 0.0, 1.0, 1.0, 2.0, 2.0],
            array![0, 0, 0, 1, 1, 1],
            array![0, 0, 0, 0, 1, 1],
        );
        let (chunks, times) = scan_chunks(&source, 0.0).unwrap();
        assert_eq!(times.len(), 6);
        let rows: Vec<_> = chunks.iter().map(|c| c.rows.clone()).collect();
        assert_eq!(rows, vec![0..3, 3..4, 4..6]);
        assert_eq!(chunks[1].spw, 1);
        assert_eq!(chunks[2].field, 1);
        // ARRAY_ID is absent, so it is taken to be 0.
        assert!(chunks.iter().all(|c| c.array_id == 0));
    }

    #[test]
    fn test_chunk_interval() {
        let source = make_source(
            array![0.0, 5.0, 10.0, 15.0, 20.0],
            array![0, 0, 0, 0, 0],
            array![0, 0, 0, 0, 0],
        );
        let (chunks, _) = scan_chunks(&source, 10.0).unwrap();
        let rows: Vec<_> = chunks.iter().map(|c| c.rows.clone()).collect();
        assert_eq!(rows, vec![0..3, 3..5]);

        let (chunks, _) = scan_chunks(&source, 0.0).unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_bad_ids() {
        let source = make_source(array![0.0, 0.0], array![0, 2], array![0, 0]);
        assert!(matches!(
            scan_chunks(&source, 0.0),
            Err(VisIterError::BadIndex {
                column: Column::DataDescId,
                row: 1,
                value: 2,
                len: 2
            })
        ));

        let source = make_source(array![0.0], array![0], array![-1]);
        assert!(matches!(
            scan_chunks(&source, 0.0),
            Err(VisIterError::BadIndex {
                column: Column::FieldId,
                value: -1,
                ..
            })
        ));
    }

    #[test]
    fn test_sub_chunks_by_time() {
        let times = [0.0, 0.0, 1.0, 1.0, 1.0, 2.0];
        assert_eq!(sub_chunks(0..6, &times, 0), vec![0..2, 2..5, 5..6]);
        assert_eq!(sub_chunks(1..4, &times, 0), vec![1..2, 2..4]);
        assert!(sub_chunks(3..3, &times, 0).is_empty());
    }

    #[test]
    fn test_row_blocking_is_clamped() {
        let times = [0.0; 7];
        assert_eq!(sub_chunks(0..7, &times, 3), vec![0..3, 3..6, 6..7]);
        assert_eq!(sub_chunks(2..4, &times, 10), vec![2..4]);
    }
}
