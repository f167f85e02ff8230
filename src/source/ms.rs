// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A [`ColumnSource`] over a casacore measurement set.

use std::{
    cell::RefCell,
    collections::BTreeSet,
    ops::Range,
    path::{Path, PathBuf},
};

use log::{debug, trace, warn};
use ndarray::prelude::*;
use rubbl_casatables::{GlueDataType, Table, TableOpenMode};

use super::{check_rows, initial_column, Column, ColumnData, ColumnSource, ColumnSourceError};
use crate::{
    c32,
    context::{
        Antenna, DataDescription, Feed, ObsContext, PointingEntry, SpectralWindow,
    },
    polarization::CorrType,
    LatLngHeight, RADec,
};

/// casacore's MFrequency type code for LSRK.
const MEAS_FREQ_REF_LSRK: i32 = 1;

fn casacore_err<E: std::fmt::Display>(table: &str) -> impl Fn(E) -> ColumnSourceError + '_ {
    move |e| ColumnSourceError::Casacore {
        table: table.to_string(),
        message: e.to_string(),
    }
}

/// Open a measurement set table. If `table` is `None`, then open the main
/// table.
fn open_table(
    ms: &Path,
    table: Option<&str>,
    mode: TableOpenMode,
) -> Result<Table, ColumnSourceError> {
    let name = table.unwrap_or("MAIN");
    Table::open(
        format!("{}/{}", ms.display(), table.unwrap_or("")),
        mode,
    )
    .map_err(|e| ColumnSourceError::Casacore {
        table: name.to_string(),
        message: e.to_string(),
    })
}

pub struct MsSource {
    /// The path to the measurement set on disk.
    pub ms: PathBuf,

    obs_context: ObsContext,

    /// The main table. casacore reads need a mutable handle.
    main: RefCell<Table>,

    num_rows: usize,

    columns: BTreeSet<Column>,
}

impl MsSource {
    /// Open a measurement set and read its sub-tables. If `writable` is true,
    /// the main table is opened read-write so that flags and visibilities can
    /// be flushed back.
    pub fn new<P: AsRef<Path>>(ms: P, writable: bool) -> Result<MsSource, ColumnSourceError> {
        let ms = ms.as_ref();
        debug!("Using measurement set: {}", ms.display());
        if !ms.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", ms.display()),
            )
            .into());
        }

        let mode = if writable {
            TableOpenMode::ReadWrite
        } else {
            TableOpenMode::Read
        };
        let mut main = open_table(ms, None, mode)?;
        let num_rows = main.n_rows() as usize;
        let names = main.column_names().map_err(casacore_err("MAIN"))?;
        let columns: BTreeSet<Column> = Column::ALL
            .into_iter()
            .filter(|c| names.iter().any(|n| n == c.name()))
            .collect();
        for c in Column::ALL.iter().filter(|c| c.is_optional()) {
            if !columns.contains(c) {
                debug!("Measurement set has no {c} column");
            }
        }
        trace!("Main table has {num_rows} rows");

        let obs_context = read_obs_context(ms)?;

        Ok(MsSource {
            ms: ms.to_path_buf(),
            obs_context,
            main: RefCell::new(main),
            num_rows,
            columns,
        })
    }

    fn get_scalars<T, E, F>(
        &self,
        column: Column,
        rows: Range<usize>,
        f: F,
    ) -> Result<Vec<T>, ColumnSourceError>
    where
        E: std::fmt::Display,
        F: Fn(&mut Table, &str, u64) -> Result<T, E>,
    {
        let mut main = self.main.borrow_mut();
        rows.map(|row| f(&mut main, column.name(), row as u64).map_err(casacore_err("MAIN")))
            .collect()
    }

    /// Read `[chan][corr]` cells and stack them into a `[row][chan][corr]`
    /// cube.
    fn get_cube<T>(
        &self,
        column: Column,
        rows: Range<usize>,
    ) -> Result<Array3<T>, ColumnSourceError>
    where
        T: Clone + Default + rubbl_casatables::CasaScalarData,
        Array2<T>: rubbl_casatables::CasaDataType,
    {
        let mut main = self.main.borrow_mut();
        let num_rows = rows.len();
        let mut cube: Option<Array3<T>> = None;
        for (i, row) in rows.enumerate() {
            let cell: Array2<T> = main
                .get_cell(column.name(), row as u64)
                .map_err(casacore_err("MAIN"))?;
            let cube = cube.get_or_insert_with(|| {
                let (num_chans, num_corrs) = cell.dim();
                Array3::default((num_rows, num_chans, num_corrs))
            });
            if cube.slice(s![i, .., ..]).dim() != cell.dim() {
                return Err(ColumnSourceError::BadArrayShape {
                    argument: column.name().into(),
                    function: "MsSource::get_cube".into(),
                    expected: format!("{:?}", cube.slice(s![i, .., ..]).dim()),
                    received: format!("{:?}", cell.dim()),
                });
            }
            cube.slice_mut(s![i, .., ..]).assign(&cell);
        }
        Ok(cube.unwrap_or_else(|| Array3::default((0, 0, 0))))
    }

    fn get_matrix<T>(
        &self,
        column: Column,
        rows: Range<usize>,
        width: Option<usize>,
    ) -> Result<Array2<T>, ColumnSourceError>
    where
        T: Clone + Default + rubbl_casatables::CasaScalarData,
    {
        let mut main = self.main.borrow_mut();
        let num_rows = rows.len();
        let mut out: Option<Array2<T>> = None;
        for (i, row) in rows.enumerate() {
            let cell: Vec<T> = main
                .get_cell_as_vec(column.name(), row as u64)
                .map_err(casacore_err("MAIN"))?;
            let out = out.get_or_insert_with(|| {
                Array2::default((num_rows, width.unwrap_or(cell.len())))
            });
            if out.ncols() != cell.len() {
                return Err(ColumnSourceError::BadArrayShape {
                    argument: column.name().into(),
                    function: "MsSource::get_matrix".into(),
                    expected: format!("{}", out.ncols()),
                    received: format!("{}", cell.len()),
                });
            }
            out.row_mut(i).assign(&ArrayView1::from(&cell));
        }
        Ok(out.unwrap_or_else(|| Array2::default((0, width.unwrap_or(0)))))
    }
}

impl ColumnSource for MsSource {
    fn obs_context(&self) -> &ObsContext {
        &self.obs_context
    }

    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn has_column(&self, column: Column) -> bool {
        self.columns.contains(&column)
    }

    fn get_column(
        &self,
        column: Column,
        rows: Range<usize>,
    ) -> Result<ColumnData, ColumnSourceError> {
        check_rows(&rows, self.num_rows)?;
        if !self.has_column(column) {
            return Err(ColumnSourceError::MissingColumn(column));
        }
        trace!("Reading rows {rows:?} of {column}");
        use Column::*;
        Ok(match column {
            Antenna1 | Antenna2 | Feed1 | Feed2 | ArrayId | FieldId | DataDescId
            | ObservationId | ProcessorId | StateId | ScanNumber => ColumnData::Int(
                self.get_scalars(column, rows, |t, c, r| t.get_cell::<i32>(c, r))?
                    .into(),
            ),
            Time | Interval | TimeCentroid | Exposure => ColumnData::Float64(
                self.get_scalars(column, rows, |t, c, r| t.get_cell::<f64>(c, r))?
                    .into(),
            ),
            FlagRow => ColumnData::Bool(
                self.get_scalars(column, rows, |t, c, r| t.get_cell::<bool>(c, r))?
                    .into(),
            ),
            Uvw => ColumnData::Float64Matrix(self.get_matrix(column, rows, Some(3))?),
            Weight | Sigma => ColumnData::FloatMatrix(self.get_matrix(column, rows, None)?),
            Flag => ColumnData::BoolCube(self.get_cube(column, rows)?),
            FloatData | WeightSpectrum => ColumnData::FloatCube(self.get_cube(column, rows)?),
            Data | ModelData | CorrectedData => {
                ColumnData::ComplexCube(self.get_cube::<c32>(column, rows)?)
            }
        })
    }

    fn put_column(
        &mut self,
        column: Column,
        start_row: usize,
        data: &ColumnData,
    ) -> Result<(), ColumnSourceError> {
        check_rows(&(start_row..start_row + data.num_rows()), self.num_rows)?;
        if !self.has_column(column) {
            return Err(ColumnSourceError::MissingColumn(column));
        }
        trace!("Writing {} rows of {column} from row {start_row}", data.num_rows());
        let main = self.main.get_mut();
        let name = column.name();
        let err = "MAIN";
        for i in 0..data.num_rows() {
            let row = (start_row + i) as u64;
            match data {
                ColumnData::Int(a) => main.put_cell(name, row, &a[i]),
                ColumnData::Bool(a) => main.put_cell(name, row, &a[i]),
                ColumnData::Float64(a) => main.put_cell(name, row, &a[i]),
                ColumnData::Float64Matrix(a) => main.put_cell(name, row, &a.row(i).to_vec()),
                ColumnData::FloatMatrix(a) => main.put_cell(name, row, &a.row(i).to_vec()),
                ColumnData::BoolCube(a) => {
                    main.put_cell(name, row, &a.slice(s![i, .., ..]).to_owned())
                }
                ColumnData::FloatCube(a) => {
                    main.put_cell(name, row, &a.slice(s![i, .., ..]).to_owned())
                }
                ColumnData::ComplexCube(a) => {
                    main.put_cell(name, row, &a.slice(s![i, .., ..]).to_owned())
                }
            }
            .map_err(casacore_err(err))?;
        }
        Ok(())
    }

    fn add_column(&mut self, column: Column) -> Result<(), ColumnSourceError> {
        if self.has_column(column) {
            return Ok(());
        }
        let data = initial_column(self, column)?;
        let data_type = match column {
            Column::ModelData | Column::CorrectedData => GlueDataType::TpComplex,
            _ => GlueDataType::TpFloat,
        };
        debug!("Adding {column} to {}", self.ms.display());
        // Cell shapes may differ between data descriptions, so the column
        // isn't fixed-shape.
        self.main
            .get_mut()
            .add_array_column(data_type, column.name(), None, None, false, false)
            .map_err(casacore_err("MAIN"))?;
        self.columns.insert(column);
        self.put_column(column, 0, &data)
    }
}

/// Read the sub-tables describing a measurement set. POINTING and FEED may be
/// empty or absent.
fn read_obs_context(ms: &Path) -> Result<ObsContext, ColumnSourceError> {
    let mut ctx = ObsContext {
        name: ms.file_stem().map(|s| s.to_string_lossy().into_owned()),
        ..Default::default()
    };

    // ANTENNA
    let mut antenna_table = open_table(ms, Some("ANTENNA"), TableOpenMode::Read)?;
    let err = "ANTENNA";
    let names: Vec<String> = antenna_table.get_col_as_vec("NAME").map_err(casacore_err(err))?;
    let mut mean_xyz = [0.0; 3];
    for (i, name) in names.into_iter().enumerate() {
        let pos: Vec<f64> = antenna_table
            .get_cell("POSITION", i as u64)
            .map_err(casacore_err(err))?;
        if pos.len() != 3 {
            return Err(ColumnSourceError::BadArrayShape {
                argument: "POSITION".into(),
                function: "read_obs_context".into(),
                expected: "3".into(),
                received: format!("{}", pos.len()),
            });
        }
        for (m, p) in mean_xyz.iter_mut().zip(pos.iter()) {
            *m += p;
        }
        ctx.antennas.push(Antenna {
            name,
            position: LatLngHeight::from_itrf(pos[0], pos[1], pos[2]),
        });
    }
    if !ctx.antennas.is_empty() {
        let n = ctx.antennas.len() as f64;
        ctx.array_pos =
            LatLngHeight::from_itrf(mean_xyz[0] / n, mean_xyz[1] / n, mean_xyz[2] / n);
    }
    trace!("There are {} antennas", ctx.antennas.len());

    // FEED
    match open_table(ms, Some("FEED"), TableOpenMode::Read) {
        Ok(mut feed_table) => {
            let err = "FEED";
            let antennas: Vec<i32> = feed_table
                .get_col_as_vec("ANTENNA_ID")
                .map_err(casacore_err(err))?;
            let feed_ids: Vec<i32> = feed_table
                .get_col_as_vec("FEED_ID")
                .map_err(casacore_err(err))?;
            for (i, (antenna, feed_id)) in antennas.into_iter().zip(feed_ids).enumerate() {
                let angles: Vec<f64> = feed_table
                    .get_cell_as_vec("RECEPTOR_ANGLE", i as u64)
                    .map_err(casacore_err(err))?;
                let offsets: Vec<f64> = feed_table
                    .get_cell_as_vec("BEAM_OFFSET", i as u64)
                    .map_err(casacore_err(err))?;
                ctx.feeds.push(Feed {
                    antenna: antenna.max(0) as usize,
                    feed_id: feed_id.max(0) as usize,
                    receptor_angle: angles.first().copied().unwrap_or(0.0),
                    beam_offset: (
                        offsets.first().copied().unwrap_or(0.0),
                        offsets.get(1).copied().unwrap_or(0.0),
                    ),
                });
            }
        }
        Err(e) => debug!("No FEED table: {e}"),
    }

    // FIELD
    let mut field_table = open_table(ms, Some("FIELD"), TableOpenMode::Read)?;
    let err = "FIELD";
    for i in 0..field_table.n_rows() {
        let phase_dir: Vec<f64> = field_table
            .get_cell_as_vec("PHASE_DIR", i)
            .map_err(casacore_err(err))?;
        match phase_dir.as_slice() {
            [ra, dec, ..] => ctx.phase_centres.push(RADec::from_radians(*ra, *dec)),
            _ => {
                return Err(ColumnSourceError::BadArrayShape {
                    argument: "PHASE_DIR".into(),
                    function: "read_obs_context".into(),
                    expected: "[2, n]".into(),
                    received: format!("{}", phase_dir.len()),
                })
            }
        }
    }

    // SPECTRAL_WINDOW
    let mut spw_table = open_table(ms, Some("SPECTRAL_WINDOW"), TableOpenMode::Read)?;
    let err = "SPECTRAL_WINDOW";
    for i in 0..spw_table.n_rows() {
        let chan_freqs_hz: Vec<f64> = spw_table
            .get_cell_as_vec("CHAN_FREQ", i)
            .map_err(casacore_err(err))?;
        let chan_widths_hz: Vec<f64> =
            spw_table.get_cell_as_vec("CHAN_WIDTH", i).map_err(casacore_err(err))?;
        let name: String = spw_table.get_cell("NAME", i).map_err(casacore_err(err))?;
        let meas_freq_ref: i32 = spw_table.get_cell("MEAS_FREQ_REF", i).map_err(casacore_err(err))?;
        ctx.spectral_windows.push(SpectralWindow {
            name,
            chan_freqs_hz,
            chan_widths_hz,
            is_lsrk: meas_freq_ref == MEAS_FREQ_REF_LSRK,
        });
    }

    // POLARIZATION
    let mut pol_table = open_table(ms, Some("POLARIZATION"), TableOpenMode::Read)?;
    let err = "POLARIZATION";
    for i in 0..pol_table.n_rows() {
        let codes: Vec<i32> = pol_table.get_cell_as_vec("CORR_TYPE", i).map_err(casacore_err(err))?;
        let corrs = codes
            .iter()
            .map(|&code| {
                CorrType::from_code(code).ok_or_else(|| ColumnSourceError::Casacore {
                    table: "POLARIZATION".into(),
                    message: format!("unknown CORR_TYPE {code} in row {i}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        ctx.polarizations.push(corrs);
    }

    // DATA_DESCRIPTION
    let mut dd_table = open_table(ms, Some("DATA_DESCRIPTION"), TableOpenMode::Read)?;
    let err = "DATA_DESCRIPTION";
    let spws: Vec<i32> = dd_table.get_col_as_vec("SPECTRAL_WINDOW_ID").map_err(casacore_err(err))?;
    let pols: Vec<i32> = dd_table.get_col_as_vec("POLARIZATION_ID").map_err(casacore_err(err))?;
    ctx.data_descriptions = spws
        .into_iter()
        .zip(pols)
        .map(|(spw, polarization)| DataDescription {
            spw: spw.max(0) as usize,
            polarization: polarization.max(0) as usize,
        })
        .collect();

    // POINTING
    match open_table(ms, Some("POINTING"), TableOpenMode::Read) {
        Ok(mut pointing_table) => {
            let err = "POINTING";
            let antennas: Vec<i32> = pointing_table
                .get_col_as_vec("ANTENNA_ID")
                .map_err(casacore_err(err))?;
            let times: Vec<f64> = pointing_table
                .get_col_as_vec("TIME")
                .map_err(casacore_err(err))?;
            let intervals: Vec<f64> = pointing_table
                .get_col_as_vec("INTERVAL")
                .map_err(casacore_err(err))?;
            for (i, ((antenna, time), interval)) in
                antennas.into_iter().zip(times).zip(intervals).enumerate()
            {
                let dir: Vec<f64> = pointing_table
                    .get_cell_as_vec("DIRECTION", i as u64)
                    .map_err(casacore_err(err))?;
                if let [ra, dec, ..] = dir.as_slice() {
                    ctx.pointing.push(PointingEntry {
                        antenna: antenna.max(0) as usize,
                        time,
                        interval,
                        direction: RADec::from_radians(*ra, *dec),
                    });
                } else {
                    warn!("POINTING row {i} has a malformed DIRECTION; ignoring it");
                }
            }
        }
        Err(e) => debug!("No POINTING table: {e}"),
    }

    Ok(ctx)
}
