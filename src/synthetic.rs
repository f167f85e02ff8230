// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Small, fully-populated datasets held in memory.
//!
//! Every value is a simple function of its row, channel and correlation, so
//! tests can tell exactly which part of the dataset a buffer holds.

use itertools::iproduct;
use ndarray::prelude::*;

use crate::{
    c32,
    context::{Antenna, DataDescription, Feed, ObsContext, PointingTable, SpectralWindow},
    polarization::CorrType,
    source::{Column, ColumnData, ColumnSourceError, MemorySource},
    LatLngHeight, RADec,
};

/// The DATA value of a synthetic dataset at a row, channel and correlation.
pub fn vis_value(row: usize, chan: usize, corr: usize) -> c32 {
    c32::new(
        (row * 100 + chan * 10 + corr) as f32,
        -((row * 100 + chan) as f32),
    )
}

/// The WEIGHT value of a synthetic dataset for a correlation.
pub fn weight_value(corr: usize) -> f32 {
    1.0 + corr as f32
}

/// Describes a synthetic dataset. Rows are time-major: all baselines of the
/// first timestamp, then all baselines of the second, and so on.
#[derive(Clone, Debug)]
pub struct SyntheticDataset {
    pub num_ants: usize,
    /// The baselines of each timestamp. `None` means every cross-correlation
    /// of `num_ants` antennas.
    pub baselines: Option<Vec<(usize, usize)>>,
    pub num_chans: usize,
    pub corrs: Vec<CorrType>,
    pub num_times: usize,
    /// The start of the first integration (casacore time) \[seconds\]
    pub start_time: f64,
    /// \[seconds\]
    pub int_time: f64,
    /// The centre frequency of the first channel \[Hz\]
    pub freq_start_hz: f64,
    /// \[Hz\]
    pub freq_res_hz: f64,
    pub phase_centre: RADec,
    pub array_pos: LatLngHeight,
    pub with_model: bool,
    pub with_corrected: bool,
    pub with_float: bool,
    pub with_weight_spectrum: bool,
}

impl Default for SyntheticDataset {
    fn default() -> Self {
        SyntheticDataset {
            num_ants: 3,
            baselines: None,
            num_chans: 3,
            corrs: vec![CorrType::XX, CorrType::XY, CorrType::YX, CorrType::YY],
            num_times: 2,
            // 2020-05-31T00:00:00 UTC
            start_time: 59000.0 * 86400.0,
            int_time: 2.0,
            freq_start_hz: 150e6,
            freq_res_hz: 40e3,
            phase_centre: RADec::from_degrees(0.0, -27.0),
            array_pos: LatLngHeight {
                longitude_rad: 116.67_f64.to_radians(),
                latitude_rad: (-26.70_f64).to_radians(),
                height_metres: 377.83,
            },
            with_model: false,
            with_corrected: false,
            with_float: false,
            with_weight_spectrum: false,
        }
    }
}

impl SyntheticDataset {
    /// The baselines of each timestamp.
    pub fn baselines(&self) -> Vec<(usize, usize)> {
        match &self.baselines {
            Some(b) => b.clone(),
            None => (0..self.num_ants)
                .flat_map(|a1| (a1 + 1..self.num_ants).map(move |a2| (a1, a2)))
                .collect(),
        }
    }

    pub fn num_rows(&self) -> usize {
        self.baselines().len() * self.num_times
    }

    /// The centre time of a timestep (casacore time) \[seconds\].
    pub fn time(&self, timestep: usize) -> f64 {
        self.start_time + (timestep as f64 + 0.5) * self.int_time
    }

    pub fn obs_context(&self) -> ObsContext {
        let antennas = (0..self.num_ants)
            .map(|i| Antenna {
                name: format!("ANT{i:02}"),
                position: LatLngHeight {
                    longitude_rad: self.array_pos.longitude_rad + i as f64 * 1e-5,
                    ..self.array_pos
                },
            })
            .collect();
        let feeds = (0..self.num_ants)
            .map(|antenna| Feed {
                antenna,
                feed_id: 0,
                receptor_angle: 0.0,
                beam_offset: (0.0, 0.0),
            })
            .collect();
        ObsContext {
            name: Some("synthetic".into()),
            array_pos: self.array_pos,
            antennas,
            feeds,
            phase_centres: vec![self.phase_centre],
            spectral_windows: vec![SpectralWindow {
                name: "SPW0".into(),
                chan_freqs_hz: (0..self.num_chans)
                    .map(|c| self.freq_start_hz + c as f64 * self.freq_res_hz)
                    .collect(),
                chan_widths_hz: vec![self.freq_res_hz; self.num_chans],
                is_lsrk: false,
            }],
            polarizations: vec![self.corrs.clone()],
            data_descriptions: vec![DataDescription {
                spw: 0,
                polarization: 0,
            }],
            pointing: PointingTable::default(),
        }
    }

    /// Build the dataset.
    pub fn build(&self) -> Result<MemorySource, ColumnSourceError> {
        let baselines = self.baselines();
        let num_rows = self.num_rows();
        let num_corrs = self.corrs.len();
        let cube_dims = (num_rows, self.num_chans, num_corrs);

        let mut ant1 = Vec::with_capacity(num_rows);
        let mut ant2 = Vec::with_capacity(num_rows);
        let mut times = Vec::with_capacity(num_rows);
        let mut uvws = Array2::zeros((num_rows, 3));
        for (row, (t, &(a1, a2))) in iproduct!(0..self.num_times, baselines.iter()).enumerate() {
            ant1.push(a1 as i32);
            ant2.push(a2 as i32);
            times.push(self.time(t));
            uvws[(row, 0)] = (a2 as f64 - a1 as f64) * 100.0;
            uvws[(row, 1)] = (a1 + a2) as f64 * 10.0 + t as f64;
            uvws[(row, 2)] = a1 as f64;
        }

        let data = Array3::from_shape_fn(cube_dims, |(r, c, p)| vis_value(r, c, p));
        let weights = Array2::from_shape_fn((num_rows, num_corrs), |(_, p)| weight_value(p));
        let sigmas = weights.mapv(|w| 1.0 / w.sqrt());
        let zeros = || ColumnData::Int(Array1::zeros(num_rows));

        let mut source = MemorySource::new(self.obs_context(), num_rows);
        let mut columns = vec![
            (Column::Antenna1, ColumnData::Int(Array1::from(ant1))),
            (Column::Antenna2, ColumnData::Int(Array1::from(ant2))),
            (Column::Feed1, zeros()),
            (Column::Feed2, zeros()),
            (Column::ArrayId, zeros()),
            (Column::FieldId, zeros()),
            (Column::DataDescId, zeros()),
            (Column::ObservationId, zeros()),
            (Column::ProcessorId, zeros()),
            (Column::StateId, zeros()),
            (Column::ScanNumber, ColumnData::Int(Array1::ones(num_rows))),
            (Column::Time, ColumnData::Float64(Array1::from(times.clone()))),
            (
                Column::Interval,
                ColumnData::Float64(Array1::from_elem(num_rows, self.int_time)),
            ),
            (Column::TimeCentroid, ColumnData::Float64(Array1::from(times))),
            (
                Column::Exposure,
                ColumnData::Float64(Array1::from_elem(num_rows, self.int_time)),
            ),
            (Column::Uvw, ColumnData::Float64Matrix(uvws)),
            (
                Column::FlagRow,
                ColumnData::Bool(Array1::from_elem(num_rows, false)),
            ),
            (
                Column::Flag,
                ColumnData::BoolCube(Array3::from_elem(cube_dims, false)),
            ),
            (Column::Weight, ColumnData::FloatMatrix(weights.clone())),
            (Column::Sigma, ColumnData::FloatMatrix(sigmas)),
        ];
        if self.with_model {
            columns.push((Column::ModelData, ColumnData::ComplexCube(Array3::zeros(cube_dims))));
        }
        if self.with_corrected {
            columns.push((Column::CorrectedData, ColumnData::ComplexCube(data.clone())));
        }
        if self.with_float {
            columns.push((Column::FloatData, ColumnData::FloatCube(data.mapv(|v| v.re))));
        }
        if self.with_weight_spectrum {
            let spectrum =
                Array3::from_shape_fn(cube_dims, |(r, _, p)| weights[(r, p)]);
            columns.push((Column::WeightSpectrum, ColumnData::FloatCube(spectrum)));
        }
        columns.push((Column::Data, ColumnData::ComplexCube(data)));

        for (column, data) in columns {
            source.insert_column(column, data)?;
        }
        Ok(source)
    }
}
