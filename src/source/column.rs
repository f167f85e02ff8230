// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Typed column data, with the row axis first.

use std::ops::Range;

use ndarray::{prelude::*, RemoveAxis};

use super::{Column, ColumnSourceError, Slicer};
use crate::c32;

/// The contents of some rows of a column. The first axis is always the row
/// axis; per-row arrays are `[chan][corr]` (cubes) or `[corr]` (matrices).
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnData {
    Int(Array1<i32>),
    Bool(Array1<bool>),
    Float64(Array1<f64>),
    /// e.g. UVW, `[row][3]`.
    Float64Matrix(Array2<f64>),
    /// e.g. WEIGHT and SIGMA, `[row][corr]`.
    FloatMatrix(Array2<f32>),
    /// e.g. FLAG, `[row][chan][corr]`.
    BoolCube(Array3<bool>),
    /// e.g. WEIGHT_SPECTRUM and FLOAT_DATA, `[row][chan][corr]`.
    FloatCube(Array3<f32>),
    /// e.g. DATA, `[row][chan][corr]`.
    ComplexCube(Array3<c32>),
}

macro_rules! into_variant {
    ($fn_name:ident, $variant:ident, $ty:ty, $expected:literal) => {
        pub fn $fn_name(self, column: Column) -> Result<$ty, ColumnSourceError> {
            match self {
                ColumnData::$variant(a) => Ok(a),
                other => Err(ColumnSourceError::WrongType {
                    column,
                    expected: $expected,
                    received: other.type_name(),
                }),
            }
        }
    };
}

fn select_indices<A: Clone, D: RemoveAxis>(
    a: &Array<A, D>,
    axis: usize,
    axis_name: &'static str,
    indices: Option<&[usize]>,
) -> Result<Array<A, D>, ColumnSourceError> {
    match indices {
        None => Ok(a.clone()),
        Some(indices) => {
            let len = a.len_of(Axis(axis));
            if let Some(&index) = indices.iter().find(|&&i| i >= len) {
                return Err(ColumnSourceError::SliceOutOfRange {
                    axis: axis_name,
                    index,
                    len,
                });
            }
            Ok(a.select(Axis(axis), indices))
        }
    }
}

fn scatter_indices<A: Clone, D: RemoveAxis>(
    src: &Array<A, D>,
    dst: &mut Array<A, D>,
    axis: usize,
    axis_name: &'static str,
    indices: Option<&[usize]>,
) -> Result<(), ColumnSourceError> {
    let mut expected = dst.shape().to_vec();
    if let Some(indices) = indices {
        expected[axis] = indices.len();
    }
    if src.shape() != expected.as_slice() {
        return Err(ColumnSourceError::BadArrayShape {
            argument: "src".into(),
            function: "ColumnData::scatter".into(),
            expected: format!("{expected:?}"),
            received: format!("{:?}", src.shape()),
        });
    }
    match indices {
        None => {
            dst.assign(src);
            Ok(())
        }
        Some(indices) => {
            let len = dst.len_of(Axis(axis));
            for (i_src, &i_dst) in indices.iter().enumerate() {
                if i_dst >= len {
                    return Err(ColumnSourceError::SliceOutOfRange {
                        axis: axis_name,
                        index: i_dst,
                        len,
                    });
                }
                dst.index_axis_mut(Axis(axis), i_dst)
                    .assign(&src.index_axis(Axis(axis), i_src));
            }
            Ok(())
        }
    }
}

impl ColumnData {
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnData::Int(_) => "Int",
            ColumnData::Bool(_) => "Bool",
            ColumnData::Float64(_) => "Float64",
            ColumnData::Float64Matrix(_) => "Float64Matrix",
            ColumnData::FloatMatrix(_) => "FloatMatrix",
            ColumnData::BoolCube(_) => "BoolCube",
            ColumnData::FloatCube(_) => "FloatCube",
            ColumnData::ComplexCube(_) => "ComplexCube",
        }
    }

    pub fn num_rows(&self) -> usize {
        match self {
            ColumnData::Int(a) => a.len(),
            ColumnData::Bool(a) => a.len(),
            ColumnData::Float64(a) => a.len(),
            ColumnData::Float64Matrix(a) => a.len_of(Axis(0)),
            ColumnData::FloatMatrix(a) => a.len_of(Axis(0)),
            ColumnData::BoolCube(a) => a.len_of(Axis(0)),
            ColumnData::FloatCube(a) => a.len_of(Axis(0)),
            ColumnData::ComplexCube(a) => a.len_of(Axis(0)),
        }
    }

    /// The shape of the data, including the row axis.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            ColumnData::Int(a) => a.shape().to_vec(),
            ColumnData::Bool(a) => a.shape().to_vec(),
            ColumnData::Float64(a) => a.shape().to_vec(),
            ColumnData::Float64Matrix(a) => a.shape().to_vec(),
            ColumnData::FloatMatrix(a) => a.shape().to_vec(),
            ColumnData::BoolCube(a) => a.shape().to_vec(),
            ColumnData::FloatCube(a) => a.shape().to_vec(),
            ColumnData::ComplexCube(a) => a.shape().to_vec(),
        }
    }

    /// Copy out some rows.
    pub fn slice_rows(&self, rows: Range<usize>) -> ColumnData {
        let s = rows.start..rows.end;
        match self {
            ColumnData::Int(a) => ColumnData::Int(a.slice(s![s]).to_owned()),
            ColumnData::Bool(a) => ColumnData::Bool(a.slice(s![s]).to_owned()),
            ColumnData::Float64(a) => ColumnData::Float64(a.slice(s![s]).to_owned()),
            ColumnData::Float64Matrix(a) => {
                ColumnData::Float64Matrix(a.slice(s![s, ..]).to_owned())
            }
            ColumnData::FloatMatrix(a) => ColumnData::FloatMatrix(a.slice(s![s, ..]).to_owned()),
            ColumnData::BoolCube(a) => ColumnData::BoolCube(a.slice(s![s, .., ..]).to_owned()),
            ColumnData::FloatCube(a) => ColumnData::FloatCube(a.slice(s![s, .., ..]).to_owned()),
            ColumnData::ComplexCube(a) => {
                ColumnData::ComplexCube(a.slice(s![s, .., ..]).to_owned())
            }
        }
    }

    /// Overwrite rows starting at `start_row` with `src`, which must be the
    /// same type and have matching non-row axes.
    pub fn assign_rows(
        &mut self,
        column: Column,
        start_row: usize,
        src: &ColumnData,
    ) -> Result<(), ColumnSourceError> {
        let end = start_row + src.num_rows();
        if end > self.num_rows() {
            return Err(ColumnSourceError::RowsOutOfRange {
                rows: start_row..end,
                num_rows: self.num_rows(),
            });
        }
        let mut expected = self.shape();
        expected[0] = src.num_rows();
        if src.shape() != expected {
            return Err(ColumnSourceError::BadArrayShape {
                argument: "src".into(),
                function: "ColumnData::assign_rows".into(),
                expected: format!("{expected:?}"),
                received: format!("{:?}", src.shape()),
            });
        }
        match (self, src) {
            (ColumnData::Int(d), ColumnData::Int(s)) => d.slice_mut(s![start_row..end]).assign(s),
            (ColumnData::Bool(d), ColumnData::Bool(s)) => {
                d.slice_mut(s![start_row..end]).assign(s)
            }
            (ColumnData::Float64(d), ColumnData::Float64(s)) => {
                d.slice_mut(s![start_row..end]).assign(s)
            }
            (ColumnData::Float64Matrix(d), ColumnData::Float64Matrix(s)) => {
                d.slice_mut(s![start_row..end, ..]).assign(s)
            }
            (ColumnData::FloatMatrix(d), ColumnData::FloatMatrix(s)) => {
                d.slice_mut(s![start_row..end, ..]).assign(s)
            }
            (ColumnData::BoolCube(d), ColumnData::BoolCube(s)) => {
                d.slice_mut(s![start_row..end, .., ..]).assign(s)
            }
            (ColumnData::FloatCube(d), ColumnData::FloatCube(s)) => {
                d.slice_mut(s![start_row..end, .., ..]).assign(s)
            }
            (ColumnData::ComplexCube(d), ColumnData::ComplexCube(s)) => {
                d.slice_mut(s![start_row..end, .., ..]).assign(s)
            }
            (d, s) => {
                return Err(ColumnSourceError::WrongType {
                    column,
                    expected: d.type_name(),
                    received: s.type_name(),
                })
            }
        }
        Ok(())
    }

    /// Pick out the channels and correlations described by `slicer`. Columns
    /// without channel or correlation axes are returned unchanged.
    pub fn select(&self, slicer: &Slicer) -> Result<ColumnData, ColumnSourceError> {
        let chans = slicer.chans.as_deref();
        let corrs = slicer.corrs.as_deref();
        Ok(match self {
            ColumnData::FloatMatrix(a) => {
                ColumnData::FloatMatrix(select_indices(a, 1, "corr", corrs)?)
            }
            ColumnData::BoolCube(a) => {
                let a = select_indices(a, 1, "chan", chans)?;
                ColumnData::BoolCube(select_indices(&a, 2, "corr", corrs)?)
            }
            ColumnData::FloatCube(a) => {
                let a = select_indices(a, 1, "chan", chans)?;
                ColumnData::FloatCube(select_indices(&a, 2, "corr", corrs)?)
            }
            ColumnData::ComplexCube(a) => {
                let a = select_indices(a, 1, "chan", chans)?;
                ColumnData::ComplexCube(select_indices(&a, 2, "corr", corrs)?)
            }
            other => other.clone(),
        })
    }

    /// The inverse of [`ColumnData::select`]: write `sliced` into the channel
    /// and correlation positions of `self` described by `slicer`.
    pub fn scatter(
        &mut self,
        column: Column,
        sliced: &ColumnData,
        slicer: &Slicer,
    ) -> Result<(), ColumnSourceError> {
        let chans = slicer.chans.as_deref();
        let corrs = slicer.corrs.as_deref();
        fn scatter_cube<A: Clone>(
            dst: &mut Array3<A>,
            src: &Array3<A>,
            chans: Option<&[usize]>,
            corrs: Option<&[usize]>,
        ) -> Result<(), ColumnSourceError> {
            // Gather the destination's selected channels, scatter the
            // correlations into them, then scatter the channels back.
            let mut staged = select_indices(dst, 1, "chan", chans)?;
            scatter_indices(src, &mut staged, 2, "corr", corrs)?;
            scatter_indices(&staged, dst, 1, "chan", chans)
        }
        match (self, sliced) {
            (ColumnData::FloatMatrix(d), ColumnData::FloatMatrix(s)) => {
                scatter_indices(s, d, 1, "corr", corrs)
            }
            (ColumnData::BoolCube(d), ColumnData::BoolCube(s)) => scatter_cube(d, s, chans, corrs),
            (ColumnData::FloatCube(d), ColumnData::FloatCube(s)) => {
                scatter_cube(d, s, chans, corrs)
            }
            (ColumnData::ComplexCube(d), ColumnData::ComplexCube(s)) => {
                scatter_cube(d, s, chans, corrs)
            }
            (d, s) if d.type_name() == s.type_name() => {
                *d = s.clone();
                Ok(())
            }
            (d, s) => Err(ColumnSourceError::WrongType {
                column,
                expected: d.type_name(),
                received: s.type_name(),
            }),
        }
    }

    into_variant!(into_int, Int, Array1<i32>, "Int");
    into_variant!(into_bool, Bool, Array1<bool>, "Bool");
    into_variant!(into_float64, Float64, Array1<f64>, "Float64");
    into_variant!(into_float64_matrix, Float64Matrix, Array2<f64>, "Float64Matrix");
    into_variant!(into_float_matrix, FloatMatrix, Array2<f32>, "FloatMatrix");
    into_variant!(into_bool_cube, BoolCube, Array3<bool>, "BoolCube");
    into_variant!(into_float_cube, FloatCube, Array3<f32>, "FloatCube");
    into_variant!(into_complex_cube, ComplexCube, Array3<c32>, "ComplexCube");
}
