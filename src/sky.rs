// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Drives FT machines over a whole dataset, one sub-chunk at a time.

use log::debug;
use thiserror::Error;

use crate::{
    buffer::{VisBuffer, VisBufferError, VisCubeKind},
    ft::{FtError, FtMachine},
    iter::{VisIter, VisIterError},
};

#[derive(Error, Debug)]
pub enum SkyEquationError {
    #[error("No sky models were given to predict")]
    NoModels,

    #[error(transparent)]
    Iter(#[from] VisIterError),

    #[error(transparent)]
    Buffer(#[from] VisBufferError),

    #[error(transparent)]
    Ft(#[from] FtError),
}

/// Fill / transform / flush cycles over every chunk, channel group and
/// sub-chunk of an iterator. Any error ends the pass.
pub struct SkyEquation<'a> {
    iter: &'a VisIter,
}

impl<'a> SkyEquation<'a> {
    pub fn new(iter: &'a VisIter) -> SkyEquation<'a> {
        SkyEquation { iter }
    }

    /// Run `f` on a buffer at each sub-chunk, returning the number of rows
    /// visited.
    fn for_each_subchunk<F>(&self, mut f: F) -> Result<usize, SkyEquationError>
    where
        F: FnMut(&mut VisBuffer) -> Result<(), SkyEquationError>,
    {
        let mut vb = VisBuffer::attached(self.iter);
        let mut num_rows = 0;
        self.iter.origin_chunks()?;
        while self.iter.more_chunks() {
            self.iter.origin();
            while self.iter.more() {
                f(&mut vb)?;
                num_rows += vb.n_row()?;
                self.iter.advance();
            }
            self.iter.next_chunk();
        }
        Ok(num_rows)
    }

    /// Predict the sum of `models` into MODEL_DATA over the whole dataset.
    /// Returns the number of rows written.
    pub fn predict(&self, models: &mut [&mut dyn FtMachine]) -> Result<usize, SkyEquationError> {
        if models.is_empty() {
            return Err(SkyEquationError::NoModels);
        }
        let num_rows = self.for_each_subchunk(|vb| {
            let (first, rest) = models.split_at_mut(1);
            first[0].get(vb)?;
            if !rest.is_empty() {
                let mut total = vb.model_cube()?.clone();
                for model in rest {
                    model.get(vb)?;
                    total += vb.model_cube()?;
                }
                vb.set_vis_cube(VisCubeKind::Model, total)?;
            }
            vb.flush()?;
            Ok(())
        })?;
        debug!("Predicted {} sky models on {num_rows} rows", models.len());
        Ok(num_rows)
    }

    /// Grid the `kind` cube of the whole dataset. Returns the number of rows
    /// gridded.
    pub fn grid(
        &self,
        machine: &mut dyn FtMachine,
        kind: VisCubeKind,
    ) -> Result<usize, SkyEquationError> {
        let num_rows = self.for_each_subchunk(|vb| Ok(machine.put(vb, kind)?))?;
        debug!("Gridded {num_rows} rows");
        Ok(num_rows)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::{
        ft::{PointSource, PointSourcePredictor, WeightGridder},
        iter::VisIterConfig,
        source::{Column, ColumnSource},
        synthetic::{weight_value, SyntheticDataset},
        RADec,
    };

    fn predictor(radec: RADec, flux_density_jy: f64) -> PointSourcePredictor {
        PointSourcePredictor::new(vec![PointSource {
            name: "src".into(),
            radec,
            flux_density_jy,
            ref_freq_hz: 150e6,
            spectral_index: 0.0,
        }])
        .unwrap()
    }

    fn iter_for(synth: &SyntheticDataset) -> VisIter {
        VisIter::new(synth.build().unwrap(), VisIterConfig::default()).unwrap()
    }

    #[test]
    fn test_predict_writes_every_row() {
        let synth = SyntheticDataset {
            with_model: true,
            ..Default::default()
        };
        let iter = iter_for(&synth);
        let mut a = predictor(synth.phase_centre, 1.0);
        let mut b = predictor(synth.phase_centre, 2.5);
        let sky = SkyEquation::new(&iter);
        assert_eq!(sky.predict(&mut [&mut a, &mut b]).unwrap(), 6);
        assert_eq!(a.num_rows(), 6);

        let model = iter
            .with_source(|s| s.get_column(Column::ModelData, 0..6))
            .unwrap()
            .into_complex_cube(Column::ModelData)
            .unwrap();
        for row in model.outer_iter() {
            assert_abs_diff_eq!(row[(0, 0)].re, 3.5, epsilon = 1e-5);
            assert_abs_diff_eq!(row[(2, 3)].re, 3.5, epsilon = 1e-5);
            assert_abs_diff_eq!(row[(1, 1)].norm(), 0.0);
        }
        // The iterator has no buffers left hanging around.
        assert_eq!(iter.num_attached(), 0);
    }

    #[test]
    fn test_predict_creates_model_data() {
        let synth = SyntheticDataset::default();
        assert!(!synth.with_model);
        let iter = iter_for(&synth);
        assert!(!iter.with_source(|s| s.has_column(Column::ModelData)));
        let mut model = predictor(synth.phase_centre, 2.0);
        assert_eq!(SkyEquation::new(&iter).predict(&mut [&mut model]).unwrap(), 6);

        assert!(iter.with_source(|s| s.has_column(Column::ModelData)));
        let model = iter
            .with_source(|s| s.get_column(Column::ModelData, 0..6))
            .unwrap()
            .into_complex_cube(Column::ModelData)
            .unwrap();
        // Rows of the second sub-chunk were written too, not just those of
        // the first.
        for row in model.outer_iter() {
            assert_abs_diff_eq!(row[(1, 0)].re, 2.0, epsilon = 1e-5);
            assert_abs_diff_eq!(row[(1, 2)].norm(), 0.0);
        }
    }

    #[test]
    fn test_predict_needs_models() {
        let synth = SyntheticDataset::default();
        let iter = iter_for(&synth);
        assert!(matches!(
            SkyEquation::new(&iter).predict(&mut []),
            Err(SkyEquationError::NoModels)
        ));
    }

    #[test]
    fn test_grid_over_channel_groups() {
        let synth = SyntheticDataset::default();
        let iter = iter_for(&synth);
        // Three groups of one channel each.
        iter.select_channel_groups(&[3], &[0], &[1], &[1]).unwrap();
        let mut gridder = WeightGridder::new();
        let sky = SkyEquation::new(&iter);
        // Every row is visited once per channel group.
        assert_eq!(sky.grid(&mut gridder, VisCubeKind::Observed).unwrap(), 18);

        let per_chan: f32 = (0..4).map(weight_value).sum();
        assert_eq!(gridder.per_channel.len(), 3);
        for &w in gridder.per_channel.values() {
            assert_abs_diff_eq!(w, 6.0 * per_chan as f64);
        }
    }

    #[test]
    fn test_predictor_cannot_grid() {
        let synth = SyntheticDataset::default();
        let iter = iter_for(&synth);
        let mut machine = predictor(synth.phase_centre, 1.0);
        let result = SkyEquation::new(&iter).grid(&mut machine, VisCubeKind::Model);
        assert!(matches!(
            result,
            Err(SkyEquationError::Ft(FtError::Unsupported { .. }))
        ));
    }
}
