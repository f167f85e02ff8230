// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The visibility buffer: a lazy cache of everything a consumer might want to
//! know about the rows at an iterator's current position.
//!
//! Every [`Field`] has one validity bit. Asking for a field that isn't valid
//! fills it (and any fields it depends on, see [`Field::prerequisites`]) from
//! the attached [`VisIter`]; asking again returns the cached value without
//! touching the dataset. Moving the iterator clears every validity bit of the
//! buffer on top of its stack.

mod copy;
mod error;
mod field;
mod fill;
mod transform;

pub use error::VisBufferError;
pub use field::{Field, FieldSet};

use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use log::{debug, warn};
use ndarray::prelude::*;

use crate::{
    c32,
    iter::{ChunkPosition, IterState, VisIter, VisIterError},
    polarization::{CorrType, PolBasis},
    source::ColumnData,
    RADec, UVW,
};

macro_rules! vis_fields {
    ($( $(#[$doc:meta])* $variant:ident => $name:ident: $ty:ty, )*) => {
        /// The storage behind a [`VisBuffer`]. Only fields which the buffer
        /// reports as valid hold data for the current position.
        ///
        /// Cubes are `[row][chan][corr]`, matrices `[row][corr]`.
        #[derive(Clone, Debug, Default)]
        pub struct VisFields {
            $( $(#[$doc])* pub $name: $ty, )*
        }

        impl VisFields {
            fn clear(&mut self, field: Field) {
                match field {
                    $( Field::$variant => self.$name = Default::default(), )*
                }
            }

            fn copy_field(&mut self, other: &VisFields, field: Field) {
                match field {
                    $( Field::$variant => self.$name = other.$name.clone(), )*
                }
            }
        }
    };
}

vis_fields! {
    Antenna1 => antenna1: Vec<usize>,
    Antenna2 => antenna2: Vec<usize>,
    Feed1 => feed1: Vec<usize>,
    Feed2 => feed2: Vec<usize>,
    ArrayId => array_id: Vec<i32>,
    FieldId => field_id: Vec<i32>,
    DataDescId => data_desc_id: Vec<i32>,
    SpectralWindow => spectral_window: usize,
    PolarizationId => polarization_id: usize,
    ObservationId => observation_id: Vec<i32>,
    ProcessorId => processor_id: Vec<i32>,
    StateId => state_id: Vec<i32>,
    ScanNumber => scan_number: Vec<i32>,
    /// Casacore time of each row \[seconds\]
    Time => time: Vec<f64>,
    TimeInterval => time_interval: Vec<f64>,
    TimeCentroid => time_centroid: Vec<f64>,
    Exposure => exposure: Vec<f64>,
    Uvw => uvw: Vec<UVW>,
    /// `[row][3]` \[metres\]
    UvwMat => uvw_mat: Array2<f64>,
    FlagRow => flag_row: Array1<bool>,
    /// `[row][chan]`, set if any correlation is flagged.
    Flag => flag: Array2<bool>,
    FlagCube => flag_cube: Array3<bool>,
    VisCube => vis_cube: Array3<c32>,
    ModelCube => model_cube: Array3<c32>,
    CorrectedCube => corrected_cube: Array3<c32>,
    /// `None` if the dataset has no FLOAT_DATA.
    FloatCube => float_cube: Option<Array3<f32>>,
    /// The mean of each row's correlation weights.
    Weight => weight: Array1<f32>,
    WeightMat => weight_mat: Array2<f32>,
    /// `None` if the dataset has no WEIGHT_SPECTRUM.
    WeightSpectrum => weight_spectrum: Option<Array3<f32>>,
    /// The mean of each row's correlation sigmas.
    Sigma => sigma: Array1<f32>,
    SigmaMat => sigma_mat: Array2<f32>,
    /// \[Hz\]
    Frequency => frequency: Vec<f64>,
    /// \[Hz\]
    LsrFrequency => lsr_frequency: Vec<f64>,
    /// The spectral window channel of each buffer channel.
    ChannelList => channel_list: Vec<usize>,
    NChannel => n_channel: usize,
    NCorr => n_corr: usize,
    NRow => n_row: usize,
    CorrType => corr_type: Vec<CorrType>,
    PolFrame => pol_frame: Option<PolBasis>,
    PhaseCenter => phase_center: RADec,
    /// \[radians\]
    Feed1Pa => feed1_pa: Vec<f64>,
    /// \[radians\]
    Feed2Pa => feed2_pa: Vec<f64>,
    /// The parallactic angle at the array position for each row \[radians\]
    ParAngle => par_angle: Vec<f64>,
    Direction1 => direction1: Vec<RADec>,
    Direction2 => direction2: Vec<RADec>,
    RowIds => row_ids: Vec<usize>,
}

/// The part of a buffer its iterator can reach.
pub(crate) struct BufferShared {
    valid: Cell<FieldSet>,
    invalidations: Cell<u64>,
    attached: Cell<bool>,
}

impl BufferShared {
    fn new() -> Rc<BufferShared> {
        Rc::new(BufferShared {
            valid: Cell::new(FieldSet::empty()),
            invalidations: Cell::new(0),
            attached: Cell::new(false),
        })
    }

    /// Clear every validity bit.
    pub(crate) fn invalidate(&self) {
        self.valid.set(FieldSet::empty());
        self.invalidations.set(self.invalidations.get() + 1);
    }

    pub(crate) fn set_attached(&self, attached: bool) {
        self.attached.set(attached);
    }
}

enum Link {
    Detached,
    /// On the iterator's stack; invalidated when the iterator moves.
    Attached(Weak<RefCell<IterState>>),
    /// Copied from an attached buffer. May pull data while the iterator is
    /// still where the copy was made.
    OneWay {
        iter: Weak<RefCell<IterState>>,
        generation: u64,
    },
}

/// The correlation order of a buffer's correlation-axis fields.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum CorrOrder {
    /// As stored in the dataset.
    #[default]
    Native,
    /// Canonical (e.g. XX, XY, YX, YY). The permutation maps canonical
    /// positions to native ones.
    Canonical(Vec<usize>),
}

/// Which visibility cube.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisCubeKind {
    Observed,
    Model,
    Corrected,
}

impl VisCubeKind {
    pub fn field(self) -> Field {
        match self {
            VisCubeKind::Observed => Field::VisCube,
            VisCubeKind::Model => Field::ModelCube,
            VisCubeKind::Corrected => Field::CorrectedCube,
        }
    }
}

/// A lazily-filled view of the rows at an iterator's position.
pub struct VisBuffer {
    shared: Rc<BufferShared>,
    link: Link,
    seen_invalidations: u64,
    store: VisFields,
    dirty: FieldSet,
    corr_order: CorrOrder,
    chan_averaged: bool,
    stokes_formed: bool,
}

impl Default for VisBuffer {
    fn default() -> Self {
        VisBuffer::new()
    }
}

macro_rules! ref_accessors {
    ($( $(#[$doc:meta])* $name:ident: $variant:ident -> $ret:ty; )*) => {
        $(
            $(#[$doc])*
            pub fn $name(&mut self) -> Result<&$ret, VisBufferError> {
                self.ensure(Field::$variant)?;
                let value: &$ret = &self.store.$name;
                Ok(value)
            }
        )*
    };
}

macro_rules! copy_accessors {
    ($( $(#[$doc:meta])* $name:ident: $variant:ident -> $ret:ty; )*) => {
        $(
            $(#[$doc])*
            pub fn $name(&mut self) -> Result<$ret, VisBufferError> {
                self.ensure(Field::$variant)?;
                Ok(self.store.$name)
            }
        )*
    };
}

impl VisBuffer {
    /// A detached, empty buffer.
    pub fn new() -> VisBuffer {
        VisBuffer {
            shared: BufferShared::new(),
            link: Link::Detached,
            seen_invalidations: 0,
            store: VisFields::default(),
            dirty: FieldSet::empty(),
            corr_order: CorrOrder::Native,
            chan_averaged: false,
            stokes_formed: false,
        }
    }

    /// A new buffer, attached to the top of `iter`'s stack.
    pub fn attached(iter: &VisIter) -> VisBuffer {
        let mut buffer = VisBuffer::new();
        iter.state().borrow_mut().push_buffer(&buffer.shared);
        buffer.link = Link::Attached(iter.downgrade());
        buffer.sync();
        buffer
    }

    /// Attach to the top of `iter`'s stack. Every field becomes invalid.
    pub fn attach(&mut self, iter: &VisIter) -> Result<(), VisBufferError> {
        if self.is_attached() {
            return Err(VisIterError::AlreadyAttached.into());
        }
        iter.state().borrow_mut().push_buffer(&self.shared);
        self.link = Link::Attached(iter.downgrade());
        self.sync();
        Ok(())
    }

    /// Detach from the iterator. Only the top of the stack may be detached.
    /// Valid fields stay valid. Detaching from an iterator which has since
    /// been dropped succeeds.
    pub fn detach(&mut self) -> Result<(), VisBufferError> {
        self.sync();
        match &self.link {
            Link::Attached(weak) => {
                match weak.upgrade() {
                    Some(iter) => iter.borrow_mut().pop_buffer(&self.shared)?,
                    None => debug!("Detaching from an iterator which no longer exists"),
                }
                self.link = Link::Detached;
                Ok(())
            }
            Link::OneWay { .. } => {
                self.link = Link::Detached;
                Ok(())
            }
            Link::Detached => Err(VisIterError::NotAttached.into()),
        }
    }

    /// Is this buffer on a live iterator's stack?
    pub fn is_attached(&self) -> bool {
        matches!(self.link, Link::Attached(_)) && self.shared.attached.get()
    }

    /// Is this buffer a copy still linked to the iterator it was copied from?
    pub fn is_one_way(&self) -> bool {
        matches!(self.link, Link::OneWay { .. })
    }

    pub fn is_valid(&self, field: Field) -> bool {
        self.shared.valid.get().contains(field)
    }

    pub fn valid_fields(&self) -> FieldSet {
        self.shared.valid.get()
    }

    /// Fields changed through a setter and not yet flushed.
    pub fn dirty_fields(&self) -> FieldSet {
        self.dirty
    }

    pub fn corr_order(&self) -> &CorrOrder {
        &self.corr_order
    }

    pub fn is_chan_averaged(&self) -> bool {
        self.chan_averaged
    }

    pub fn is_stokes_formed(&self) -> bool {
        self.stokes_formed
    }

    /// The iterator position this buffer's fields come from. `None` if the
    /// buffer can't fill from an iterator: it is detached, not on top of
    /// the stack, or a copy the iterator has moved on from.
    pub fn position(&mut self) -> Option<ChunkPosition> {
        self.sync();
        let iter = self.pull_link(Field::RowIds).ok()?;
        let position = iter.borrow().position();
        Some(position)
    }

    /// The raw storage, for reading several fields at once after
    /// [`VisBuffer::ensure_all`].
    pub fn cached(&self) -> &VisFields {
        &self.store
    }

    /// Make a field valid, filling it and its prerequisites as needed.
    pub fn ensure(&mut self, field: Field) -> Result<(), VisBufferError> {
        self.sync();
        self.ensure_inner(field)
    }

    pub fn ensure_all(&mut self, fields: &[Field]) -> Result<(), VisBufferError> {
        self.sync();
        fields.iter().try_for_each(|&f| self.ensure_inner(f))
    }

    fn ensure_inner(&mut self, field: Field) -> Result<(), VisBufferError> {
        if self.is_valid(field) {
            return Ok(());
        }
        for &pre in field.prerequisites() {
            self.ensure_inner(pre)?;
        }
        self.fill(field)?;
        self.mark_valid(field);
        Ok(())
    }

    /// Catch up with invalidations made by the iterator. Reshaping state
    /// belongs to the old position and is dropped, as are unflushed changes.
    fn sync(&mut self) {
        let invalidations = self.shared.invalidations.get();
        if invalidations == self.seen_invalidations {
            return;
        }
        self.seen_invalidations = invalidations;
        if !self.dirty.is_empty() {
            warn!(
                "Discarding unflushed changes to {:?}; the buffer was invalidated first",
                self.dirty
            );
            self.dirty = FieldSet::empty();
        }
        self.corr_order = CorrOrder::Native;
        self.chan_averaged = false;
        self.stokes_formed = false;
    }

    fn mark_valid(&self, field: Field) {
        let mut valid = self.shared.valid.get();
        valid.insert(field);
        self.shared.valid.set(valid);
    }

    fn mark_invalid(&self, field: Field) {
        let mut valid = self.shared.valid.get();
        valid.remove(field);
        self.shared.valid.set(valid);
    }

    /// The way this buffer no longer matches its iterator's layout, if it
    /// doesn't.
    fn reshape_state(&self) -> Option<&'static str> {
        if matches!(self.corr_order, CorrOrder::Canonical(_)) {
            Some("correlation-sorted")
        } else if self.stokes_formed {
            Some("Stokes-formed")
        } else if self.chan_averaged {
            Some("channel-averaged")
        } else {
            None
        }
    }

    /// The iterator to pull `field` from, if this buffer may pull.
    fn pull_link(&self, field: Field) -> Result<Rc<RefCell<IterState>>, VisBufferError> {
        let iter = match &self.link {
            Link::Detached => return Err(VisBufferError::DetachedAccess { field }),
            Link::Attached(weak) => {
                let iter = weak
                    .upgrade()
                    .ok_or(VisBufferError::DetachedAccess { field })?;
                if !iter.borrow().is_top(&self.shared) {
                    return Err(VisBufferError::NotTopOfStack { field });
                }
                iter
            }
            Link::OneWay { iter, generation } => {
                let iter = iter
                    .upgrade()
                    .ok_or(VisBufferError::DetachedAccess { field })?;
                let current = iter.borrow().generation();
                if current != *generation {
                    return Err(VisBufferError::StalePosition {
                        field,
                        copied: *generation,
                        current,
                    });
                }
                iter
            }
        };
        iter.borrow_mut().ensure_state();
        Ok(iter)
    }

    fn cube_dims(&mut self) -> Result<(usize, usize, usize), VisBufferError> {
        self.ensure_inner(Field::NRow)?;
        self.ensure_inner(Field::NChannel)?;
        self.ensure_inner(Field::NCorr)?;
        Ok((self.store.n_row, self.store.n_channel, self.store.n_corr))
    }

    ref_accessors! {
        antenna1: Antenna1 -> [usize];
        antenna2: Antenna2 -> [usize];
        feed1: Feed1 -> [usize];
        feed2: Feed2 -> [usize];
        array_id: ArrayId -> [i32];
        field_id: FieldId -> [i32];
        data_desc_id: DataDescId -> [i32];
        observation_id: ObservationId -> [i32];
        processor_id: ProcessorId -> [i32];
        state_id: StateId -> [i32];
        scan_number: ScanNumber -> [i32];
        time: Time -> [f64];
        time_interval: TimeInterval -> [f64];
        time_centroid: TimeCentroid -> [f64];
        exposure: Exposure -> [f64];
        uvw: Uvw -> [UVW];
        uvw_mat: UvwMat -> Array2<f64>;
        flag_row: FlagRow -> Array1<bool>;
        flag: Flag -> Array2<bool>;
        flag_cube: FlagCube -> Array3<bool>;
        vis_cube: VisCube -> Array3<c32>;
        model_cube: ModelCube -> Array3<c32>;
        corrected_cube: CorrectedCube -> Array3<c32>;
        weight: Weight -> Array1<f32>;
        weight_mat: WeightMat -> Array2<f32>;
        sigma: Sigma -> Array1<f32>;
        sigma_mat: SigmaMat -> Array2<f32>;
        frequency: Frequency -> [f64];
        lsr_frequency: LsrFrequency -> [f64];
        channel_list: ChannelList -> [usize];
        corr_type: CorrType -> [CorrType];
        /// \[radians\]
        feed1_pa: Feed1Pa -> [f64];
        /// \[radians\]
        feed2_pa: Feed2Pa -> [f64];
        /// \[radians\]
        par_angle: ParAngle -> [f64];
        direction1: Direction1 -> [RADec];
        direction2: Direction2 -> [RADec];
        row_ids: RowIds -> [usize];
    }

    copy_accessors! {
        spectral_window: SpectralWindow -> usize;
        polarization_id: PolarizationId -> usize;
        n_channel: NChannel -> usize;
        n_corr: NCorr -> usize;
        n_row: NRow -> usize;
        pol_frame: PolFrame -> Option<PolBasis>;
        phase_center: PhaseCenter -> RADec;
    }

    pub fn float_cube(&mut self) -> Result<Option<&Array3<f32>>, VisBufferError> {
        self.ensure(Field::FloatCube)?;
        Ok(self.store.float_cube.as_ref())
    }

    pub fn weight_spectrum(&mut self) -> Result<Option<&Array3<f32>>, VisBufferError> {
        self.ensure(Field::WeightSpectrum)?;
        Ok(self.store.weight_spectrum.as_ref())
    }

    /// One of the visibility cubes.
    pub fn cube(&mut self, kind: VisCubeKind) -> Result<&Array3<c32>, VisBufferError> {
        self.ensure(kind.field())?;
        Ok(match kind {
            VisCubeKind::Observed => &self.store.vis_cube,
            VisCubeKind::Model => &self.store.model_cube,
            VisCubeKind::Corrected => &self.store.corrected_cube,
        })
    }

    /// Record a change made by a setter.
    fn written(&mut self, field: Field) {
        self.mark_valid(field);
        self.dirty.insert(field);
    }

    pub fn set_flag_cube(&mut self, flags: Array3<bool>) -> Result<(), VisBufferError> {
        self.sync();
        let expected = self.cube_dims()?;
        check_dims("flags", "VisBuffer::set_flag_cube", expected, flags.dim())?;
        self.store.flag_cube = flags;
        self.written(Field::FlagCube);
        self.mark_invalid(Field::Flag);
        Ok(())
    }

    pub fn set_flag_row(&mut self, flag_row: Array1<bool>) -> Result<(), VisBufferError> {
        self.sync();
        let (num_rows, _, _) = self.cube_dims()?;
        check_dims("flag_row", "VisBuffer::set_flag_row", num_rows, flag_row.dim())?;
        self.store.flag_row = flag_row;
        self.written(Field::FlagRow);
        Ok(())
    }

    pub fn set_vis_cube(
        &mut self,
        kind: VisCubeKind,
        cube: Array3<c32>,
    ) -> Result<(), VisBufferError> {
        self.sync();
        let expected = self.cube_dims()?;
        check_dims("cube", "VisBuffer::set_vis_cube", expected, cube.dim())?;
        match kind {
            VisCubeKind::Observed => self.store.vis_cube = cube,
            VisCubeKind::Model => self.store.model_cube = cube,
            VisCubeKind::Corrected => self.store.corrected_cube = cube,
        }
        self.written(kind.field());
        Ok(())
    }

    pub fn set_weight_mat(&mut self, weights: Array2<f32>) -> Result<(), VisBufferError> {
        self.sync();
        let (num_rows, _, num_corrs) = self.cube_dims()?;
        check_dims(
            "weights",
            "VisBuffer::set_weight_mat",
            (num_rows, num_corrs),
            weights.dim(),
        )?;
        self.store.weight_mat = weights;
        self.written(Field::WeightMat);
        self.mark_invalid(Field::Weight);
        Ok(())
    }

    pub fn set_weight_spectrum(&mut self, weights: Array3<f32>) -> Result<(), VisBufferError> {
        self.sync();
        let expected = self.cube_dims()?;
        check_dims(
            "weights",
            "VisBuffer::set_weight_spectrum",
            expected,
            weights.dim(),
        )?;
        self.store.weight_spectrum = Some(weights);
        self.written(Field::WeightSpectrum);
        Ok(())
    }

    fn column_data(&self, field: Field) -> Option<ColumnData> {
        let s = &self.store;
        Some(match field {
            Field::FlagCube => ColumnData::BoolCube(s.flag_cube.clone()),
            Field::FlagRow => ColumnData::Bool(s.flag_row.clone()),
            Field::VisCube => ColumnData::ComplexCube(s.vis_cube.clone()),
            Field::ModelCube => ColumnData::ComplexCube(s.model_cube.clone()),
            Field::CorrectedCube => ColumnData::ComplexCube(s.corrected_cube.clone()),
            Field::WeightMat => ColumnData::FloatMatrix(s.weight_mat.clone()),
            Field::WeightSpectrum => ColumnData::FloatCube(s.weight_spectrum.clone()?),
            _ => return None,
        })
    }

    /// Write every dirty field back to the dataset at the iterator's current
    /// position, returning how many columns were written.
    pub fn flush(&mut self) -> Result<usize, VisBufferError> {
        self.sync();
        let first = match self.dirty.iter().next() {
            Some(f) => f,
            None => return Ok(0),
        };
        if let Some(state) = self.reshape_state() {
            return Err(VisBufferError::DestructiveState {
                operation: "flush",
                state,
            });
        }
        let iter = self.pull_link(first)?;
        let mut state = iter.borrow_mut();
        let rows = state.rows();
        let slicer = state.slicer();
        let position = state.position();

        let mut written = 0;
        for field in self.dirty.iter() {
            let (column, data) = match (field.column(), self.column_data(field)) {
                (Some(c), Some(d)) => (c, d),
                _ => continue,
            };
            let source = state.source_mut();
            // The first write to an absent MODEL_DATA and the like creates it.
            let result = if column.is_optional() && !source.has_column(column) {
                source.add_column(column)
            } else {
                Ok(())
            }
            .and_then(|()| {
                if column.has_corr_axis() {
                    source.put_column_sliced(column, rows.start, &data, &slicer)
                } else {
                    source.put_column(column, rows.start, &data)
                }
            });
            result.map_err(|source| VisBufferError::Flush {
                field,
                position: position.clone(),
                source,
            })?;
            written += 1;
        }
        debug!("Flushed {written} columns at {position}");
        self.dirty = FieldSet::empty();
        Ok(written)
    }
}

impl Drop for VisBuffer {
    fn drop(&mut self) {
        if let Link::Attached(weak) = &self.link {
            if let Some(iter) = weak.upgrade() {
                if let Ok(mut state) = iter.try_borrow_mut() {
                    state.remove_buffer(&self.shared);
                }
            }
        }
        if !self.dirty.is_empty() && self.seen_invalidations == self.shared.invalidations.get() {
            warn!(
                "A buffer with unflushed changes to {:?} was dropped",
                self.dirty
            );
        }
    }
}

fn check_dims<D: std::fmt::Debug + PartialEq>(
    argument: &str,
    function: &str,
    expected: D,
    received: D,
) -> Result<(), VisBufferError> {
    if expected == received {
        Ok(())
    } else {
        Err(VisBufferError::BadArrayShape {
            argument: argument.to_string(),
            function: function.to_string(),
            expected: format!("{expected:?}"),
            received: format!("{received:?}"),
        })
    }
}

#[cfg(test)]
mod tests;
