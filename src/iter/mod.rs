// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Chunked iteration over a [`ColumnSource`].
//!
//! A [`VisIter`] walks a dataset in two levels. The outer level visits
//! chunks (rows sharing array, field and data description) and, within each
//! chunk, every selected channel group. The inner level visits the
//! sub-chunks of the current chunk: rows sharing a timestamp, or fixed-size
//! row blocks.
//!
//! ```text
//! iter.origin_chunks()?;
//! while iter.more_chunks() {
//!     iter.origin();
//!     while iter.more() {
//!         // read through an attached VisBuffer
//!         iter.advance();
//!     }
//!     iter.next_chunk();
//! }
//! ```
//!
//! [`VisBuffer`](crate::VisBuffer)s attach to the iterator in a stack. Every
//! move of the iterator clears the validity bits of the buffer on top of the
//! stack; only that buffer may pull data.

mod chunks;
mod error;

pub use error::VisIterError;

use std::{
    cell::RefCell,
    ops::Range,
    rc::{Rc, Weak},
};

use log::{debug, trace, warn};

use crate::{
    buffer::BufferShared,
    context::ObsContext,
    pos::get_parallactic_angle,
    selection::{ChannelSelection, CorrSelection},
    source::{Column, ColumnSource, Slicer},
};
use chunks::{scan_chunks, sub_chunks, ChunkInfo};
pub(crate) use chunks::to_index;

/// How rows are grouped into chunks and sub-chunks.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VisIterConfig {
    /// The number of rows in each sub-chunk. 0 means each sub-chunk is a run
    /// of rows sharing a timestamp.
    pub row_blocking: usize,

    /// The longest span of time a chunk may cover \[seconds\]. 0 means no
    /// limit.
    pub chunk_interval_s: f64,
}

impl Default for VisIterConfig {
    fn default() -> Self {
        VisIterConfig {
            row_blocking: 0,
            chunk_interval_s: 0.0,
        }
    }
}

/// Where an iterator is. Errors raised while filling a buffer carry one of
/// these.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkPosition {
    pub chunk: usize,
    pub chan_group: usize,
    pub subchunk: usize,
    pub rows: Range<usize>,
}

impl std::fmt::Display for ChunkPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "chunk {}, channel group {}, sub-chunk {} (rows {}..{})",
            self.chunk, self.chan_group, self.subchunk, self.rows.start, self.rows.end
        )
    }
}

pub(crate) struct IterState {
    source: Box<dyn ColumnSource>,
    config: VisIterConfig,
    chan_sel: ChannelSelection,
    corr_sel: CorrSelection,

    scanned: bool,
    chunks: Vec<ChunkInfo>,
    times: Vec<f64>,
    chunk_idx: usize,
    chan_group: usize,

    /// Are `subchunks` up to date with the chunk position?
    state_ok: bool,
    subchunks: Vec<Range<usize>>,
    subchunk_idx: usize,

    /// Bumped on every move.
    generation: u64,
    /// Attached buffers, bottom first.
    attached: Vec<Weak<BufferShared>>,

    /// Per-antenna parallactic angles, keyed by (timestamp, field).
    pa_cache: Option<((u64, usize), Vec<f64>)>,
    pa_computations: usize,
}

impl IterState {
    pub(crate) fn source(&self) -> &dyn ColumnSource {
        self.source.as_ref()
    }

    pub(crate) fn source_mut(&mut self) -> &mut dyn ColumnSource {
        self.source.as_mut()
    }

    pub(crate) fn obs_context(&self) -> &ObsContext {
        self.source.obs_context()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn chunk(&self) -> Option<&ChunkInfo> {
        self.chunks.get(self.chunk_idx)
    }

    fn more_chunks(&self) -> bool {
        self.chunk_idx < self.chunks.len()
    }

    /// Recompute the sub-chunks of the current chunk if a chunk move made
    /// them stale.
    pub(crate) fn ensure_state(&mut self) {
        if self.state_ok {
            return;
        }
        self.subchunks = match self.chunks.get(self.chunk_idx) {
            Some(chunk) => sub_chunks(chunk.rows.clone(), &self.times, self.config.row_blocking),
            None => vec![],
        };
        self.subchunk_idx = 0;
        self.state_ok = true;
        trace!(
            "Chunk {} has {} sub-chunks",
            self.chunk_idx,
            self.subchunks.len()
        );
    }

    /// The rows of the current sub-chunk. Empty once iteration is exhausted.
    pub(crate) fn rows(&self) -> Range<usize> {
        match self.subchunks.get(self.subchunk_idx) {
            Some(rows) => rows.clone(),
            None => {
                let end = self.chunks.last().map(|c| c.rows.end).unwrap_or(0);
                end..end
            }
        }
    }

    pub(crate) fn position(&self) -> ChunkPosition {
        ChunkPosition {
            chunk: self.chunk_idx,
            chan_group: self.chan_group,
            subchunk: self.subchunk_idx,
            rows: self.rows(),
        }
    }

    /// The input channels of the current channel group.
    pub(crate) fn channels(&self) -> Vec<usize> {
        match self.chunk() {
            Some(chunk) => {
                let num_chans = self.obs_context().spectral_windows[chunk.spw].num_chans();
                self.chan_sel
                    .group_channels(chunk.spw, self.chan_group, num_chans)
            }
            None => vec![],
        }
    }

    /// The indices of the selected correlations of the current chunk.
    pub(crate) fn corr_indices(&self) -> Vec<usize> {
        match self.chunk() {
            Some(chunk) => match self.corr_sel.corrs(chunk.polarization) {
                Some(corrs) => corrs.to_vec(),
                None => (0..self.obs_context().polarizations[chunk.polarization].len()).collect(),
            },
            None => vec![],
        }
    }

    /// The shape of a `[row][chan][corr]` cube at the current position.
    pub(crate) fn cube_shape(&self) -> (usize, usize, usize) {
        (
            self.rows().len(),
            self.channels().len(),
            self.corr_indices().len(),
        )
    }

    pub(crate) fn slicer(&self) -> Slicer {
        let chunk = match self.chunk() {
            Some(c) => c,
            None => return Slicer::default(),
        };
        let num_chans = self.obs_context().spectral_windows[chunk.spw].num_chans();
        let chans = if self.chan_sel.is_full(chunk.spw, self.chan_group, num_chans) {
            None
        } else {
            Some(
                self.chan_sel
                    .group_channels(chunk.spw, self.chan_group, num_chans),
            )
        };
        Slicer {
            chans,
            corrs: self
                .corr_sel
                .corrs(chunk.polarization)
                .map(|c| c.to_vec()),
        }
    }

    /// The parallactic angle of every antenna towards a field's phase centre
    /// at a timestamp. The last result is cached, so asking again for the
    /// same timestamp is free.
    pub(crate) fn antenna_parallactic_angles(
        &mut self,
        time: f64,
        field: usize,
    ) -> Result<Vec<f64>, VisIterError> {
        let key = (time.to_bits(), field);
        if let Some((cached_key, angles)) = &self.pa_cache {
            if *cached_key == key {
                return Ok(angles.clone());
            }
        }
        let obs_context = self.source.obs_context();
        let phase_centre = *obs_context
            .phase_centres
            .get(field)
            .ok_or(VisIterError::BadIndex {
                column: Column::FieldId,
                row: self.rows().start,
                value: field as i64,
                len: obs_context.phase_centres.len(),
            })?;
        let angles: Vec<f64> = obs_context
            .antennas
            .iter()
            .map(|ant| get_parallactic_angle(ant.position, phase_centre, time))
            .collect();
        self.pa_computations += 1;
        self.pa_cache = Some((key, angles.clone()));
        Ok(angles)
    }

    fn index_of(&self, shared: &Rc<BufferShared>) -> Option<usize> {
        self.attached
            .iter()
            .position(|w| std::ptr::eq(w.as_ptr(), Rc::as_ptr(shared)))
    }

    pub(crate) fn is_top(&self, shared: &Rc<BufferShared>) -> bool {
        self.attached
            .last()
            .map(|w| std::ptr::eq(w.as_ptr(), Rc::as_ptr(shared)))
            .unwrap_or(false)
    }

    pub(crate) fn push_buffer(&mut self, shared: &Rc<BufferShared>) {
        self.attached.retain(|w| w.strong_count() > 0);
        self.attached.push(Rc::downgrade(shared));
        shared.set_attached(true);
        shared.invalidate();
        trace!("Attached a buffer; {} on the stack", self.attached.len());
    }

    /// Detach the top buffer. Detaching anything else breaks the stack
    /// discipline and is refused.
    pub(crate) fn pop_buffer(&mut self, shared: &Rc<BufferShared>) -> Result<(), VisIterError> {
        let index = self.index_of(shared).ok_or(VisIterError::NotAttached)?;
        let stack_len = self.attached.len();
        if index + 1 != stack_len {
            return Err(VisIterError::DetachNotTop {
                depth: stack_len - index - 1,
                stack_len,
            });
        }
        self.attached.pop();
        shared.set_attached(false);
        // The buffer below may hold data from an earlier position.
        self.invalidate_top();
        trace!("Detached a buffer; {} on the stack", self.attached.len());
        Ok(())
    }

    /// Remove a buffer wherever it is in the stack. Used when a buffer is
    /// dropped without being detached.
    pub(crate) fn remove_buffer(&mut self, shared: &Rc<BufferShared>) {
        if let Some(index) = self.index_of(shared) {
            let was_top = index + 1 == self.attached.len();
            self.attached.remove(index);
            if was_top {
                self.invalidate_top();
            } else {
                warn!("A buffer below the top of the stack was dropped while still attached");
            }
        }
    }

    fn invalidate_top(&mut self) {
        while let Some(top) = self.attached.last() {
            match top.upgrade() {
                Some(top) => {
                    top.invalidate();
                    return;
                }
                None => {
                    self.attached.pop();
                }
            }
        }
    }

    /// Record a move of the iterator and tell the top buffer.
    fn moved(&mut self) {
        self.generation += 1;
        self.invalidate_top();
    }

    fn rewind(&mut self) {
        self.chunk_idx = 0;
        self.chan_group = 0;
        self.subchunk_idx = 0;
        self.state_ok = false;
        self.moved();
    }
}

impl Drop for IterState {
    fn drop(&mut self) {
        for shared in self.attached.iter().filter_map(Weak::upgrade) {
            shared.set_attached(false);
        }
    }
}

/// An iterator over the chunks and sub-chunks of a dataset.
pub struct VisIter {
    state: Rc<RefCell<IterState>>,
}

impl VisIter {
    /// Iterate over `source`. Nothing is read until
    /// [`VisIter::origin_chunks`].
    pub fn new<S: ColumnSource + 'static>(
        source: S,
        config: VisIterConfig,
    ) -> Result<VisIter, VisIterError> {
        if config.chunk_interval_s.is_nan() || config.chunk_interval_s < 0.0 {
            return Err(VisIterError::BadChunkInterval(config.chunk_interval_s));
        }
        Ok(VisIter {
            state: Rc::new(RefCell::new(IterState {
                source: Box::new(source),
                config,
                chan_sel: ChannelSelection::default(),
                corr_sel: CorrSelection::default(),
                scanned: false,
                chunks: vec![],
                times: vec![],
                chunk_idx: 0,
                chan_group: 0,
                state_ok: false,
                subchunks: vec![],
                subchunk_idx: 0,
                generation: 0,
                attached: vec![],
                pa_cache: None,
                pa_computations: 0,
            })),
        })
    }

    pub(crate) fn downgrade(&self) -> Weak<RefCell<IterState>> {
        Rc::downgrade(&self.state)
    }

    pub(crate) fn state(&self) -> &Rc<RefCell<IterState>> {
        &self.state
    }

    /// Select channels. The selection is checked against the dataset's
    /// spectral windows now, and the iterator is rewound to its first chunk.
    pub fn select_channels(&self, selection: ChannelSelection) -> Result<(), VisIterError> {
        let mut state = self.state.borrow_mut();
        selection.validate(state.obs_context())?;
        debug!("Channel selection: {selection:?}");
        state.chan_sel = selection;
        state.rewind();
        Ok(())
    }

    /// Select channel groups with one `(num_groups, start, width, inc)` entry
    /// per spectral window of the dataset.
    pub fn select_channel_groups(
        &self,
        num_groups: &[usize],
        start: &[usize],
        width: &[usize],
        inc: &[usize],
    ) -> Result<(), VisIterError> {
        let num_spws = self.state.borrow().obs_context().spectral_windows.len();
        let selection = ChannelSelection::from_groups(num_groups, start, width, inc, num_spws)?;
        self.select_channels(selection)
    }

    /// Select correlations. Checked now; rewinds to the first chunk.
    pub fn select_correlations(&self, selection: CorrSelection) -> Result<(), VisIterError> {
        let mut state = self.state.borrow_mut();
        selection.validate(state.obs_context())?;
        debug!("Correlation selection: {selection:?}");
        state.corr_sel = selection;
        state.rewind();
        Ok(())
    }

    /// Change the sub-chunk size (0 to batch by timestamp). The current chunk
    /// starts again from its first sub-chunk.
    pub fn set_row_blocking(&self, row_blocking: usize) {
        let mut state = self.state.borrow_mut();
        state.config.row_blocking = row_blocking;
        state.state_ok = false;
        state.subchunk_idx = 0;
        state.moved();
    }

    /// Move to the first chunk. The first call reads the columns deciding
    /// chunk boundaries.
    pub fn origin_chunks(&self) -> Result<(), VisIterError> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        if !state.scanned {
            let (chunks, times) =
                scan_chunks(state.source.as_ref(), state.config.chunk_interval_s)?;
            debug!(
                "{} rows in {} chunks",
                state.source.num_rows(),
                chunks.len()
            );
            state.chunks = chunks;
            state.times = times;
            state.scanned = true;
        }
        state.rewind();
        Ok(())
    }

    /// Are there chunks (or channel groups) left?
    pub fn more_chunks(&self) -> bool {
        self.state.borrow().more_chunks()
    }

    /// Move to the next channel group of this chunk, or the first channel
    /// group of the next chunk. Does nothing once chunks are exhausted.
    pub fn next_chunk(&self) {
        let mut state = self.state.borrow_mut();
        let num_groups = match state.chunk() {
            Some(chunk) => state.chan_sel.num_groups(chunk.spw),
            None => return,
        };
        if state.chan_group + 1 < num_groups {
            state.chan_group += 1;
        } else {
            state.chunk_idx += 1;
            state.chan_group = 0;
        }
        state.state_ok = false;
        state.subchunk_idx = 0;
        state.moved();
        trace!(
            "Moved to chunk {}, channel group {}",
            state.chunk_idx,
            state.chan_group
        );
    }

    /// Move to the first sub-chunk of the current chunk.
    pub fn origin(&self) {
        let mut state = self.state.borrow_mut();
        state.state_ok = false;
        state.ensure_state();
        state.moved();
    }

    /// Are there sub-chunks left in this chunk?
    pub fn more(&self) -> bool {
        let mut state = self.state.borrow_mut();
        state.ensure_state();
        state.subchunk_idx < state.subchunks.len()
    }

    /// Move to the next sub-chunk. Does nothing once the chunk is exhausted.
    pub fn advance(&self) {
        let mut state = self.state.borrow_mut();
        state.ensure_state();
        if state.subchunk_idx < state.subchunks.len() {
            state.subchunk_idx += 1;
            state.moved();
            trace!("Advanced to {}", state.position());
        } else {
            trace!("advance called on an exhausted chunk");
        }
    }

    pub fn position(&self) -> ChunkPosition {
        let mut state = self.state.borrow_mut();
        state.ensure_state();
        state.position()
    }

    /// The rows of the current sub-chunk.
    pub fn rows(&self) -> Range<usize> {
        self.position().rows
    }

    /// The channel and correlation slicing of the current position.
    pub fn slicer(&self) -> Slicer {
        self.state.borrow().slicer()
    }

    /// The number of chunks. Zero before [`VisIter::origin_chunks`].
    pub fn num_chunks(&self) -> usize {
        self.state.borrow().chunks.len()
    }

    /// The number of channel groups of the current chunk.
    pub fn num_chan_groups(&self) -> usize {
        let state = self.state.borrow();
        state
            .chunk()
            .map(|c| state.chan_sel.num_groups(c.spw))
            .unwrap_or(0)
    }

    /// The number of sub-chunks of the current chunk.
    pub fn num_subchunks(&self) -> usize {
        let mut state = self.state.borrow_mut();
        state.ensure_state();
        state.subchunks.len()
    }

    /// The spectral window of the current chunk.
    pub fn spectral_window(&self) -> Option<usize> {
        self.state.borrow().chunk().map(|c| c.spw)
    }

    /// The polarization setup of the current chunk.
    pub fn polarization(&self) -> Option<usize> {
        self.state.borrow().chunk().map(|c| c.polarization)
    }

    /// The field of the current chunk.
    pub fn field(&self) -> Option<usize> {
        self.state.borrow().chunk().map(|c| c.field)
    }

    /// Increases on every move; a copy of a buffer remembers the generation
    /// it was made at.
    pub fn generation(&self) -> u64 {
        self.state.borrow().generation
    }

    /// The number of buffers attached.
    pub fn num_attached(&self) -> usize {
        self.state
            .borrow()
            .attached
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// How many times per-antenna parallactic angles have been computed.
    pub fn num_pa_computations(&self) -> usize {
        self.state.borrow().pa_computations
    }

    /// Run a function against the dataset's metadata. Buffers on this
    /// iterator can't fill fields while `f` runs.
    pub fn with_obs_context<R>(&self, f: impl FnOnce(&ObsContext) -> R) -> R {
        f(self.state.borrow().obs_context())
    }

    /// Run a function against the dataset.
    pub fn with_source<R>(&self, f: impl FnOnce(&dyn ColumnSource) -> R) -> R {
        f(self.state.borrow().source())
    }

    /// Run a function against the dataset, mutably. The dataset must not be
    /// reshaped; attached buffers are not told about changes.
    pub fn with_source_mut<R>(&self, f: impl FnOnce(&mut dyn ColumnSource) -> R) -> R {
        f(self.state.borrow_mut().source_mut())
    }
}

#[cfg(test)]
mod tests;
