// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The flag lattice shared by every agent of a [`FlagRegistry`].

use std::{
    cell::{Ref, RefCell, RefMut},
    rc::Rc,
};

use log::debug;
use ndarray::prelude::*;

use super::{FlagCounts, FlagCubeError, FlagSummary};
use crate::{constants::FLAG_WORD_BITS, iter::ChunkPosition, math::num_baselines_from_num_ants};

/// The bit of a row word holding the a-priori row flag.
pub(super) const ROW_APRIORI: u32 = 1;

/// The extent of the flag lattice: the channels, baselines (including
/// auto-correlations) and time slots of one chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatticeShape {
    pub num_chans: usize,
    pub num_ants: usize,
    pub num_times: usize,
}

impl LatticeShape {
    pub fn new(num_chans: usize, num_ants: usize, num_times: usize) -> LatticeShape {
        LatticeShape {
            num_chans,
            num_ants,
            num_times,
        }
    }

    pub fn num_baselines(&self) -> usize {
        num_baselines_from_num_ants(self.num_ants)
    }
}

pub(super) struct Lattice {
    pub(super) shape: LatticeShape,
    /// `[chan][baseline][time]`
    pub(super) flags: Array3<u32>,
    /// `[baseline][time]`
    pub(super) row_flags: Array2<u32>,
    /// The timestamp of each time slot handed out so far.
    pub(super) slot_times: Vec<f64>,
}

impl Lattice {
    /// A lattice with every a-priori bit set.
    fn new(shape: LatticeShape, apriori_mask: u32) -> Lattice {
        let num_baselines = shape.num_baselines();
        Lattice {
            shape,
            flags: Array3::from_elem(
                (shape.num_chans, num_baselines, shape.num_times),
                apriori_mask,
            ),
            row_flags: Array2::from_elem((num_baselines, shape.num_times), ROW_APRIORI),
            slot_times: Vec::with_capacity(shape.num_times),
        }
    }

    /// The time slot of a timestamp. A timestamp the lattice hasn't seen
    /// yet gets the next free slot, so slots follow the order rows are
    /// visited in.
    pub(super) fn time_slot(&mut self, time: f64) -> Result<usize, FlagCubeError> {
        if let Some(slot) = self.slot_times.iter().position(|&t| t == time) {
            return Ok(slot);
        }
        if self.slot_times.len() == self.shape.num_times {
            return Err(FlagCubeError::TooManyTimes {
                time,
                num_times: self.shape.num_times,
            });
        }
        self.slot_times.push(time);
        Ok(self.slot_times.len() - 1)
    }

    pub(super) fn check(
        &self,
        chan: usize,
        baseline: usize,
        time: usize,
    ) -> Result<(), FlagCubeError> {
        let (num_chans, num_baselines, num_times) = self.flags.dim();
        if chan < num_chans && baseline < num_baselines && time < num_times {
            Ok(())
        } else {
            Err(FlagCubeError::OutOfRange {
                chan,
                baseline,
                time,
                shape: self.shape,
            })
        }
    }

    pub(super) fn check_row(&self, baseline: usize, time: usize) -> Result<(), FlagCubeError> {
        let (num_baselines, num_times) = self.row_flags.dim();
        if baseline < num_baselines && time < num_times {
            Ok(())
        } else {
            Err(FlagCubeError::OutOfRange {
                chan: 0,
                baseline,
                time,
                shape: self.shape,
            })
        }
    }
}

pub(super) struct RegistryState {
    pub(super) num_corrs: usize,
    pub(super) lattice: Option<Lattice>,
    /// Agent bits in use.
    pub(super) used_bits: u32,
    /// (agent bit, correlation mask) of each initialized agent.
    pub(super) agent_masks: Vec<(u32, u32)>,
    pub(super) num_agents: usize,
    pub(super) totals: FlagCounts,
    /// The (chunk, channel group) the lattice holds.
    pub(super) chunk_key: Option<(usize, usize)>,
    /// Where a-priori flags were last read.
    pub(super) synced: Option<ChunkPosition>,
    pub(super) summary: FlagSummary,
}

impl RegistryState {
    pub(super) fn apriori_mask(&self) -> u32 {
        (1 << self.num_corrs) - 1
    }

    /// Allocate the lattice if it isn't, or if it has the wrong shape, with
    /// every a-priori bit set.
    pub(super) fn allocate(&mut self, shape: LatticeShape) {
        let apriori_mask = self.apriori_mask();
        match &mut self.lattice {
            Some(lattice) if lattice.shape == shape => {
                lattice.flags.fill(apriori_mask);
                lattice.row_flags.fill(ROW_APRIORI);
                lattice.slot_times.clear();
            }
            _ => {
                debug!("Allocating a flag lattice of shape {shape:?}");
                self.lattice = Some(Lattice::new(shape, apriori_mask));
            }
        }
        self.synced = None;
    }

    pub(super) fn free(&mut self) {
        debug!("Freeing the flag lattice");
        self.lattice = None;
        self.chunk_key = None;
        self.synced = None;
    }
}

/// Owns the flag lattice shared by a group of [`FlagAgent`](super::FlagAgent)s.
///
/// Each flag word holds one a-priori bit per correlation (the flags already
/// in the dataset) and one bit per agent. The lattice is allocated when the
/// first agent is initialized and freed when the last one is cleaned up.
/// Clones share the same lattice.
#[derive(Clone)]
pub struct FlagRegistry {
    state: Rc<RefCell<RegistryState>>,
}

impl FlagRegistry {
    /// A registry for data with `num_corrs` correlations. That many low bits
    /// of each flag word are a-priori flags; the rest are shared out to
    /// agents.
    pub fn new(num_corrs: usize) -> Result<FlagRegistry, FlagCubeError> {
        let max = FLAG_WORD_BITS as usize - 1;
        if num_corrs == 0 || num_corrs > max {
            return Err(FlagCubeError::BadCorrelationCount { num_corrs, max });
        }
        Ok(FlagRegistry {
            state: Rc::new(RefCell::new(RegistryState {
                num_corrs,
                lattice: None,
                used_bits: 0,
                agent_masks: vec![],
                num_agents: 0,
                totals: FlagCounts::default(),
                chunk_key: None,
                synced: None,
                summary: FlagSummary::default(),
            })),
        })
    }

    pub(super) fn state(&self) -> Ref<RegistryState> {
        self.state.borrow()
    }

    pub(super) fn state_mut(&self) -> RefMut<RegistryState> {
        self.state.borrow_mut()
    }

    pub fn num_corrs(&self) -> usize {
        self.state().num_corrs
    }

    /// How many agents can be initialized at once.
    pub fn max_agents(&self) -> usize {
        FLAG_WORD_BITS as usize - self.num_corrs()
    }

    /// The number of initialized agents.
    pub fn num_agents(&self) -> usize {
        self.state().num_agents
    }

    pub fn is_allocated(&self) -> bool {
        self.state().lattice.is_some()
    }

    pub fn shape(&self) -> Option<LatticeShape> {
        self.state().lattice.as_ref().map(|l| l.shape)
    }

    /// Raised and cleared counts of every agent, ever.
    pub fn totals(&self) -> FlagCounts {
        self.state().totals
    }

    pub fn summary(&self) -> FlagSummary {
        self.state().summary.clone()
    }

    /// The lattice time slot of a timestamp in the current chunk. Slots are
    /// handed out by [`FlagAgent::get_ms_flags`](super::FlagAgent::get_ms_flags)
    /// and [`FlagAgent::set_ms_flags`](super::FlagAgent::set_ms_flags) as
    /// they meet new timestamps.
    pub fn time_slot(&self, time: f64) -> Option<usize> {
        self.state()
            .lattice
            .as_ref()
            .and_then(|l| l.slot_times.iter().position(|&t| t == time))
    }

    /// The raw flag word at a position.
    pub fn word(&self, chan: usize, baseline: usize, time: usize) -> Option<u32> {
        self.state()
            .lattice
            .as_ref()
            .and_then(|l| l.flags.get((chan, baseline, time)).copied())
    }

    /// The raw row word at a position.
    pub fn row_word(&self, baseline: usize, time: usize) -> Option<u32> {
        self.state()
            .lattice
            .as_ref()
            .and_then(|l| l.row_flags.get((baseline, time)).copied())
    }
}
