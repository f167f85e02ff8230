// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use itertools::izip;
use log::{debug, trace};
use ndarray::prelude::*;

use super::{
    registry::{Lattice, ROW_APRIORI},
    FlagCounts, FlagCubeError, FlagPolicy, FlagRegistry, LatticeShape,
};
use crate::{
    buffer::{Field, VisBuffer},
    constants::FLAG_WORD_BITS,
    iter::ChunkPosition,
    math::ants_to_baseline,
};

/// Where an agent is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentStatus {
    /// Created, but without a bit.
    Unconfigured,
    /// Holds a bit; not yet reset for a chunk.
    Initialized,
    /// Reset for the current chunk.
    Active,
    /// Its bit has been given back.
    Cleaned,
}

/// One flagging agent. It owns a single bit of every flag word in its
/// registry's lattice, and only ever sets or clears that bit.
pub struct FlagAgent {
    registry: FlagRegistry,
    name: String,
    policy: FlagPolicy,
    status: AgentStatus,
    bit: u32,
    corr_mask: u32,
    pass: FlagCounts,
    totals: FlagCounts,
}

impl FlagAgent {
    pub fn new(registry: &FlagRegistry, name: impl Into<String>, policy: FlagPolicy) -> FlagAgent {
        FlagAgent {
            registry: registry.clone(),
            name: name.into(),
            policy,
            status: AgentStatus::Unconfigured,
            bit: 0,
            corr_mask: 0,
            pass: FlagCounts::default(),
            totals: FlagCounts::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> FlagPolicy {
        self.policy
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    /// The position of this agent's bit in each flag word.
    pub fn bit_index(&self) -> Option<u32> {
        (self.bit != 0).then(|| self.bit.trailing_zeros())
    }

    pub fn corr_mask(&self) -> u32 {
        self.corr_mask
    }

    /// Counts since the last [`FlagAgent::reset`].
    pub fn pass_counts(&self) -> FlagCounts {
        self.pass
    }

    /// Counts since [`FlagAgent::init`].
    pub fn total_counts(&self) -> FlagCounts {
        self.totals
    }

    fn expect(&self, allowed: &[AgentStatus], expected: &'static str) -> Result<(), FlagCubeError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(FlagCubeError::BadStatus {
                name: self.name.clone(),
                status: self.status,
                expected,
            })
        }
    }

    /// Take a bit of the flag word. `corr_mask` selects the correlations
    /// this agent's flags apply to. The first agent of a registry allocates
    /// the lattice with `shape`, every word fully a-priori flagged.
    pub fn init(&mut self, corr_mask: u32, shape: LatticeShape) -> Result<(), FlagCubeError> {
        self.expect(&[AgentStatus::Unconfigured], "unconfigured")?;
        let mut state = self.registry.state_mut();
        let apriori_mask = state.apriori_mask();
        if corr_mask == 0 || corr_mask & !apriori_mask != 0 {
            return Err(FlagCubeError::BadCorrMask {
                mask: corr_mask,
                num_corrs: state.num_corrs,
            });
        }
        let used_bits = state.used_bits;
        let bit = (state.num_corrs as u32..FLAG_WORD_BITS)
            .map(|b| 1 << b)
            .find(|b| used_bits & b == 0)
            .ok_or(FlagCubeError::TooManyAgents {
                max: FLAG_WORD_BITS as usize - state.num_corrs,
                num_corrs: state.num_corrs,
                word_bits: FLAG_WORD_BITS,
            })?;
        if state.lattice.is_none() {
            state.allocate(shape);
        }
        state.used_bits |= bit;
        state.agent_masks.push((bit, corr_mask));
        state.num_agents += 1;
        drop(state);

        self.bit = bit;
        self.corr_mask = corr_mask;
        self.status = AgentStatus::Initialized;
        debug!(
            "Flag agent '{}' ({:?}) uses bit {}",
            self.name,
            self.policy,
            bit.trailing_zeros()
        );
        Ok(())
    }

    /// Start a pass over a chunk. If the lattice holds another chunk (or
    /// channel group), it is reset to fully a-priori flagged, and
    /// reallocated if `shape` differs. The pass counters start again.
    pub fn reset(
        &mut self,
        position: &ChunkPosition,
        shape: LatticeShape,
    ) -> Result<(), FlagCubeError> {
        self.expect(
            &[AgentStatus::Initialized, AgentStatus::Active],
            "initialized",
        )?;
        let key = (position.chunk, position.chan_group);
        let mut state = self.registry.state_mut();
        let same_shape = state.lattice.as_ref().map(|l| l.shape) == Some(shape);
        if state.chunk_key != Some(key) || !same_shape {
            state.allocate(shape);
            state.chunk_key = Some(key);
            trace!("Flag lattice reset for chunk {}", position.chunk);
        }
        drop(state);
        self.pass = FlagCounts::default();
        self.status = AgentStatus::Active;
        Ok(())
    }

    fn modify(
        &mut self,
        chan: usize,
        baseline: usize,
        time: usize,
        row: bool,
        set: bool,
    ) -> Result<bool, FlagCubeError> {
        self.expect(
            &[AgentStatus::Initialized, AgentStatus::Active],
            "initialized",
        )?;
        let bit = self.bit;
        let mut guard = self.registry.state_mut();
        let state = &mut *guard;
        let lattice = lattice_of(&mut state.lattice, &self.name, self.status)?;
        let word = if row {
            lattice.check_row(baseline, time)?;
            &mut lattice.row_flags[(baseline, time)]
        } else {
            lattice.check(chan, baseline, time)?;
            &mut lattice.flags[(chan, baseline, time)]
        };
        let old = *word;
        *word = if set { old | bit } else { old & !bit };
        let transitioned = (old & bit != 0) != set;
        if transitioned {
            if set {
                state.totals.raised += 1;
            } else {
                state.totals.cleared += 1;
            }
        }
        drop(guard);

        if transitioned {
            let counts = [&mut self.pass, &mut self.totals];
            for c in counts {
                if set {
                    c.raised += 1;
                } else {
                    c.cleared += 1;
                }
            }
        }
        Ok(transitioned)
    }

    /// Raise this agent's flag. Returns whether the bit went from 0 to 1.
    pub fn set_flag(
        &mut self,
        chan: usize,
        baseline: usize,
        time: usize,
    ) -> Result<bool, FlagCubeError> {
        self.modify(chan, baseline, time, false, true)
    }

    /// Clear this agent's flag; other agents' bits are untouched. Returns
    /// whether the bit went from 1 to 0.
    pub fn clear_flag(
        &mut self,
        chan: usize,
        baseline: usize,
        time: usize,
    ) -> Result<bool, FlagCubeError> {
        self.modify(chan, baseline, time, false, false)
    }

    pub fn set_row_flag(&mut self, baseline: usize, time: usize) -> Result<bool, FlagCubeError> {
        self.modify(0, baseline, time, true, true)
    }

    pub fn clear_row_flag(&mut self, baseline: usize, time: usize) -> Result<bool, FlagCubeError> {
        self.modify(0, baseline, time, true, false)
    }

    /// Is a position flagged, as far as this agent is concerned? Any agent's
    /// flag counts. A-priori flags on this agent's correlations count only
    /// under [`FlagPolicy::Honor`].
    pub fn is_flagged(
        &self,
        chan: usize,
        baseline: usize,
        time: usize,
    ) -> Result<bool, FlagCubeError> {
        let state = self.registry.state();
        let apriori_mask = state.apriori_mask();
        let lattice = state.lattice.as_ref().ok_or_else(|| FlagCubeError::BadStatus {
            name: self.name.clone(),
            status: self.status,
            expected: "initialized",
        })?;
        lattice.check(chan, baseline, time)?;
        let word = lattice.flags[(chan, baseline, time)];
        let row = lattice.row_flags[(baseline, time)];
        let by_agents = (word | row) & !apriori_mask != 0;
        let apriori = word & self.corr_mask != 0 || row & ROW_APRIORI != 0;
        Ok(match self.policy {
            FlagPolicy::Honor => by_agents || apriori,
            FlagPolicy::Ignore | FlagPolicy::Reset => by_agents,
        })
    }

    /// Load the buffer's flags into the a-priori bits of the lattice. Each
    /// row lands in the time slot of its timestamp (see
    /// [`FlagRegistry::time_slot`]). Only the first call at an iterator
    /// position reads anything; the lattice is shared, so one agent's call
    /// serves them all. Under [`FlagPolicy::Reset`] the a-priori bits are
    /// cleared instead. Returns whether the lattice was updated.
    pub fn get_ms_flags(&mut self, vb: &mut VisBuffer) -> Result<bool, FlagCubeError> {
        self.expect(&[AgentStatus::Active], "active")?;
        let position = vb.position();
        if let Some(position) = &position {
            if self.registry.state().synced.as_ref() == Some(position) {
                trace!("A-priori flags at {position} are already loaded");
                return Ok(false);
            }
        }
        vb.ensure_all(&[
            Field::FlagCube,
            Field::FlagRow,
            Field::Antenna1,
            Field::Antenna2,
            Field::Time,
        ])?;
        let fields = vb.cached();
        let reset = self.policy == FlagPolicy::Reset;

        let mut guard = self.registry.state_mut();
        let state = &mut *guard;
        let apriori_mask = state.apriori_mask();
        let num_corrs = state.num_corrs;
        let lattice = lattice_of(&mut state.lattice, &self.name, self.status)?;
        check_layout(lattice, num_corrs, fields.flag_cube.dim(), "FlagAgent::get_ms_flags")?;

        for (row, (&ant1, &ant2, &time)) in
            izip!(&fields.antenna1, &fields.antenna2, &fields.time).enumerate()
        {
            let baseline = ants_to_baseline(lattice.shape.num_ants, ant1, ant2);
            let time_slot = lattice.time_slot(time)?;
            lattice.check_row(baseline, time_slot)?;
            for (chan, corrs) in fields.flag_cube.slice(s![row, .., ..]).outer_iter().enumerate() {
                let prior = if reset {
                    0
                } else {
                    corrs
                        .iter()
                        .enumerate()
                        .filter(|(_, &f)| f)
                        .fold(0, |acc, (p, _)| acc | 1 << p)
                };
                let word = &mut lattice.flags[(chan, baseline, time_slot)];
                *word = (*word & !apriori_mask) | prior;
            }
            let prior_row = !reset && fields.flag_row[row];
            let row_word = &mut lattice.row_flags[(baseline, time_slot)];
            *row_word = (*row_word & !ROW_APRIORI) | u32::from(prior_row);
        }
        state.synced = position;
        Ok(true)
    }

    /// Write the lattice back into the buffer's flag cube and row flags,
    /// each row from the time slot of its timestamp. A correlation is
    /// flagged if its a-priori bit is set, if an agent whose correlation
    /// mask covers it has flagged it, or if the row is flagged; a row is
    /// flagged if everything in it is. Returns the number of flagged
    /// visibilities written.
    pub fn set_ms_flags(&mut self, vb: &mut VisBuffer) -> Result<usize, FlagCubeError> {
        self.expect(&[AgentStatus::Active], "active")?;
        vb.ensure_all(&[
            Field::Antenna1,
            Field::Antenna2,
            Field::Time,
            Field::ChannelList,
            Field::NRow,
            Field::NChannel,
            Field::NCorr,
        ])?;
        let fields = vb.cached();
        let dims = (fields.n_row, fields.n_channel, fields.n_corr);

        let mut guard = self.registry.state_mut();
        let state = &mut *guard;
        let num_corrs = state.num_corrs;
        let agent_masks = state.agent_masks.clone();
        let lattice = lattice_of(&mut state.lattice, &self.name, self.status)?;
        check_layout(lattice, num_corrs, dims, "FlagAgent::set_ms_flags")?;

        let mut flags = Array3::from_elem(dims, false);
        let mut flag_row = Array1::from_elem(dims.0, false);
        let mut num_flagged = 0;
        for (row, (&ant1, &ant2, &time)) in
            izip!(&fields.antenna1, &fields.antenna2, &fields.time).enumerate()
        {
            let baseline = ants_to_baseline(lattice.shape.num_ants, ant1, ant2);
            let time_slot = lattice.time_slot(time)?;
            lattice.check_row(baseline, time_slot)?;
            let row_word = lattice.row_flags[(baseline, time_slot)];
            for (chan, mut out) in flags.slice_mut(s![row, .., ..]).outer_iter_mut().enumerate() {
                let word = lattice.flags[(chan, baseline, time_slot)];
                for (corr, out) in out.iter_mut().enumerate() {
                    let corr_bit = 1 << corr;
                    let by_agent = agent_masks
                        .iter()
                        .any(|&(bit, mask)| word & bit != 0 && mask & corr_bit != 0);
                    *out = row_word != 0 || word & corr_bit != 0 || by_agent;
                    if *out {
                        num_flagged += 1;
                        state
                            .summary
                            .record((ant1, ant2), time, fields.channel_list[chan]);
                    }
                }
            }
            flag_row[row] = dims.1 * dims.2 > 0 && flags.slice(s![row, .., ..]).iter().all(|&f| f);
        }
        state.summary.visit(dims.0 * dims.1 * dims.2);
        drop(guard);

        vb.set_flag_cube(flags)?;
        vb.set_flag_row(flag_row)?;
        trace!("'{}' wrote {num_flagged} flags", self.name);
        Ok(num_flagged)
    }

    /// Give this agent's bit back. The last agent of a registry frees the
    /// lattice.
    pub fn cleanup(&mut self) {
        if !matches!(
            self.status,
            AgentStatus::Initialized | AgentStatus::Active
        ) {
            self.status = AgentStatus::Cleaned;
            return;
        }
        let bit = self.bit;
        let mut state = self.registry.state_mut();
        if let Some(lattice) = state.lattice.as_mut() {
            lattice.flags.mapv_inplace(|w| w & !bit);
            lattice.row_flags.mapv_inplace(|w| w & !bit);
        }
        state.used_bits &= !bit;
        state.agent_masks.retain(|&(b, _)| b != bit);
        state.num_agents -= 1;
        if state.num_agents == 0 {
            state.free();
        }
        drop(state);
        debug!("Flag agent '{}' cleaned up", self.name);
        self.bit = 0;
        self.status = AgentStatus::Cleaned;
    }
}

impl Drop for FlagAgent {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn lattice_of<'a>(
    lattice: &'a mut Option<Lattice>,
    name: &str,
    status: AgentStatus,
) -> Result<&'a mut Lattice, FlagCubeError> {
    lattice.as_mut().ok_or_else(|| FlagCubeError::BadStatus {
        name: name.to_string(),
        status,
        expected: "initialized",
    })
}

/// Check a buffer's channel and correlation counts against the lattice.
fn check_layout(
    lattice: &Lattice,
    num_corrs: usize,
    dims: (usize, usize, usize),
    function: &str,
) -> Result<(), FlagCubeError> {
    if dims.1 == lattice.shape.num_chans && dims.2 == num_corrs {
        Ok(())
    } else {
        Err(FlagCubeError::BadArrayShape {
            argument: "vb".to_string(),
            function: function.to_string(),
            expected: format!(
                "{} channels and {num_corrs} correlations",
                lattice.shape.num_chans
            ),
            received: format!("{} channels and {} correlations", dims.1, dims.2),
        })
    }
}
