// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Cooperative flagging on a shared bit-packed flag cube.
//!
//! A [`FlagRegistry`] holds one lattice of 32-bit flag words per
//! `[channel][baseline][time slot]` (and one row word per
//! `[baseline][time slot]`). The low bits of each word are the a-priori
//! flags already in the data, one per correlation; every other bit belongs
//! to one [`FlagAgent`]. Agents raise and clear their own bit, read a-priori
//! flags from a [`VisBuffer`](crate::buffer::VisBuffer) with
//! [`FlagAgent::get_ms_flags`] and write the merged result back with
//! [`FlagAgent::set_ms_flags`].

mod agent;
mod error;
mod registry;
mod summary;

pub use agent::{AgentStatus, FlagAgent};
pub use error::FlagCubeError;
pub use registry::{FlagRegistry, LatticeShape};
pub use summary::{FlagCounts, FlagSummary};

/// What an agent does with flags already present in the data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlagPolicy {
    /// Discard them; they are cleared when read and not written back.
    Reset,
    /// Keep them, but don't count them in [`FlagAgent::is_flagged`].
    #[default]
    Ignore,
    /// Keep them and treat them like any agent's flags.
    Honor,
}
