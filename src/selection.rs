// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Selecting a subset of channels and correlations from a dataset.
//!
//! Channels are selected per spectral window, either as a table of channel
//! groups (`num_groups`, `start`, `width`, `increment`), where the iterator
//! visits each group in turn, or as a list of arbitrary strided slices which
//! together form a single group. Spectral windows without a selection use all
//! of their channels as one group.
//!
//! Correlations are selected per polarization setup (POLARIZATION table row).
//!
//! Selections are checked against the dataset's [`ObsContext`] when they are
//! handed to the iterator, before any rows are read.
//!
//! # Examples
//!
//! ```rust
//! use visbuf::selection::{ChannelSelection, ChannelSlice};
//!
//! // Two spectral windows; two groups of 4 channels in spw 0, and one group of
//! // 8 channels in spw 1.
//! let sel = ChannelSelection::from_groups(&[2, 1], &[0, 0], &[4, 8], &[4, 8], 2).unwrap();
//! assert_eq!(sel.group_channels(0, 1, 16), vec![4, 5, 6, 7]);
//!
//! // The same channels as a list of slices.
//! let mut sliced = ChannelSelection::default();
//! sliced.set_slices(1, vec![ChannelSlice { start: 0, width: 8, inc: 1 }]).unwrap();
//! assert_eq!(sliced.group_channels(1, 0, 16), sel.group_channels(1, 0, 16));
//! ```

use std::collections::BTreeMap;

use thiserror::Error;

use crate::context::ObsContext;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectionError {
    #[error("bad array shape supplied to argument {argument} of function {function}. expected {expected}, received {received}")]
    /// Error for bad array shape in provided argument
    BadArrayShape {
        /// The argument name within the function
        argument: String,
        /// The function name
        function: String,
        /// The expected shape
        expected: String,
        /// The shape that was received instead
        received: String,
    },

    #[error("Spectral window {spw} was selected, but there are only {num_spws} spectral windows")]
    UnknownSpw { spw: usize, num_spws: usize },

    #[error("Channel {chan} of spectral window {spw} was selected, but it only has {num_chans} channels")]
    ChannelOutOfRange {
        spw: usize,
        chan: usize,
        num_chans: usize,
    },

    #[error("The channel selection for spectral window {spw} is empty")]
    EmptyChannelSelection { spw: usize },

    #[error("Spectral window {spw} has {num_groups} channel groups but a zero increment")]
    ZeroIncrement { spw: usize, num_groups: usize },

    #[error("Channel slice {slice} of spectral window {spw} has {width} channels but a zero increment")]
    ZeroSliceIncrement {
        spw: usize,
        slice: usize,
        width: usize,
    },

    #[error("Polarization setup {polarization} was selected, but there are only {num_polarizations}")]
    UnknownPolarization {
        polarization: usize,
        num_polarizations: usize,
    },

    #[error("Correlation {corr} of polarization setup {polarization} was selected, but it only has {num_corrs} correlations")]
    CorrelationOutOfRange {
        polarization: usize,
        corr: usize,
        num_corrs: usize,
    },

    #[error("The correlation selection for polarization setup {polarization} is empty")]
    EmptyCorrelationSelection { polarization: usize },
}

/// A strided run of channels: `width` channels starting at `start`, `inc`
/// apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelSlice {
    pub start: usize,
    pub width: usize,
    pub inc: usize,
}

impl ChannelSlice {
    pub fn channels(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.width).map(move |i| self.start + i * self.inc)
    }
}

/// The channels selected in one spectral window.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpwChannels {
    /// Group `g` covers `width` contiguous channels from `start + g * inc`.
    Groups {
        num_groups: usize,
        start: usize,
        width: usize,
        inc: usize,
    },
    /// One group, made of the union of these slices, in order.
    Slices(Vec<ChannelSlice>),
}

impl SpwChannels {
    fn num_groups(&self) -> usize {
        match self {
            SpwChannels::Groups { num_groups, .. } => *num_groups,
            SpwChannels::Slices(_) => 1,
        }
    }

    fn group_channels(&self, group: usize) -> Vec<usize> {
        match self {
            SpwChannels::Groups {
                start, width, inc, ..
            } => {
                let first = start + group * inc;
                (first..first + width).collect()
            }
            SpwChannels::Slices(slices) => slices.iter().flat_map(|s| s.channels()).collect(),
        }
    }

    /// The largest channel index this selection touches.
    fn max_channel(&self) -> Option<usize> {
        (0..self.num_groups())
            .flat_map(|g| self.group_channels(g))
            .max()
    }
}

/// Channel selection for every spectral window.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelSelection {
    per_spw: BTreeMap<usize, SpwChannels>,
}

impl ChannelSelection {
    /// Build a selection from per-spectral-window group tables. Each table
    /// must have one entry per spectral window.
    pub fn from_groups(
        num_groups: &[usize],
        start: &[usize],
        width: &[usize],
        inc: &[usize],
        num_spws: usize,
    ) -> Result<ChannelSelection, SelectionError> {
        for (argument, table) in [
            ("num_groups", num_groups),
            ("start", start),
            ("width", width),
            ("inc", inc),
        ] {
            if table.len() != num_spws {
                return Err(SelectionError::BadArrayShape {
                    argument: argument.into(),
                    function: "ChannelSelection::from_groups".into(),
                    expected: format!("{num_spws} (the number of spectral windows)"),
                    received: format!("{}", table.len()),
                });
            }
        }

        let mut sel = ChannelSelection::default();
        for spw in 0..num_spws {
            sel.set_groups(spw, num_groups[spw], start[spw], width[spw], inc[spw])?;
        }
        Ok(sel)
    }

    /// Select channel groups in one spectral window.
    pub fn set_groups(
        &mut self,
        spw: usize,
        num_groups: usize,
        start: usize,
        width: usize,
        inc: usize,
    ) -> Result<(), SelectionError> {
        if num_groups == 0 || width == 0 {
            return Err(SelectionError::EmptyChannelSelection { spw });
        }
        if num_groups > 1 && inc == 0 {
            return Err(SelectionError::ZeroIncrement { spw, num_groups });
        }
        self.per_spw.insert(
            spw,
            SpwChannels::Groups {
                num_groups,
                start,
                width,
                inc,
            },
        );
        Ok(())
    }

    /// Select an arbitrary list of channel slices in one spectral window.
    pub fn set_slices(
        &mut self,
        spw: usize,
        slices: Vec<ChannelSlice>,
    ) -> Result<(), SelectionError> {
        check_slices(spw, &slices)?;
        self.per_spw.insert(spw, SpwChannels::Slices(slices));
        Ok(())
    }

    pub fn spw(&self, spw: usize) -> Option<&SpwChannels> {
        self.per_spw.get(&spw)
    }

    /// The number of channel groups the iterator visits in a spectral window.
    pub fn num_groups(&self, spw: usize) -> usize {
        self.per_spw.get(&spw).map(SpwChannels::num_groups).unwrap_or(1)
    }

    /// The largest number of channel groups over all spectral windows.
    pub fn max_groups(&self) -> usize {
        self.per_spw
            .values()
            .map(SpwChannels::num_groups)
            .max()
            .unwrap_or(1)
    }

    /// The channel indices of a group. Unselected spectral windows have a
    /// single group of all `num_chans` channels.
    pub fn group_channels(&self, spw: usize, group: usize, num_chans: usize) -> Vec<usize> {
        match self.per_spw.get(&spw) {
            Some(sel) => sel.group_channels(group),
            None => (0..num_chans).collect(),
        }
    }

    /// Does this group select every channel of the spectral window, in
    /// order?
    pub fn is_full(&self, spw: usize, group: usize, num_chans: usize) -> bool {
        self.group_channels(spw, group, num_chans)
            .into_iter()
            .eq(0..num_chans)
    }

    /// Check the selection against a dataset's spectral windows.
    pub fn validate(&self, obs_context: &ObsContext) -> Result<(), SelectionError> {
        let num_spws = obs_context.spectral_windows.len();
        for (&spw, sel) in &self.per_spw {
            let num_chans = obs_context
                .spectral_windows
                .get(spw)
                .ok_or(SelectionError::UnknownSpw { spw, num_spws })?
                .num_chans();
            if let SpwChannels::Slices(slices) = sel {
                check_slices(spw, slices)?;
            }
            if let Some(chan) = sel.max_channel().filter(|&c| c >= num_chans) {
                return Err(SelectionError::ChannelOutOfRange {
                    spw,
                    chan,
                    num_chans,
                });
            }
        }
        Ok(())
    }
}

fn check_slices(spw: usize, slices: &[ChannelSlice]) -> Result<(), SelectionError> {
    if slices.iter().all(|s| s.width == 0) {
        return Err(SelectionError::EmptyChannelSelection { spw });
    }
    // A single channel doesn't need a stride.
    match slices.iter().position(|s| s.inc == 0 && s.width > 1) {
        Some(slice) => Err(SelectionError::ZeroSliceIncrement {
            spw,
            slice,
            width: slices[slice].width,
        }),
        None => Ok(()),
    }
}

/// Correlation selection for every polarization setup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CorrSelection {
    per_polarization: BTreeMap<usize, Vec<usize>>,
}

impl CorrSelection {
    /// Select correlations (by index into the POLARIZATION row's CORR_TYPE)
    /// for one polarization setup.
    pub fn set(&mut self, polarization: usize, corrs: Vec<usize>) -> Result<(), SelectionError> {
        if corrs.is_empty() {
            return Err(SelectionError::EmptyCorrelationSelection { polarization });
        }
        self.per_polarization.insert(polarization, corrs);
        Ok(())
    }

    /// The selected correlation indices, or `None` for all of them.
    pub fn corrs(&self, polarization: usize) -> Option<&[usize]> {
        self.per_polarization
            .get(&polarization)
            .map(|c| c.as_slice())
    }

    pub fn validate(&self, obs_context: &ObsContext) -> Result<(), SelectionError> {
        let num_polarizations = obs_context.polarizations.len();
        for (&polarization, corrs) in &self.per_polarization {
            let num_corrs = obs_context
                .polarizations
                .get(polarization)
                .ok_or(SelectionError::UnknownPolarization {
                    polarization,
                    num_polarizations,
                })?
                .len();
            if let Some(&corr) = corrs.iter().find(|&&c| c >= num_corrs) {
                return Err(SelectionError::CorrelationOutOfRange {
                    polarization,
                    corr,
                    num_corrs,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{context::SpectralWindow, polarization::CorrType};

    fn context() -> ObsContext {
        ObsContext {
            spectral_windows: vec![
                SpectralWindow {
                    name: "a".into(),
                    chan_freqs_hz: vec![1e8; 8],
                    chan_widths_hz: vec![1e3; 8],
                    is_lsrk: false,
                },
                SpectralWindow {
                    name: "b".into(),
                    chan_freqs_hz: vec![2e8; 4],
                    chan_widths_hz: vec![1e3; 4],
                    is_lsrk: false,
                },
            ],
            polarizations: vec![vec![CorrType::XX, CorrType::YY]],
            ..Default::default()
        }
    }

    #[test]
    fn test_groups() {
        let sel = ChannelSelection::from_groups(&[3, 1], &[1, 0], &[2, 4], &[3, 0], 2).unwrap();
        assert_eq!(sel.num_groups(0), 3);
        assert_eq!(sel.max_groups(), 3);
        assert_eq!(sel.group_channels(0, 0, 8), vec![1, 2]);
        assert_eq!(sel.group_channels(0, 2, 8), vec![7, 8]);
        assert!(sel.is_full(1, 0, 4));
        // Group 2 of spw 0 runs off the end of the spw.
        assert_eq!(
            sel.validate(&context()),
            Err(SelectionError::ChannelOutOfRange {
                spw: 0,
                chan: 8,
                num_chans: 8
            })
        );
    }

    #[test]
    fn test_group_table_shapes() {
        let result = ChannelSelection::from_groups(&[1], &[0, 0], &[1, 1], &[1, 1], 2);
        assert!(matches!(
            result,
            Err(SelectionError::BadArrayShape { argument, .. }) if argument == "num_groups"
        ));
        assert_eq!(
            ChannelSelection::from_groups(&[2], &[0], &[1], &[0], 1),
            Err(SelectionError::ZeroIncrement {
                spw: 0,
                num_groups: 2
            })
        );
        assert_eq!(
            ChannelSelection::from_groups(&[1], &[0], &[0], &[0], 1),
            Err(SelectionError::EmptyChannelSelection { spw: 0 })
        );
    }

    #[test]
    fn test_slices_agree_with_groups() {
        let groups = ChannelSelection::from_groups(&[1, 1], &[2, 0], &[3, 4], &[1, 1], 2).unwrap();
        let mut slices = ChannelSelection::default();
        slices
            .set_slices(
                0,
                vec![
                    ChannelSlice {
                        start: 2,
                        width: 1,
                        inc: 1,
                    },
                    ChannelSlice {
                        start: 3,
                        width: 2,
                        inc: 1,
                    },
                ],
            )
            .unwrap();
        assert_eq!(
            slices.group_channels(0, 0, 8),
            groups.group_channels(0, 0, 8)
        );
        // spw 1 has no slice selection, so all of its channels are used.
        assert_eq!(
            slices.group_channels(1, 0, 4),
            groups.group_channels(1, 0, 4)
        );
        assert!(slices.validate(&context()).is_ok());
    }

    #[test]
    fn test_strided_slice() {
        let mut sel = ChannelSelection::default();
        sel.set_slices(
            0,
            vec![ChannelSlice {
                start: 1,
                width: 3,
                inc: 2,
            }],
        )
        .unwrap();
        assert_eq!(sel.group_channels(0, 0, 8), vec![1, 3, 5]);
        assert!(!sel.is_full(0, 0, 8));
        assert!(sel.validate(&context()).is_ok());

        sel.set_slices(
            2,
            vec![ChannelSlice {
                start: 0,
                width: 1,
                inc: 1,
            }],
        )
        .unwrap();
        assert_eq!(
            sel.validate(&context()),
            Err(SelectionError::UnknownSpw {
                spw: 2,
                num_spws: 2
            })
        );
    }

    #[test]
    fn test_zero_slice_increment() {
        let mut sel = ChannelSelection::default();
        let slices = vec![
            ChannelSlice {
                start: 0,
                width: 1,
                inc: 0,
            },
            ChannelSlice {
                start: 4,
                width: 2,
                inc: 0,
            },
        ];
        assert_eq!(
            sel.set_slices(0, slices),
            Err(SelectionError::ZeroSliceIncrement {
                spw: 0,
                slice: 1,
                width: 2
            })
        );
        assert!(sel.spw(0).is_none());

        // One channel with no stride is fine.
        sel.set_slices(
            0,
            vec![ChannelSlice {
                start: 5,
                width: 1,
                inc: 0,
            }],
        )
        .unwrap();
        assert_eq!(sel.group_channels(0, 0, 8), vec![5]);
    }

    #[test]
    fn test_corr_selection() {
        let mut sel = CorrSelection::default();
        assert_eq!(sel.corrs(0), None);
        sel.set(0, vec![1]).unwrap();
        assert_eq!(sel.corrs(0), Some([1].as_slice()));
        assert!(sel.validate(&context()).is_ok());

        sel.set(0, vec![0, 2]).unwrap();
        assert_eq!(
            sel.validate(&context()),
            Err(SelectionError::CorrelationOutOfRange {
                polarization: 0,
                corr: 2,
                num_corrs: 2
            })
        );
        assert_eq!(
            sel.set(1, vec![]),
            Err(SelectionError::EmptyCorrelationSelection { polarization: 1 })
        );
    }
}
