// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;

/// Raised and cleared flag counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlagCounts {
    /// Bits that went from 0 to 1.
    pub raised: usize,
    /// Bits that went from 1 to 0.
    pub cleared: usize,
}

/// How many visibilities were written back flagged, broken down by
/// baseline, timestamp and channel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlagSummary {
    /// Keyed by antenna pair.
    pub per_baseline: BTreeMap<(usize, usize), usize>,
    /// (casacore time, count), in the order timestamps were written.
    pub per_time: Vec<(f64, usize)>,
    /// Keyed by spectral window channel.
    pub per_channel: BTreeMap<usize, usize>,
    /// Flagged visibilities written.
    pub num_flagged: usize,
    /// All visibilities written.
    pub num_visited: usize,
}

impl FlagSummary {
    pub(super) fn visit(&mut self, count: usize) {
        self.num_visited += count;
    }

    pub(super) fn record(&mut self, baseline: (usize, usize), time: f64, chan: usize) {
        *self.per_baseline.entry(baseline).or_default() += 1;
        *self.per_channel.entry(chan).or_default() += 1;
        match self.per_time.last_mut() {
            Some((t, n)) if *t == time => *n += 1,
            _ => self.per_time.push((time, 1)),
        }
        self.num_flagged += 1;
    }

    /// The fraction of visibilities written back flagged.
    pub fn flagged_fraction(&self) -> f64 {
        if self.num_visited == 0 {
            0.0
        } else {
            self.num_flagged as f64 / self.num_visited as f64
        }
    }
}
