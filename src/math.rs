// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Some helper mathematics.

/// Convert a pair of antenna indices into a baseline index (where the baseline
/// indices include auto-correlations as baselines). The order of the antennas
/// doesn't matter.
#[inline]
pub fn ants_to_baseline(total_num_ants: usize, ant1: usize, ant2: usize) -> usize {
    let (a, b) = if ant1 <= ant2 {
        (ant1, ant2)
    } else {
        (ant2, ant1)
    };
    a * total_num_ants - (a * a.saturating_sub(1)) / 2 - a + b
}

/// From the number of antennas, get the number of baselines (including
/// auto-correlations).
#[inline]
pub fn num_baselines_from_num_ants(num_ants: usize) -> usize {
    num_ants * (num_ants + 1) / 2
}
