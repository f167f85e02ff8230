// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Radial velocity of an observer with respect to the kinematic local
//! standard of rest (LSRK), for converting topocentric frequencies.
//!
//! The Earth's barycentric velocity comes from ERFA's `eraEpv00`; the solar
//! motion uses the standard LSRK apex. The Earth's rotation (< 0.5 km/s) is
//! ignored.

use erfa::aliases::eraEpv00;

use crate::{
    constants::{DAYSEC, LSRK_APEX_DEC_RAD, LSRK_APEX_RA_RAD, LSRK_SOLAR_SPEED, VEL_C},
    pos::casacore_utc_to_epoch,
    RADec,
};

/// One astronomical unit \[metres\]
const AU_M: f64 = 149_597_870_700.0;

/// The velocity of the observer towards `direction` relative to the LSRK
/// \[metres/second\]. Positive values mean the observer approaches the source.
pub fn lsrk_velocity_towards(direction: RADec, utc_seconds: f64) -> f64 {
    let mjd = casacore_utc_to_epoch(utc_seconds).to_mjd_utc_days();
    // pvb[1] is the barycentric velocity of the Earth in AU/day (ICRS axes).
    let (_, _pvh, pvb) = eraEpv00(2400000.5, mjd);
    let earth_vel = pvb[1].map(|v| v * AU_M / DAYSEC);

    let apex = RADec::from_radians(LSRK_APEX_RA_RAD, LSRK_APEX_DEC_RAD).to_unit_vector();
    let sun_vel = apex.map(|a| a * LSRK_SOLAR_SPEED);

    let s = direction.to_unit_vector();
    (0..3).map(|i| (earth_vel[i] + sun_vel[i]) * s[i]).sum()
}

/// Convert topocentric frequencies \[Hz\] to the LSRK frame for an observer
/// looking at `direction` at `utc_seconds` (casacore time).
pub fn topo_to_lsrk(freqs_hz: &[f64], direction: RADec, utc_seconds: f64) -> Vec<f64> {
    let v = lsrk_velocity_towards(direction, utc_seconds);
    // Relativistic Doppler factor for an observer approaching the source.
    let beta = v / VEL_C;
    let factor = ((1.0 + beta) / (1.0 - beta)).sqrt();
    freqs_hz.iter().map(|f| f * factor).collect()
}
