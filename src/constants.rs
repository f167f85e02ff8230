// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Useful constants.

use std::f64::consts::PI;

/// Speed of light \[metres/second\]
pub const VEL_C: f64 = 299_792_458.0;

/// Seconds per day (86400)
pub const DAYSEC: f64 = 86400.0;
/// Seconds of time to radians (7.272205216643039903848712e-5).
pub const DS2R: f64 = 2.0 * PI / DAYSEC;
/// Ratio of a solar day to a sidereal day (24/23.9344696 = 1.002737909).
pub const SOLAR2SIDEREAL: f64 = 24.0 / 23.9344696;

/// Speed of the Sun with respect to the kinematic local standard of rest
/// \[metres/second\]
pub const LSRK_SOLAR_SPEED: f64 = 20_000.0;
/// Right ascension (J2000) of the solar apex used for LSRK \[radians\]
pub const LSRK_APEX_RA_RAD: f64 = 270.2 * PI / 180.0;
/// Declination (J2000) of the solar apex used for LSRK \[radians\]
pub const LSRK_APEX_DEC_RAD: f64 = 28.7 * PI / 180.0;

/// The number of bits in a flag word of the shared flag cube.
pub const FLAG_WORD_BITS: u32 = u32::BITS;
