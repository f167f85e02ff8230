// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Super module for all positional code.

pub mod earth;
pub mod hadec;
pub mod lmn;
pub mod lsr;
pub mod radec;
pub mod uvw;

use std::f64::consts::TAU;

use erfa::{aliases::eraGmst06, constants::ERFA_DJM0};
use hifitime::Epoch;

use crate::{constants::DAYSEC, LatLngHeight, RADec};

/// Convert a casacore time (seconds since the MJD epoch, 1858-11-17T00:00:00
/// UTC) to a [`Epoch`].
pub fn casacore_utc_to_epoch(utc_seconds: f64) -> Epoch {
    Epoch::from_mjd_utc(utc_seconds / DAYSEC)
}

/// Get the local mean sidereal time \[radians\] for a casacore time and an
/// Earth longitude. UT1 is taken to be UTC; the result is wrong by up to 0.9
/// seconds of time.
pub fn get_lmst(longitude_rad: f64, utc_seconds: f64) -> f64 {
    let mjd = casacore_utc_to_epoch(utc_seconds).to_mjd_utc_days();
    let gmst = eraGmst06(ERFA_DJM0, mjd, ERFA_DJM0, mjd);
    (gmst + longitude_rad).rem_euclid(TAU)
}

/// The parallactic angle \[radians\] of `direction` seen from an Earth
/// position at a casacore time.
pub fn get_parallactic_angle(position: LatLngHeight, direction: RADec, utc_seconds: f64) -> f64 {
    let lmst = get_lmst(position.longitude_rad, utc_seconds);
    direction
        .to_hadec(lmst)
        .get_parallactic_angle(position.latitude_rad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_casacore_epoch() {
        // 2000-01-01T12:00:00 UTC is MJD 51544.5
        let epoch = casacore_utc_to_epoch(51544.5 * DAYSEC);
        assert_abs_diff_eq!(epoch.to_mjd_utc_days(), 51544.5, epsilon = 1e-9);
    }

    #[test]
    fn test_lmst_advances_sidereally() {
        let t0 = 5.0e9;
        let lst0 = get_lmst(0.0, t0);
        // One solar hour later the LST has advanced by slightly more than
        // 15 degrees.
        let lst1 = get_lmst(0.0, t0 + 3600.0);
        let diff = (lst1 - lst0).rem_euclid(TAU);
        assert_abs_diff_eq!(
            diff,
            crate::constants::DS2R * 3600.0 * crate::constants::SOLAR2SIDEREAL,
            epsilon = 1e-6
        );
        // Longitude offsets LST directly.
        assert_abs_diff_eq!(
            get_lmst(1.0, t0),
            (lst0 + 1.0).rem_euclid(TAU),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_parallactic_angle_on_meridian() {
        let position = LatLngHeight {
            longitude_rad: 0.0,
            latitude_rad: -0.5,
            height_metres: 0.0,
        };
        let t = 5.0e9;
        // A source on the meridian has zero hour angle, and so zero
        // parallactic angle (south of the zenith) or pi (north of it).
        let lmst = get_lmst(0.0, t);
        let south = RADec::from_radians(lmst, -1.0);
        assert_abs_diff_eq!(get_parallactic_angle(position, south, t), 0.0, epsilon = 1e-9);
        let north = RADec::from_radians(lmst, 0.5);
        assert_abs_diff_eq!(
            get_parallactic_angle(position, north, t).abs(),
            std::f64::consts::PI,
            epsilon = 1e-9
        );
    }
}
