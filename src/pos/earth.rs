// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Handling of Earth Coordinates (Latitude/Longitude/Height)

use std::{f64::consts::FRAC_PI_2, fmt::Display};

use erfa::Ellipsoid;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum EarthError {
    #[error("Latitude {latitude_rad} rad is outside -pi/2 to pi/2")]
    BadLatitude { latitude_rad: f64 },
}

/// WGS84 equatorial radius \[metres\]
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening
const WGS84_F: f64 = 1.0 / 298.257_223_563;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// An earth position: Latitude, Longitude and Height [radians, meters]
pub struct LatLngHeight {
    /// Longitude \[radians\]
    pub longitude_rad: f64,
    /// Latitude \[radians\]
    pub latitude_rad: f64,
    /// Height above ellipsoid \[meters\]
    pub height_metres: f64,
}

impl LatLngHeight {
    /// Convert an ITRF (geocentric, WGS84) position, as found in a
    /// measurement set's ANTENNA table, to a [`LatLngHeight`].
    ///
    /// Uses Bowring's method with a few refinement iterations; this is good to
    /// well under a millimetre for positions near the Earth's surface.
    pub fn from_itrf(x: f64, y: f64, z: f64) -> LatLngHeight {
        let e2 = WGS84_F * (2.0 - WGS84_F);
        let p = x.hypot(y);
        let longitude_rad = y.atan2(x);
        if p < 1e-9 {
            // On the polar axis.
            let b = WGS84_A * (1.0 - WGS84_F);
            return Self {
                longitude_rad: 0.0,
                latitude_rad: FRAC_PI_2.copysign(z),
                height_metres: z.abs() - b,
            };
        }

        let mut latitude_rad = z.atan2(p * (1.0 - e2));
        let mut height_metres = 0.0;
        for _ in 0..5 {
            let (s_lat, c_lat) = latitude_rad.sin_cos();
            let n = WGS84_A / (1.0 - e2 * s_lat * s_lat).sqrt();
            height_metres = p / c_lat - n;
            latitude_rad = z.atan2(p * (1.0 - e2 * n / (n + height_metres)));
        }

        Self {
            longitude_rad,
            latitude_rad,
            height_metres,
        }
    }

    /// Convert to an ITRF (geocentric) position \[metres\] via
    /// [`erfa::transform::geodetic_to_geocentric`] with the specified
    /// [`Ellipsoid`].
    pub fn to_itrf(self, ellipsoid: Ellipsoid) -> Result<[f64; 3], EarthError> {
        let bad_latitude = EarthError::BadLatitude {
            latitude_rad: self.latitude_rad,
        };
        if !(-FRAC_PI_2..=FRAC_PI_2).contains(&self.latitude_rad) {
            return Err(bad_latitude);
        }
        let geocentric_vector = erfa::transform::geodetic_to_geocentric(
            ellipsoid,
            self.longitude_rad,
            self.latitude_rad,
            self.height_metres,
        )
        .map_err(|_| bad_latitude)?;
        Ok([
            geocentric_vector[0],
            geocentric_vector[1],
            geocentric_vector[2],
        ])
    }
}

impl Display for LatLngHeight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{ longitude: {:.4}°, latitude: {:.4}°, height: {}m }}",
            self.longitude_rad.to_degrees(),
            self.latitude_rad.to_degrees(),
            self.height_metres
        )
    }
}

#[cfg(any(test, feature = "approx"))]
impl approx::AbsDiffEq for LatLngHeight {
    type Epsilon = f64;

    fn default_epsilon() -> f64 {
        f64::EPSILON
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: f64) -> bool {
        f64::abs_diff_eq(&self.longitude_rad, &other.longitude_rad, epsilon)
            && f64::abs_diff_eq(&self.latitude_rad, &other.latitude_rad, epsilon)
            && f64::abs_diff_eq(&self.height_metres, &other.height_metres, epsilon)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_display_latlngheight() {
        let latlngheight = LatLngHeight {
            longitude_rad: 0.0,
            latitude_rad: 0.0,
            height_metres: 0.0,
        };
        let result = format!("{}", latlngheight);
        assert!(!result.is_empty());
    }

    #[test]
    fn test_itrf_round_trip() {
        // Roughly the VLA.
        let pos = LatLngHeight {
            longitude_rad: (-107.6184f64).to_radians(),
            latitude_rad: 34.0784f64.to_radians(),
            height_metres: 2124.0,
        };
        let [x, y, z] = pos.to_itrf(Ellipsoid::WGS84).unwrap();
        let back = LatLngHeight::from_itrf(x, y, z);
        assert_abs_diff_eq!(back.longitude_rad, pos.longitude_rad, epsilon = 1e-12);
        assert_abs_diff_eq!(back.latitude_rad, pos.latitude_rad, epsilon = 1e-10);
        assert_abs_diff_eq!(back.height_metres, pos.height_metres, epsilon = 1e-4);
    }

    #[test]
    fn test_to_itrf_bad_latitude() {
        let pos = LatLngHeight {
            longitude_rad: 0.0,
            latitude_rad: 2.0,
            height_metres: 0.0,
        };
        assert_eq!(
            pos.to_itrf(Ellipsoid::WGS84),
            Err(EarthError::BadLatitude { latitude_rad: 2.0 })
        );
    }

    #[test]
    fn test_equator() {
        let pos = LatLngHeight::from_itrf(WGS84_A, 0.0, 0.0);
        assert_abs_diff_eq!(pos, LatLngHeight::default(), epsilon = 1e-9);
    }
}
