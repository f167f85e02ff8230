// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Direction cosines relative to a phase centre.

use std::f64::consts::TAU;

use super::uvw::UVW;

/// (l,m,n) direction-cosine coordinates \[dimensionless\].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[allow(clippy::upper_case_acronyms)]
pub struct LMN {
    pub l: f64,
    pub m: f64,
    pub n: f64,
}

impl LMN {
    /// The phase \[radians\] of a unit point source at these coordinates on a
    /// baseline, i.e. `2 * pi * (u * l + v * m + w * (n - 1))`. The UVW must
    /// be in wavelengths.
    pub fn phase(self, uvw: UVW) -> f64 {
        TAU * (uvw.u * self.l + uvw.v * self.m + uvw.w * (self.n - 1.0))
    }
}

#[cfg(any(test, feature = "approx"))]
impl approx::AbsDiffEq for LMN {
    type Epsilon = f64;

    fn default_epsilon() -> f64 {
        f64::EPSILON
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: f64) -> bool {
        f64::abs_diff_eq(&self.l, &other.l, epsilon)
            && f64::abs_diff_eq(&self.m, &other.m, epsilon)
            && f64::abs_diff_eq(&self.n, &other.n, epsilon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_phase() {
        let lmn = LMN {
            l: 0.5,
            m: 0.5,
            n: 0.707,
        };
        let uvw = UVW {
            u: 1.0,
            v: 2.0,
            w: 3.0,
        };
        assert_abs_diff_eq!(lmn.phase(uvw), 3.9018580757585224, epsilon = 1e-10);
    }

    #[test]
    fn test_phase_centre_has_no_phase() {
        let lmn = LMN {
            l: 0.0,
            m: 0.0,
            n: 1.0,
        };
        let uvw = UVW {
            u: 123.0,
            v: -4.0,
            w: 56.0,
        };
        assert_abs_diff_eq!(lmn.phase(uvw), 0.0);
    }
}
