// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Lazy, invalidation-driven visibility buffers over chunked radio
//! interferometric datasets.
//!
//! A [`VisIter`] walks a [`ColumnSource`](source::ColumnSource) chunk by
//! chunk and sub-chunk by sub-chunk. [`VisBuffer`]s attached to it fill each
//! of their fields from the dataset only when asked, remember what they hold
//! until the iterator moves, and write changes back on
//! [`VisBuffer::flush`]. Flagging agents share a bit-packed flag cube
//! ([`flagging`]), and FT machines ([`ft`]) are driven over whole datasets by
//! a [`SkyEquation`](sky::SkyEquation).

#[allow(non_camel_case_types)]
pub type c32 = num_complex::Complex<f32>;
#[allow(non_camel_case_types)]
pub type c64 = num_complex::Complex<f64>;

pub mod averaging;
pub mod buffer;
pub mod constants;
pub mod context;
pub mod flagging;
pub mod ft;
pub mod iter;
pub mod math;
pub mod polarization;
pub mod pos;
pub mod selection;
pub mod sky;
pub mod source;
pub mod synthetic;


// Re-exports.
pub use buffer::{Field, FieldSet, VisBuffer, VisBufferError, VisCubeKind};
pub use context::ObsContext;
pub use iter::{ChunkPosition, VisIter, VisIterConfig, VisIterError};
pub use pos::{earth::LatLngHeight, hadec::HADec, lmn::LMN, radec::RADec, uvw::UVW};

pub use erfa;
pub use hifitime;
pub use ndarray;
pub use num_complex;
pub use num_complex::Complex;
pub use num_traits;
pub use rayon;

// If "ms" is enabled, re-export the casacore table crate here.
cfg_if::cfg_if! {
    if #[cfg(feature = "ms")] {
        pub use rubbl_casatables;
        pub use source::MsSource;
    }
}

#[cfg(test)]
#[test]
fn hifitime_works_as_expected() {
    use hifitime::Epoch;

    let gps = 1065880128.0;
    let epoch = Epoch::from_gpst_seconds(gps);
    approx::assert_abs_diff_eq!(epoch.as_gpst_seconds(), gps);

    // casacore time 0 is the MJD epoch.
    let epoch = pos::casacore_utc_to_epoch(0.0);
    approx::assert_abs_diff_eq!(epoch.to_mjd_utc_days(), 0.0);
}
