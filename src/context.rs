// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Metadata describing a visibility dataset: the contents of a measurement
//! set's ANTENNA, FEED, FIELD, SPECTRAL_WINDOW, POLARIZATION, DATA_DESCRIPTION
//! and POINTING sub-tables.

use crate::{polarization::CorrType, LatLngHeight, RADec};

/// An antenna of the array.
#[derive(Clone, Debug, PartialEq)]
pub struct Antenna {
    /// The name of the antenna / tile.
    pub name: String,
    /// The Earth position of the antenna.
    pub position: LatLngHeight,
}

/// A feed (receptor pair) on an antenna.
#[derive(Clone, Debug, PartialEq)]
pub struct Feed {
    /// The antenna this feed is mounted on.
    pub antenna: usize,
    /// The feed id, as used in the main table's FEED1/FEED2 columns.
    pub feed_id: usize,
    /// The angle of the first receptor relative to the antenna frame \[radians\].
    pub receptor_angle: f64,
    /// The beam offset of this feed from the antenna's pointing direction,
    /// `(x, y)` in the antenna frame \[radians\].
    pub beam_offset: (f64, f64),
}

/// A spectral window.
#[derive(Clone, Debug, PartialEq)]
pub struct SpectralWindow {
    /// The name of the spectral window.
    pub name: String,
    /// The centre frequency of each channel \[Hz\].
    pub chan_freqs_hz: Vec<f64>,
    /// The width of each channel \[Hz\].
    pub chan_widths_hz: Vec<f64>,
    /// Whether the frequencies are already expressed in the LSRK frame.
    pub is_lsrk: bool,
}

impl SpectralWindow {
    pub fn num_chans(&self) -> usize {
        self.chan_freqs_hz.len()
    }
}

/// A row of the DATA_DESCRIPTION table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataDescription {
    pub spw: usize,
    pub polarization: usize,
}

/// A row of the POINTING table.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointingEntry {
    pub antenna: usize,
    /// The centre of the interval this entry is valid for (casacore time) \[s\]
    pub time: f64,
    /// The length of the validity interval \[s\]. Zero or negative means the
    /// entry is valid for all time.
    pub interval: f64,
    pub direction: RADec,
}

impl PointingEntry {
    fn start(&self) -> f64 {
        if self.interval > 0.0 {
            self.time - self.interval / 2.0
        } else {
            f64::NEG_INFINITY
        }
    }

    fn end(&self) -> f64 {
        if self.interval > 0.0 {
            self.time + self.interval / 2.0
        } else {
            f64::INFINITY
        }
    }
}

/// The POINTING table. Entries are kept sorted by (antenna, time), so
/// lookups can binary search them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointingTable {
    entries: Vec<PointingEntry>,
}

impl PointingTable {
    pub fn new(mut entries: Vec<PointingEntry>) -> PointingTable {
        entries.sort_by(|a, b| a.antenna.cmp(&b.antenna).then(a.time.total_cmp(&b.time)));
        PointingTable { entries }
    }

    /// Add an entry in its sorted place.
    pub fn push(&mut self, entry: PointingEntry) {
        let i = self.entries.partition_point(|p| {
            p.antenna < entry.antenna || (p.antenna == entry.antenna && p.time <= entry.time)
        });
        self.entries.insert(i, entry);
    }

    pub fn entries(&self) -> &[PointingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The pointing direction of an antenna at a time. The entry used is the
    /// latest one whose validity interval starts at or before `time` and
    /// which is still valid at `time`. If there is no such entry, `None` is
    /// returned.
    pub fn direction(&self, antenna: usize, time: f64) -> Option<RADec> {
        let lo = self.entries.partition_point(|p| p.antenna < antenna);
        let hi = self.entries.partition_point(|p| p.antenna <= antenna);
        self.entries[lo..hi]
            .iter()
            .filter(|p| p.start() <= time && time <= p.end())
            .max_by(|a, b| a.start().total_cmp(&b.start()))
            .map(|p| p.direction)
    }
}

impl From<Vec<PointingEntry>> for PointingTable {
    fn from(entries: Vec<PointingEntry>) -> Self {
        PointingTable::new(entries)
    }
}

/// A container for observation metadata common across most file types
#[derive(Clone, Debug, Default)]
pub struct ObsContext {
    /// Observation name
    pub name: Option<String>,

    /// The Earth position of the instrumental array. Used for the array
    /// parallactic angle.
    pub array_pos: LatLngHeight,

    /// The antennas of the array, indexed by the ANTENNA1/ANTENNA2 columns.
    pub antennas: Vec<Antenna>,

    /// The feeds of the array.
    pub feeds: Vec<Feed>,

    /// The phase centre of each field, indexed by FIELD_ID.
    pub phase_centres: Vec<RADec>,

    /// Indexed by the DATA_DESCRIPTION table's SPECTRAL_WINDOW_ID.
    pub spectral_windows: Vec<SpectralWindow>,

    /// The correlation types of each POLARIZATION table row.
    pub polarizations: Vec<Vec<CorrType>>,

    /// Indexed by DATA_DESC_ID.
    pub data_descriptions: Vec<DataDescription>,

    /// The POINTING table.
    pub pointing: PointingTable,
}

impl ObsContext {
    pub fn num_ants(&self) -> usize {
        self.antennas.len()
    }

    /// Look up a feed, if the FEED table describes it.
    pub fn feed(&self, antenna: usize, feed_id: usize) -> Option<&Feed> {
        self.feeds
            .iter()
            .find(|f| f.antenna == antenna && f.feed_id == feed_id)
    }

    /// The pointing direction of an antenna at a time; see
    /// [`PointingTable::direction`].
    pub fn pointing_direction(&self, antenna: usize, time: f64) -> Option<RADec> {
        self.pointing.direction(antenna, time)
    }
}
