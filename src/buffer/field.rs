// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The fields a [`VisBuffer`](super::VisBuffer) caches, and the table of
//! which fields must be filled before others.

use crate::source::Column;

/// A field of a [`VisBuffer`](super::VisBuffer). Each has exactly one
/// validity bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Field {
    Antenna1,
    Antenna2,
    Feed1,
    Feed2,
    ArrayId,
    FieldId,
    DataDescId,
    SpectralWindow,
    PolarizationId,
    ObservationId,
    ProcessorId,
    StateId,
    ScanNumber,
    Time,
    TimeInterval,
    TimeCentroid,
    Exposure,
    Uvw,
    UvwMat,
    FlagRow,
    Flag,
    FlagCube,
    VisCube,
    ModelCube,
    CorrectedCube,
    FloatCube,
    Weight,
    WeightMat,
    WeightSpectrum,
    Sigma,
    SigmaMat,
    Frequency,
    LsrFrequency,
    ChannelList,
    NChannel,
    NCorr,
    NRow,
    CorrType,
    PolFrame,
    PhaseCenter,
    Feed1Pa,
    Feed2Pa,
    ParAngle,
    Direction1,
    Direction2,
    RowIds,
}

impl Field {
    pub const ALL: [Field; 46] = [
        Field::Antenna1,
        Field::Antenna2,
        Field::Feed1,
        Field::Feed2,
        Field::ArrayId,
        Field::FieldId,
        Field::DataDescId,
        Field::SpectralWindow,
        Field::PolarizationId,
        Field::ObservationId,
        Field::ProcessorId,
        Field::StateId,
        Field::ScanNumber,
        Field::Time,
        Field::TimeInterval,
        Field::TimeCentroid,
        Field::Exposure,
        Field::Uvw,
        Field::UvwMat,
        Field::FlagRow,
        Field::Flag,
        Field::FlagCube,
        Field::VisCube,
        Field::ModelCube,
        Field::CorrectedCube,
        Field::FloatCube,
        Field::Weight,
        Field::WeightMat,
        Field::WeightSpectrum,
        Field::Sigma,
        Field::SigmaMat,
        Field::Frequency,
        Field::LsrFrequency,
        Field::ChannelList,
        Field::NChannel,
        Field::NCorr,
        Field::NRow,
        Field::CorrType,
        Field::PolFrame,
        Field::PhaseCenter,
        Field::Feed1Pa,
        Field::Feed2Pa,
        Field::ParAngle,
        Field::Direction1,
        Field::Direction2,
        Field::RowIds,
    ];

    /// The fields which must be valid before this one can be filled, in the
    /// order they are filled.
    pub fn prerequisites(self) -> &'static [Field] {
        use Field::*;
        match self {
            Feed1Pa => &[Feed1, Antenna1, Time],
            Feed2Pa => &[Feed2, Antenna2, Time],
            Direction1 => &[Feed1Pa],
            Direction2 => &[Feed2Pa],
            ParAngle => &[Time],
            SpectralWindow | PolarizationId => &[DataDescId],
            CorrType => &[PolarizationId],
            PolFrame => &[CorrType],
            Frequency => &[SpectralWindow],
            LsrFrequency => &[Frequency, Time, PhaseCenter],
            PhaseCenter => &[FieldId],
            Uvw => &[UvwMat],
            Weight => &[WeightMat],
            Sigma => &[SigmaMat],
            Flag => &[FlagCube],
            _ => &[],
        }
    }

    /// Every field this one depends on, directly or not, in fill order.
    pub fn all_prerequisites(self) -> Vec<Field> {
        fn visit(field: Field, out: &mut Vec<Field>) {
            for &pre in field.prerequisites() {
                visit(pre, out);
                if !out.contains(&pre) {
                    out.push(pre);
                }
            }
        }
        let mut out = vec![];
        visit(self, &mut out);
        out
    }

    /// The column this field is read from, if it is read directly.
    pub fn column(self) -> Option<Column> {
        use Field::*;
        Some(match self {
            Antenna1 => Column::Antenna1,
            Antenna2 => Column::Antenna2,
            Feed1 => Column::Feed1,
            Feed2 => Column::Feed2,
            ArrayId => Column::ArrayId,
            FieldId => Column::FieldId,
            DataDescId => Column::DataDescId,
            ObservationId => Column::ObservationId,
            ProcessorId => Column::ProcessorId,
            StateId => Column::StateId,
            ScanNumber => Column::ScanNumber,
            Time => Column::Time,
            TimeInterval => Column::Interval,
            TimeCentroid => Column::TimeCentroid,
            Exposure => Column::Exposure,
            UvwMat => Column::Uvw,
            FlagRow => Column::FlagRow,
            FlagCube => Column::Flag,
            VisCube => Column::Data,
            ModelCube => Column::ModelData,
            CorrectedCube => Column::CorrectedData,
            FloatCube => Column::FloatData,
            WeightMat => Column::Weight,
            WeightSpectrum => Column::WeightSpectrum,
            SigmaMat => Column::Sigma,
            _ => return None,
        })
    }

    /// Is this field computed purely from other fields of the buffer, without
    /// touching the iterator?
    pub fn is_derived(self) -> bool {
        use Field::*;
        matches!(self, Uvw | Weight | Sigma | Flag | PolFrame)
    }

    /// Does this field have a channel axis (or depend on the channel
    /// selection)?
    pub fn has_chan_axis(self) -> bool {
        use Field::*;
        matches!(
            self,
            Flag | FlagCube
                | VisCube
                | ModelCube
                | CorrectedCube
                | FloatCube
                | WeightSpectrum
                | Frequency
                | LsrFrequency
                | ChannelList
                | NChannel
        )
    }

    /// Does this field have a correlation axis (or depend on the correlation
    /// layout)?
    pub fn has_corr_axis(self) -> bool {
        use Field::*;
        matches!(
            self,
            FlagCube
                | VisCube
                | ModelCube
                | CorrectedCube
                | FloatCube
                | WeightMat
                | WeightSpectrum
                | SigmaMat
                | NCorr
                | CorrType
                | PolFrame
        )
    }

    fn bit(self) -> u64 {
        1 << (self as u8)
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A set of [`Field`]s, e.g. the valid or dirty fields of a buffer.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FieldSet(u64);

impl FieldSet {
    pub const fn empty() -> FieldSet {
        FieldSet(0)
    }

    pub fn all() -> FieldSet {
        Field::ALL.iter().copied().collect()
    }

    pub fn contains(self, field: Field) -> bool {
        self.0 & field.bit() != 0
    }

    pub fn insert(&mut self, field: Field) {
        self.0 |= field.bit();
    }

    pub fn remove(&mut self, field: Field) {
        self.0 &= !field.bit();
    }

    pub fn with(mut self, field: Field) -> FieldSet {
        self.insert(field);
        self
    }

    pub fn union(self, other: FieldSet) -> FieldSet {
        FieldSet(self.0 | other.0)
    }

    pub fn difference(self, other: FieldSet) -> FieldSet {
        FieldSet(self.0 & !other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = Field> {
        Field::ALL.into_iter().filter(move |f| self.contains(*f))
    }
}

impl FromIterator<Field> for FieldSet {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        let mut set = FieldSet::empty();
        for f in iter {
            set.insert(f);
        }
        set
    }
}

impl std::fmt::Debug for FieldSet {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
