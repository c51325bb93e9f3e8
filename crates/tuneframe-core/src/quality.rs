use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use crate::frame::FrameHeader;

/// Bits of the upstream quality field that the engine interprets.
pub mod upstream {
    pub const NO_LIMB: u32 = 0x0000_0010;
    pub const CAMERA_ANOMALY: u32 = 0x0000_0080;
    pub const ECLIPSE: u32 = 0x0000_2000;
    pub const ISS_LOOP_OPEN: u32 = 0x0002_0000;
    pub const THERMAL_RECOVERY: u32 = 0x0040_0000;
    pub const LUNAR_TRANSIT: u32 = 0x0080_0000;
    pub const MISSING_SEGMENT: u32 = 0x8000_0000;
}

/// Degradation and failure record of one output slot.
///
/// Flags are only ever added. Fatal flags force an empty product; advisory
/// flags mark the product degraded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualityFlags(u32);

impl QualityFlags {
    pub const NONE: Self = Self(0);

    // Fatal
    pub const NO_DATA: Self = Self(0x8000_0000);
    pub const TARGET_FILTERGRAM_MISSING: Self = Self(0x4000_0000);
    /// Never raised by the engine itself; kept so products share the
    /// bitmask layout of upstream processing.
    pub const NO_INTERPOLATED_KEYWORDS: Self = Self(0x2000_0000);
    pub const NO_FRAMELIST_INFO: Self = Self(0x1000_0000);
    pub const WRONG_CADENCE: Self = Self(0x0800_0000);
    pub const WRONG_FRAMELIST_SIZE: Self = Self(0x0400_0000);
    pub const WRONG_NPOL: Self = Self(0x0200_0000);
    pub const WRONG_POL_TYPE: Self = Self(0x0100_0000);
    pub const WRONG_TARGET: Self = Self(0x0080_0000);
    /// Never raised by the engine itself; kept so products share the
    /// bitmask layout of upstream processing.
    pub const ERROR_FRAMELIST: Self = Self(0x0040_0000);
    pub const WRONG_WAVELENGTH_NUM: Self = Self(0x0020_0000);
    pub const NOT_ENOUGH_INTERPOLANTS: Self = Self(0x0004_0000);
    pub const INTERPOLATION_FAILED: Self = Self(0x0002_0000);

    // Advisory
    pub const LOW_INTERP_NUM: Self = Self(0x0001_0000);
    /// Never raised by the engine itself; kept so products share the
    /// bitmask layout of upstream processing.
    pub const LOW_KEYWORD_NUM: Self = Self(0x0000_8000);
    pub const ISS_TARGET: Self = Self(0x0000_4000);
    pub const NO_TEMP: Self = Self(0x0000_2000);
    pub const NO_GAPFILL: Self = Self(0x0000_1000);
    pub const LIMBFIT_ISSUE: Self = Self(0x0000_0800);
    pub const NO_COSMIC_RAY: Self = Self(0x0000_0400);
    pub const ECLIPSE: Self = Self(0x0000_0200);
    pub const POOR_QUALITY: Self = Self(0x0000_0020);

    pub const FATAL: Self = Self(
        Self::NO_DATA.0
            | Self::TARGET_FILTERGRAM_MISSING.0
            | Self::NO_INTERPOLATED_KEYWORDS.0
            | Self::NO_FRAMELIST_INFO.0
            | Self::WRONG_CADENCE.0
            | Self::WRONG_FRAMELIST_SIZE.0
            | Self::WRONG_NPOL.0
            | Self::WRONG_POL_TYPE.0
            | Self::WRONG_TARGET.0
            | Self::ERROR_FRAMELIST.0
            | Self::WRONG_WAVELENGTH_NUM.0
            | Self::NOT_ENOUGH_INTERPOLANTS.0
            | Self::INTERPOLATION_FAILED.0,
    );

    pub const ADVISORY: Self = Self(
        Self::LOW_INTERP_NUM.0
            | Self::LOW_KEYWORD_NUM.0
            | Self::ISS_TARGET.0
            | Self::NO_TEMP.0
            | Self::NO_GAPFILL.0
            | Self::LIMBFIT_ISSUE.0
            | Self::NO_COSMIC_RAY.0
            | Self::ECLIPSE.0
            | Self::POOR_QUALITY.0,
    );

    const NAMES: [(Self, &'static str); 22] = [
        (Self::NO_DATA, "NO_DATA"),
        (Self::TARGET_FILTERGRAM_MISSING, "TARGET_FILTERGRAM_MISSING"),
        (Self::NO_INTERPOLATED_KEYWORDS, "NO_INTERPOLATED_KEYWORDS"),
        (Self::NO_FRAMELIST_INFO, "NO_FRAMELIST_INFO"),
        (Self::WRONG_CADENCE, "WRONG_CADENCE"),
        (Self::WRONG_FRAMELIST_SIZE, "WRONG_FRAMELIST_SIZE"),
        (Self::WRONG_NPOL, "WRONG_NPOL"),
        (Self::WRONG_POL_TYPE, "WRONG_POL_TYPE"),
        (Self::WRONG_TARGET, "WRONG_TARGET"),
        (Self::ERROR_FRAMELIST, "ERROR_FRAMELIST"),
        (Self::WRONG_WAVELENGTH_NUM, "WRONG_WAVELENGTH_NUM"),
        (Self::NOT_ENOUGH_INTERPOLANTS, "NOT_ENOUGH_INTERPOLANTS"),
        (Self::INTERPOLATION_FAILED, "INTERPOLATION_FAILED"),
        (Self::LOW_INTERP_NUM, "LOW_INTERP_NUM"),
        (Self::LOW_KEYWORD_NUM, "LOW_KEYWORD_NUM"),
        (Self::ISS_TARGET, "ISS_TARGET"),
        (Self::NO_TEMP, "NO_TEMP"),
        (Self::NO_GAPFILL, "NO_GAPFILL"),
        (Self::LIMBFIT_ISSUE, "LIMBFIT_ISSUE"),
        (Self::NO_COSMIC_RAY, "NO_COSMIC_RAY"),
        (Self::ECLIPSE, "ECLIPSE"),
        (Self::POOR_QUALITY, "POOR_QUALITY"),
    ];

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn is_fatal(self) -> bool {
        self.intersects(Self::FATAL)
    }

    pub fn is_degraded(self) -> bool {
        self.intersects(Self::ADVISORY)
    }

    /// Names of the set flags, most severe first.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl BitOr for QualityFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for QualityFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl std::fmt::Display for QualityFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Terminal outcome of a target slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotOutcome {
    Emitted,
    EmittedDegraded,
    EmittedEmpty,
}

impl std::fmt::Display for SlotOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Emitted => write!(f, "Emitted"),
            Self::EmittedDegraded => write!(f, "Emitted (degraded)"),
            Self::EmittedEmpty => write!(f, "Emitted (empty)"),
        }
    }
}

/// Accumulates the quality record of one slot, or of one channel before it
/// is merged into its slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QualityAccumulator {
    flags: QualityFlags,
    source: u32,
}

impl QualityAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag(&mut self, flags: QualityFlags) {
        self.flags |= flags;
    }

    /// Fold an upstream quality field into the record.
    pub fn absorb_source(&mut self, bits: u32) {
        self.source |= bits;
        if bits & upstream::ISS_LOOP_OPEN != 0 {
            self.flags |= QualityFlags::ISS_TARGET | QualityFlags::POOR_QUALITY;
        }
        if bits & upstream::ECLIPSE != 0 {
            self.flags |= QualityFlags::ECLIPSE | QualityFlags::POOR_QUALITY;
        }
        if bits & upstream::NO_LIMB != 0 {
            self.flags |= QualityFlags::LIMBFIT_ISSUE;
        }
        if bits & (upstream::LUNAR_TRANSIT | upstream::THERMAL_RECOVERY | upstream::CAMERA_ANOMALY)
            != 0
        {
            self.flags |= QualityFlags::POOR_QUALITY;
        }
    }

    /// Fold everything a used frame carries into the record.
    pub fn absorb_frame(&mut self, header: &FrameHeader) {
        self.absorb_source(header.quality);
        if header.tuning_loop_open {
            self.flags |= QualityFlags::ISS_TARGET;
        }
    }

    /// Apply the interpolant threshold test. Returns false when the channel
    /// cannot be interpolated.
    pub fn record_interpolants(&mut self, required: usize, available: usize, minimum: usize) -> bool {
        if available < minimum || available == 0 {
            self.flags |= QualityFlags::NOT_ENOUGH_INTERPOLANTS | QualityFlags::LOW_INTERP_NUM;
            return false;
        }
        if available < required {
            self.flags |= QualityFlags::LOW_INTERP_NUM;
        }
        true
    }

    /// Flag a complete interpolation set whose frames spread over more than
    /// the sequence should take.
    pub fn check_span(&mut self, times: &[f64], cadence: f64, channel_count: usize) {
        if times.len() < 2 || channel_count == 0 {
            return;
        }
        let first = times.iter().copied().fold(f64::INFINITY, f64::min);
        let last = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let allowed = cadence * (times.len() - 1) as f64 + cadence / channel_count as f64;
        if last - first > allowed {
            self.flags |= QualityFlags::LOW_INTERP_NUM;
        }
    }

    pub fn merge(&mut self, other: &QualityAccumulator) {
        self.flags |= other.flags;
        self.source |= other.source;
    }

    pub fn flags(&self) -> QualityFlags {
        self.flags
    }

    /// Union of the upstream quality fields of every frame folded in.
    pub fn source_flags(&self) -> u32 {
        self.source
    }

    pub fn is_fatal(&self) -> bool {
        self.flags.is_fatal()
    }

    pub fn outcome(&self) -> SlotOutcome {
        if self.flags.is_fatal() {
            SlotOutcome::EmittedEmpty
        } else if self.flags.is_degraded() {
            SlotOutcome::EmittedDegraded
        } else {
            SlotOutcome::Emitted
        }
    }

    /// Close the record. An empty product always carries `NO_DATA`.
    pub fn finish(mut self) -> (QualityFlags, u32, SlotOutcome) {
        let outcome = self.outcome();
        if outcome == SlotOutcome::EmittedEmpty {
            self.flags |= QualityFlags::NO_DATA;
        }
        (self.flags, self.source, outcome)
    }
}
