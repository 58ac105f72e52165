//! # DisplayPort Link Types
//!
//! Strongly-typed link parameters. Only the values the VESA standard allows
//! for main-link operation are representable.

use core::fmt;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Maximum number of main-link lanes
pub const MAX_LANES: usize = 4;

// =============================================================================
// LINK RATE
// =============================================================================

/// Main-link bit rate per lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LinkRate {
    /// 1.62 Gbps (RBR)
    Rbr  = 0x06,
    /// 2.7 Gbps (HBR)
    Hbr  = 0x0A,
    /// 5.4 Gbps (HBR2)
    Hbr2 = 0x14,
    /// 8.1 Gbps (HBR3)
    Hbr3 = 0x1E,
}

impl LinkRate {
    /// All legal rates, slowest first
    pub const ALL: [LinkRate; 4] = [Self::Rbr, Self::Hbr, Self::Hbr2, Self::Hbr3];

    /// `LINK_BW_SET` / `MAX_LINK_RATE` code
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Parse an exact DPCD link-rate code
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0x06 => Some(Self::Rbr),
            0x0A => Some(Self::Hbr),
            0x14 => Some(Self::Hbr2),
            0x1E => Some(Self::Hbr3),
            _ => None,
        }
    }

    /// Highest legal rate not above `code`
    ///
    /// Sinks occasionally advertise codes between the standard steps; those
    /// are rounded down.
    pub fn floor_code(code: u8) -> Option<Self> {
        Self::ALL.iter().rev().copied().find(|rate| rate.code() <= code)
    }

    /// Next step down the fallback ladder
    pub const fn lower(self) -> Option<Self> {
        match self {
            Self::Hbr3 => Some(Self::Hbr2),
            Self::Hbr2 => Some(Self::Hbr),
            Self::Hbr => Some(Self::Rbr),
            Self::Rbr => None,
        }
    }

    /// Per-lane bit rate in Mbps
    pub const fn mbps(self) -> u32 {
        match self {
            Self::Rbr => 1620,
            Self::Hbr => 2700,
            Self::Hbr2 => 5400,
            Self::Hbr3 => 8100,
        }
    }
}

impl fmt::Display for LinkRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mbps = self.mbps();
        let frac = (mbps % 1000) / 10;
        if frac % 10 == 0 {
            write!(f, "{}.{} Gbps", mbps / 1000, frac / 10)
        } else {
            write!(f, "{}.{:02} Gbps", mbps / 1000, frac)
        }
    }
}

// =============================================================================
// LANE COUNT
// =============================================================================

/// Number of active main-link lanes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LaneCount {
    /// One lane
    One  = 1,
    /// Two lanes
    Two  = 2,
    /// Four lanes
    Four = 4,
}

impl LaneCount {
    /// Number of lanes
    pub const fn count(self) -> u8 {
        self as u8
    }

    /// Number of lanes, for indexing
    pub const fn lanes(self) -> usize {
        self as usize
    }

    /// Parse an exact lane count
    pub const fn from_count(count: u8) -> Option<Self> {
        match count {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            4 => Some(Self::Four),
            _ => None,
        }
    }

    /// Largest legal lane count not above `count`
    pub const fn floor_count(count: u8) -> Option<Self> {
        match count {
            0 => None,
            1 => Some(Self::One),
            2 | 3 => Some(Self::Two),
            _ => Some(Self::Four),
        }
    }

    /// Bit mask with one bit per active lane
    pub const fn mask(self) -> u8 {
        (1 << self.count()) - 1
    }
}

// =============================================================================
// DRIVE LEVEL
// =============================================================================

/// Voltage swing or pre-emphasis level
///
/// Both are 2-bit quantities; anything wider is masked on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum DriveLevel {
    /// Level 0
    #[default]
    Level0 = 0,
    /// Level 1
    Level1 = 1,
    /// Level 2
    Level2 = 2,
    /// Level 3
    Level3 = 3,
}

impl DriveLevel {
    /// Build from the low two bits of `bits`
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => Self::Level0,
            1 => Self::Level1,
            2 => Self::Level2,
            _ => Self::Level3,
        }
    }

    /// Raw 2-bit value
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

/// Electrical drive setting for one lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaneDrive {
    /// Voltage swing level
    pub swing: DriveLevel,
    /// Pre-emphasis level
    pub pre_emphasis: DriveLevel,
}

impl LaneDrive {
    /// Create a lane drive setting
    pub const fn new(swing: DriveLevel, pre_emphasis: DriveLevel) -> Self {
        Self {
            swing,
            pre_emphasis,
        }
    }
}

// =============================================================================
// TRAINING PATTERN
// =============================================================================

/// Link training pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrainingPattern {
    /// TPS1, clock recovery
    Pattern1,
    /// TPS2, equalization
    Pattern2,
    /// TPS3, equalization (HBR2 capable sinks)
    Pattern3,
    /// TPS4, equalization (HBR3 capable sinks)
    Pattern4,
    /// Training off, normal scrambled video data
    Normal,
}

impl TrainingPattern {
    /// Whether the pattern is sent with scrambling disabled
    ///
    /// TPS4 is defined as a scrambled pattern.
    pub const fn scrambling_disabled(self) -> bool {
        matches!(self, Self::Pattern1 | Self::Pattern2 | Self::Pattern3)
    }
}

// =============================================================================
// TESTS
// =============================================================================
