//! # DisplayPort Error Handling
//!
//! Error types for the DisplayPort link stack.
//!
//! Error handling follows these rules:
//! - Expected protocol outcomes (a sink that will not train, a cable that is
//!   pulled) are values, never panics
//! - Errors are `Copy` and carry the link parameters needed for diagnosis
//! - Errors are `no_std` compatible

use core::fmt;

use crate::types::{LaneCount, LinkRate};

// =============================================================================
// RESULT TYPE
// =============================================================================

/// DisplayPort Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// DisplayPort unified error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// AUX transaction failed after local retries
    Aux(AuxError),
    /// PHY reported a fault
    Phy(PhyError),

    // =========================================================================
    // Connection State
    // =========================================================================
    /// Sink was unplugged while the operation was in progress
    ///
    /// Not a failure: the caller should run its disconnect flow.
    LinkUnplugged,
    /// Sink never reported a non-zero sink count
    SinkNotReady,
    /// Status burst read back as all ones (sink not responding)
    InvalidStatus,

    // =========================================================================
    // Training Errors
    // =========================================================================
    /// Sink advertised a zero or unusable link rate or lane count
    CapabilityMismatch,
    /// All retry budgets and fallback steps were used up
    TrainingExhausted {
        /// Phase that gave up last
        phase: TrainingPhase,
        /// Link rate of the final attempt
        link_rate: LinkRate,
        /// Lane count of the final attempt
        lane_count: LaneCount,
    },
    /// A previously trained link no longer looks healthy
    LinkDegraded(HealthFault),

    // =========================================================================
    // Compliance
    // =========================================================================
    /// Sink requested an automated test this driver does not run
    UnsupportedTestRequest(u8),
}

impl Error {
    /// Whether this error should be handled as a failure
    ///
    /// `LinkUnplugged` is reported through the error path but is a normal
    /// disconnect, so callers skip their failure teardown for it.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::LinkUnplugged)
    }

    /// Whether the caller should re-run full link training
    pub fn needs_retrain(&self) -> bool {
        matches!(self, Self::LinkDegraded(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aux(e) => write!(f, "AUX transaction failed: {}", e),
            Self::Phy(e) => write!(f, "PHY error: {}", e),

            Self::LinkUnplugged => write!(f, "sink unplugged"),
            Self::SinkNotReady => write!(f, "sink count never became non-zero"),
            Self::InvalidStatus => write!(f, "sink status read back as all ones"),

            Self::CapabilityMismatch => write!(f, "sink link rate or lane count is zero"),
            Self::TrainingExhausted {
                phase,
                link_rate,
                lane_count,
            } => write!(
                f,
                "link training exhausted in {} at {} x{}",
                phase,
                link_rate,
                lane_count.count()
            ),
            Self::LinkDegraded(fault) => write!(f, "link degraded: {}", fault),

            Self::UnsupportedTestRequest(bits) => {
                write!(f, "unsupported automated test request {:#04x}", bits)
            },
        }
    }
}

// =============================================================================
// SUB-ERROR TYPES
// =============================================================================

/// AUX channel transaction errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxError {
    /// No reply within the AUX reply timeout
    Timeout,
    /// Sink replied AUX_NACK
    Nack,
    /// Sink kept replying AUX_DEFER
    Defer,
    /// Reply carried fewer bytes than requested
    ShortReply,
    /// Controller-level I/O failure
    Io,
}

impl fmt::Display for AuxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Nack => write!(f, "NACK"),
            Self::Defer => write!(f, "DEFER"),
            Self::ShortReply => write!(f, "short reply"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

/// PHY error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhyError {
    /// PLL did not report lock
    PllLockTimeout,
}

impl fmt::Display for PhyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PllLockTimeout => write!(f, "PLL lock timeout"),
        }
    }
}

/// Training phase, for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingPhase {
    /// Clock recovery (TPS1)
    ClockRecovery,
    /// Channel equalization (TPS2/3/4)
    Equalization,
}

impl fmt::Display for TrainingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClockRecovery => write!(f, "clock recovery"),
            Self::Equalization => write!(f, "equalization"),
        }
    }
}

/// Reason a trained link failed its health check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthFault {
    /// `LINK_BW_SET` no longer matches the PHY link rate
    LinkRateMismatch,
    /// `LANE_COUNT_SET` no longer matches the PHY lane count
    LaneCountMismatch,
    /// Sink lost inter-lane alignment
    InterlaneAlignLost,
    /// Lane lost CR, EQ or symbol lock
    LaneNotLocked(u8),
}

impl fmt::Display for HealthFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LinkRateMismatch => write!(f, "link rate mismatch"),
            Self::LaneCountMismatch => write!(f, "lane count mismatch"),
            Self::InterlaneAlignLost => write!(f, "interlane alignment lost"),
            Self::LaneNotLocked(lane) => write!(f, "lane {} not locked", lane),
        }
    }
}

// =============================================================================
// ERROR CONVERSION
// =============================================================================

impl From<AuxError> for Error {
    fn from(e: AuxError) -> Self {
        Error::Aux(e)
    }
}

impl From<PhyError> for Error {
    fn from(e: PhyError) -> Self {
        Error::Phy(e)
    }
}

impl From<HealthFault> for Error {
    fn from(e: HealthFault) -> Self {
        Error::LinkDegraded(e)
    }
}

// =============================================================================
// TESTS
// =============================================================================
