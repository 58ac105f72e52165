//! # Link Training Configuration
//!
//! Retry budgets, timings and source capabilities used by the link layer.
//! The defaults are the VESA DisplayPort values.

use helix_dp_core::{LaneCount, LinkRate};

// =============================================================================
// VESA DEFAULTS
// =============================================================================

/// Consecutive unchanged adjust requests tolerated in clock recovery
pub const CR_STALL_LIMIT: u32 = 4;
/// Equalization retries before giving up
pub const EQ_RETRY_LIMIT: u32 = 5;
/// Clock recovery adjustments per link rate
pub const TOTAL_RETRY_LIMIT: u32 = 10;
/// Rounds a drive value must be held before it counts as maxed out
pub const MAX_REACH_REPEATS: u32 = 5;
/// Immediate retries of a failed AUX transaction
pub const AUX_RETRY_LIMIT: u32 = 4;
/// Backoff between capability read retries (ms)
pub const AUX_RETRY_BACKOFF_MS: u32 = 50;
/// Settle time between PHY programming and reset release (µs)
pub const PHY_RESET_SETTLE_US: u32 = 60;
/// Floor of the training AUX read interval (µs)
pub const MIN_AUX_RD_INTERVAL_US: u32 = 100;
/// Sink count polls before giving up
pub const SINK_COUNT_POLLS: u32 = 200;
/// Interval between sink count polls (ms)
pub const SINK_COUNT_POLL_INTERVAL_MS: u32 = 20;
/// Extra settle time when the sink count appeared late (ms)
pub const SINK_SETTLE_MS: u32 = 10;
/// Polls from the end of the budget that count as "late"
pub const SINK_LATE_POLLS: u32 = 10;

// =============================================================================
// TRAINING CONFIG
// =============================================================================

/// Link training configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingConfig {
    /// Consecutive unchanged swing requests before a clock recovery fallback
    pub cr_stall_limit: u32,
    /// Equalization retries before permanent failure
    pub eq_retry_limit: u32,
    /// Clock recovery adjustments per link rate before fallback
    pub total_retry_limit: u32,
    /// Rounds of an unchanged drive value before max-reached is flagged
    pub max_reach_repeats: u32,
    /// Immediate retries of a failed AUX transaction
    pub aux_retry_limit: u32,
    /// Backoff between capability read retries (ms)
    pub aux_retry_backoff_ms: u32,
    /// PHY settle time before reset release (µs)
    pub phy_reset_settle_us: u32,
    /// Minimum wait between lane programming and status read (µs)
    pub min_aux_rd_interval_us: u32,
    /// Source PHY can transmit TPS3
    pub source_supports_tps3: bool,
    /// Source PHY can transmit TPS4
    pub source_supports_tps4: bool,
    /// Sink count polls before giving up
    pub sink_count_polls: u32,
    /// Interval between sink count polls (ms)
    pub sink_count_poll_interval_ms: u32,
    /// Extra settle time when the sink count appeared late (ms)
    pub sink_settle_ms: u32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            cr_stall_limit: CR_STALL_LIMIT,
            eq_retry_limit: EQ_RETRY_LIMIT,
            total_retry_limit: TOTAL_RETRY_LIMIT,
            max_reach_repeats: MAX_REACH_REPEATS,
            aux_retry_limit: AUX_RETRY_LIMIT,
            aux_retry_backoff_ms: AUX_RETRY_BACKOFF_MS,
            phy_reset_settle_us: PHY_RESET_SETTLE_US,
            min_aux_rd_interval_us: MIN_AUX_RD_INTERVAL_US,
            source_supports_tps3: true,
            source_supports_tps4: true,
            sink_count_polls: SINK_COUNT_POLLS,
            sink_count_poll_interval_ms: SINK_COUNT_POLL_INTERVAL_MS,
            sink_settle_ms: SINK_SETTLE_MS,
        }
    }
}

impl TrainingConfig {
    /// Configuration for a source PHY limited to TPS1/TPS2
    pub fn tps2_only() -> Self {
        Self {
            source_supports_tps3: false,
            source_supports_tps4: false,
            ..Default::default()
        }
    }

    /// Wait between lane programming and the status read
    ///
    /// `raw` is `TRAINING_AUX_RD_INTERVAL` in 4 ms units.
    pub fn aux_rd_interval_us(&self, raw: u8) -> u32 {
        core::cmp::max(u32::from(raw) * 4000, self.min_aux_rd_interval_us)
    }
}

// =============================================================================
// OVERRIDES
// =============================================================================

/// Forced link parameters
///
/// Used for debugging and for compliance tests that dictate the rate and
/// lane count. Set fields replace the negotiated values as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrainingOverride {
    /// Forced link rate
    pub link_rate: Option<LinkRate>,
    /// Forced lane count
    pub lane_count: Option<LaneCount>,
}

impl TrainingOverride {
    /// No override
    pub const NONE: Self = Self {
        link_rate: None,
        lane_count: None,
    };

    /// Force both rate and lane count
    pub const fn forced(link_rate: LinkRate, lane_count: LaneCount) -> Self {
        Self {
            link_rate: Some(link_rate),
            lane_count: Some(lane_count),
        }
    }

    /// Whether nothing is overridden
    pub fn is_empty(&self) -> bool {
        self.link_rate.is_none() && self.lane_count.is_none()
    }

    /// Apply to a negotiated pair
    pub fn apply(&self, link_rate: LinkRate, lane_count: LaneCount) -> (LinkRate, LaneCount) {
        (
            self.link_rate.unwrap_or(link_rate),
            self.lane_count.unwrap_or(lane_count),
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_vesa_budgets() {
        let config = TrainingConfig::default();
        assert_eq!(config.cr_stall_limit, 4);
        assert_eq!(config.eq_retry_limit, 5);
        assert_eq!(config.total_retry_limit, 10);
        assert_eq!(config.max_reach_repeats, 5);
        assert!(config.source_supports_tps4);
    }

    #[test]
    fn test_aux_rd_interval() {
        let config = TrainingConfig::default();
        assert_eq!(config.aux_rd_interval_us(0), 100);
        assert_eq!(config.aux_rd_interval_us(1), 4000);
        assert_eq!(config.aux_rd_interval_us(4), 16000);
    }

    #[test]
    fn test_override_apply() {
        assert!(TrainingOverride::NONE.is_empty());
        assert_eq!(
            TrainingOverride::NONE.apply(LinkRate::Hbr2, LaneCount::Four),
            (LinkRate::Hbr2, LaneCount::Four)
        );

        let rate_only = TrainingOverride {
            link_rate: Some(LinkRate::Rbr),
            lane_count: None,
        };
        assert_eq!(
            rate_only.apply(LinkRate::Hbr2, LaneCount::Four),
            (LinkRate::Rbr, LaneCount::Four)
        );

        let forced = TrainingOverride::forced(LinkRate::Hbr3, LaneCount::One);
        assert!(!forced.is_empty());
        assert_eq!(
            forced.apply(LinkRate::Rbr, LaneCount::Four),
            (LinkRate::Hbr3, LaneCount::One)
        );
    }
}
