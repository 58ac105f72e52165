//! # Capability Negotiation
//!
//! Turns the sink's receiver capabilities into the link parameters the
//! first training attempt starts from.

use helix_dp_core::dpcd::SinkCapabilities;
use helix_dp_core::{Error, LaneCount, LinkRate, Result, TrainingPattern};

use crate::config::{TrainingConfig, TrainingOverride};

bitflags::bitflags! {
    /// Link features both ends support
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LinkFeatures: u8 {
        /// TPS3 usable for equalization
        const TPS3 = 1 << 0;
        /// TPS4 usable for equalization
        const TPS4 = 1 << 1;
        /// Enhanced framing
        const ENHANCED_FRAME = 1 << 2;
    }
}

impl LinkFeatures {
    /// Richest equalization pattern available
    pub fn equalization_pattern(self) -> TrainingPattern {
        if self.contains(Self::TPS4) {
            TrainingPattern::Pattern4
        } else if self.contains(Self::TPS3) {
            TrainingPattern::Pattern3
        } else {
            TrainingPattern::Pattern2
        }
    }
}

/// Starting point of a training attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    /// Link rate to try first
    pub link_rate: LinkRate,
    /// Lane count for every attempt
    pub lane_count: LaneCount,
    /// Mutually supported features
    pub features: LinkFeatures,
}

/// Negotiate the starting link parameters
///
/// The result never exceeds the sink maxima or the caller's initial values,
/// unless an override forces something else.
pub fn negotiate(
    caps: &SinkCapabilities,
    initial_rate: LinkRate,
    initial_lanes: LaneCount,
    config: &TrainingConfig,
    forced: &TrainingOverride,
) -> Result<Negotiated> {
    let (Some(max_rate), Some(max_lanes)) = (caps.max_link_rate(), caps.max_lanes()) else {
        log::error!(
            "DP: unusable sink capabilities, rate {:#04x} lanes {}",
            caps.max_link_rate_code,
            caps.max_lane_count
        );
        return Err(Error::CapabilityMismatch);
    };

    if LinkRate::from_code(caps.max_link_rate_code).is_none() {
        log::warn!(
            "DP: non-standard max link rate {:#04x}, using {}",
            caps.max_link_rate_code,
            max_rate
        );
    }

    let link_rate = core::cmp::min(initial_rate, max_rate);
    let lane_count = core::cmp::min(initial_lanes, max_lanes);

    let (link_rate, lane_count) = if forced.is_empty() {
        (link_rate, lane_count)
    } else {
        let (rate, lanes) = forced.apply(link_rate, lane_count);
        log::warn!(
            "DP: training override {} x{} (sink max {} x{})",
            rate,
            lanes.count(),
            max_rate,
            max_lanes.count()
        );
        (rate, lanes)
    };

    let mut features = LinkFeatures::empty();
    features.set(
        LinkFeatures::TPS3,
        caps.tps3_supported && config.source_supports_tps3,
    );
    features.set(
        LinkFeatures::TPS4,
        caps.tps4_supported && config.source_supports_tps4,
    );
    features.set(LinkFeatures::ENHANCED_FRAME, caps.enhanced_frame);

    log::info!(
        "DP: sink max {} x{}, starting at {} x{} ({:?})",
        max_rate,
        max_lanes.count(),
        link_rate,
        lane_count.count(),
        features
    );

    Ok(Negotiated {
        link_rate,
        lane_count,
        features,
    })
}

// =============================================================================
// TESTS
// =============================================================================
