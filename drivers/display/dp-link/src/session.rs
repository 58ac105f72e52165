//! # Training Session
//!
//! Mutable state of one training attempt. A session is created per hotplug
//! connect or retrain and dropped once training finishes; only the
//! negotiated link parameters outlive it.

use arrayvec::ArrayVec;
use helix_dp_core::dpcd::{AdjustRequest, LaneSet};
use helix_dp_core::{DriveLevel, LaneCount, LaneDrive, LinkRate, MAX_LANES};

use crate::config::TrainingOverride;
use crate::negotiate::{LinkFeatures, Negotiated};

/// Number of steps on the link-rate ladder
pub const LADDER_LEN: usize = LinkRate::ALL.len();

// =============================================================================
// LANE CONFIG
// =============================================================================

/// Per-lane drive settings and their repeat history
///
/// A value's repeat count is the number of consecutive rounds it has been
/// programmed unchanged. Swing and pre-emphasis are tracked separately.
#[derive(Debug, Clone, Default)]
pub struct LaneConfig {
    drive: [LaneDrive; MAX_LANES],
    last_programmed: Option<[LaneDrive; MAX_LANES]>,
    swing_repeats: [u32; MAX_LANES],
    pre_emphasis_repeats: [u32; MAX_LANES],
}

impl LaneConfig {
    /// All lanes at level 0, no history
    pub fn new() -> Self {
        Self::default()
    }

    /// Current drive settings
    pub fn drive(&self) -> &[LaneDrive; MAX_LANES] {
        &self.drive
    }

    /// Voltage swing of every lane
    pub fn swings(&self) -> [DriveLevel; MAX_LANES] {
        self.drive.map(|lane| lane.swing)
    }

    /// Pre-emphasis of every lane
    pub fn pre_emphases(&self) -> [DriveLevel; MAX_LANES] {
        self.drive.map(|lane| lane.pre_emphasis)
    }

    /// Consecutive rounds each lane's swing has been programmed
    pub fn swing_repeats(&self) -> &[u32; MAX_LANES] {
        &self.swing_repeats
    }

    /// Consecutive rounds each lane's pre-emphasis has been programmed
    pub fn pre_emphasis_repeats(&self) -> &[u32; MAX_LANES] {
        &self.pre_emphasis_repeats
    }

    /// Take over the sink's requested settings for the next round
    pub fn adopt(&mut self, adjust: &AdjustRequest) {
        self.drive = adjust.lanes;
    }

    /// Record a programming round and build the lane-set bytes
    pub fn program(&mut self, max_reach_repeats: u32) -> [LaneSet; MAX_LANES] {
        for lane in 0..MAX_LANES {
            let previous = self.last_programmed.map(|last| last[lane]);
            let current = self.drive[lane];

            self.swing_repeats[lane] = match previous {
                Some(p) if p.swing == current.swing => self.swing_repeats[lane] + 1,
                _ => 1,
            };
            self.pre_emphasis_repeats[lane] = match previous {
                Some(p) if p.pre_emphasis == current.pre_emphasis => {
                    self.pre_emphasis_repeats[lane] + 1
                },
                _ => 1,
            };
        }
        self.last_programmed = Some(self.drive);

        core::array::from_fn(|lane| LaneSet {
            drive: self.drive[lane],
            max_swing_reached: self.swing_repeats[lane] >= max_reach_repeats,
            max_pre_emphasis_reached: self.pre_emphasis_repeats[lane] >= max_reach_repeats,
        })
    }

    /// Every active lane has its swing flagged max-reached
    pub fn swing_maxed(&self, lanes: LaneCount, max_reach_repeats: u32) -> bool {
        self.swing_repeats[..lanes.lanes()]
            .iter()
            .all(|&repeats| repeats >= max_reach_repeats)
    }
}

// =============================================================================
// STATISTICS
// =============================================================================

/// Counters over a whole training session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrainingStats {
    /// PhySetup entries
    pub phy_setups: u32,
    /// PHY reset sequences actually performed
    pub phy_resets: u32,
    /// Clock recovery rounds
    pub cr_rounds: u32,
    /// Adjust requests adopted during clock recovery
    pub cr_adjustments: u32,
    /// Clock recovery exits because every active lane's swing was maxed
    pub max_swing_fallbacks: u32,
    /// Clock recovery exits because the sink repeated the same swing
    pub cr_stall_fallbacks: u32,
    /// Clock recovery exits because the per-rate adjustment budget ran out
    pub retry_budget_fallbacks: u32,
    /// EqualizationSetup entries
    pub eq_setups: u32,
    /// Equalization rounds
    pub eq_rounds: u32,
    /// Adjust requests adopted during equalization
    pub eq_adjustments: u32,
    /// Steps down the link-rate ladder
    pub fallbacks: u32,
}

/// Summary of a finished session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingReport {
    /// Link rates attempted, in order
    pub attempted: ArrayVec<LinkRate, LADDER_LEN>,
    /// Session counters
    pub stats: TrainingStats,
    /// Lane-set bytes of the last round
    pub last_lane_set: [u8; MAX_LANES],
    /// Negotiated parameters, if training succeeded
    pub negotiated: Option<(LinkRate, LaneCount)>,
}

// =============================================================================
// TRAINING SESSION
// =============================================================================

/// State of one link training attempt
#[derive(Debug, Clone)]
pub struct TrainingSession {
    link_rate: LinkRate,
    lane_count: LaneCount,
    features: LinkFeatures,
    aux_rd_interval: u8,
    forced: TrainingOverride,

    pub(crate) lanes: LaneConfig,
    pub(crate) cr_stalls: u32,
    pub(crate) eq_retries: u32,
    pub(crate) total_retries: u32,
    pub(crate) stats: TrainingStats,
    pub(crate) last_lane_set: [u8; MAX_LANES],
    pub(crate) pattern_written: bool,
    pub(crate) negotiated: Option<(LinkRate, LaneCount)>,

    attempted: ArrayVec<LinkRate, LADDER_LEN>,
}

impl Default for TrainingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingSession {
    /// Fresh session without overrides
    pub fn new() -> Self {
        Self::with_override(TrainingOverride::NONE)
    }

    /// Fresh session that forces link parameters
    pub fn with_override(forced: TrainingOverride) -> Self {
        Self {
            link_rate: LinkRate::Rbr,
            lane_count: LaneCount::One,
            features: LinkFeatures::empty(),
            aux_rd_interval: 0,
            forced,
            lanes: LaneConfig::new(),
            cr_stalls: 0,
            eq_retries: 0,
            total_retries: 0,
            stats: TrainingStats::default(),
            last_lane_set: [0; MAX_LANES],
            pattern_written: false,
            negotiated: None,
            attempted: ArrayVec::new(),
        }
    }

    /// Link rate of the current attempt
    pub fn link_rate(&self) -> LinkRate {
        self.link_rate
    }

    /// Lane count of the current attempt
    pub fn lane_count(&self) -> LaneCount {
        self.lane_count
    }

    /// Features negotiated with the sink
    pub fn features(&self) -> LinkFeatures {
        self.features
    }

    /// Sink's `TRAINING_AUX_RD_INTERVAL`
    pub fn aux_rd_interval(&self) -> u8 {
        self.aux_rd_interval
    }

    /// Forced link parameters
    pub fn forced(&self) -> &TrainingOverride {
        &self.forced
    }

    /// Current lane drive settings
    pub fn lane_config(&self) -> &LaneConfig {
        &self.lanes
    }

    /// Consecutive unchanged swing requests at this rate
    pub fn cr_stalls(&self) -> u32 {
        self.cr_stalls
    }

    /// Equalization retries at this rate
    pub fn eq_retries(&self) -> u32 {
        self.eq_retries
    }

    /// Clock recovery adjustments at this rate
    pub fn total_retries(&self) -> u32 {
        self.total_retries
    }

    /// Link rates attempted so far, in order
    pub fn attempted_rates(&self) -> &[LinkRate] {
        &self.attempted
    }

    /// Session counters
    pub fn stats(&self) -> &TrainingStats {
        &self.stats
    }

    /// Lane-set bytes of the last round
    pub fn last_lane_set(&self) -> [u8; MAX_LANES] {
        self.last_lane_set
    }

    /// Negotiated parameters, once training succeeded
    pub fn negotiated(&self) -> Option<(LinkRate, LaneCount)> {
        self.negotiated
    }

    /// Snapshot for the caller
    pub fn report(&self) -> TrainingReport {
        TrainingReport {
            attempted: self.attempted.clone(),
            stats: self.stats,
            last_lane_set: self.last_lane_set,
            negotiated: self.negotiated,
        }
    }

    /// Apply the negotiated starting point
    pub(crate) fn start(&mut self, negotiated: &Negotiated, aux_rd_interval: u8) {
        self.lane_count = negotiated.lane_count;
        self.features = negotiated.features;
        self.aux_rd_interval = aux_rd_interval;
        self.begin_rate(negotiated.link_rate);
    }

    /// Enter a new step of the ladder, resetting the per-rate state
    pub(crate) fn begin_rate(&mut self, rate: LinkRate) {
        self.link_rate = rate;
        self.lanes = LaneConfig::new();
        self.cr_stalls = 0;
        self.eq_retries = 0;
        self.total_retries = 0;
        // The ladder only descends, so each rate is pushed at most once.
        if self.attempted.try_push(rate).is_err() {
            log::warn!("DP: attempted-rate log full, dropping {}", rate);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
