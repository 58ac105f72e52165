//! # Link Training Engine
//!
//! Full link training as an explicit state machine.
//!
//! Each state handler does one unit of work and returns the next state. The
//! unplug flag is polled before capability negotiation, before every
//! PhySetup and before every clock recovery and equalization round; once it
//! is seen the engine returns [`Error::LinkUnplugged`] without touching the
//! sink again.
//!
//! ## Retry budgets (per link rate)
//!
//! - Clock recovery falls back when every active lane's swing is flagged
//!   max-reached, when the sink repeats the same swing request past
//!   `cr_stall_limit`, or after `total_retry_limit` adjustments.
//! - Equalization falls back when clock recovery is lost and fails outright
//!   after `eq_retry_limit` adjustments.

use helix_dp_core::dpcd::{self, regs, AdjustRequest, LaneAlignStatus, SinkCapabilities};
use helix_dp_core::{
    AuxChannel, Error, LaneCount, LinkRate, PhyController, Platform, Result, TrainingPattern,
    TrainingPhase, MAX_LANES,
};

use crate::aux;
use crate::config::TrainingConfig;
use crate::negotiate::{self, LinkFeatures};
use crate::session::TrainingSession;

// =============================================================================
// STATES
// =============================================================================

/// Training state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Read and negotiate sink capabilities
    Idle,
    /// Program the PHY and the sink for the current rate
    PhySetup,
    /// One clock recovery round
    ClockRecovery,
    /// Select and start the equalization pattern
    EqualizationSetup,
    /// One equalization round
    Equalization,
    /// Step down the link-rate ladder
    ReduceLinkRate(TrainingPhase),
    /// Link is up
    Success,
    /// Training gave up
    Failed(TrainingPhase),
}

// =============================================================================
// LINK TRAINER
// =============================================================================

/// Link training engine over borrowed hardware
pub struct LinkTrainer<'a, A, P, H> {
    aux: &'a mut A,
    phy: &'a mut P,
    platform: &'a H,
    config: &'a TrainingConfig,
}

impl<'a, A, P, H> core::fmt::Debug for LinkTrainer<'a, A, P, H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LinkTrainer")
            .field("config", self.config)
            .finish_non_exhaustive()
    }
}

impl<'a, A, P, H> LinkTrainer<'a, A, P, H>
where
    A: AuxChannel,
    P: PhyController,
    H: Platform,
{
    /// Create a trainer
    pub fn new(aux: &'a mut A, phy: &'a mut P, platform: &'a H, config: &'a TrainingConfig) -> Self {
        Self {
            aux,
            phy,
            platform,
            config,
        }
    }

    /// Run full link training
    ///
    /// `initial_rate` and `initial_lanes` cap the starting point; the sink
    /// maxima cap it further. On success the DPCD pattern register holds
    /// normal data and the negotiated pair is returned.
    pub fn train(
        &mut self,
        session: &mut TrainingSession,
        initial_rate: LinkRate,
        initial_lanes: LaneCount,
    ) -> Result<(LinkRate, LaneCount)> {
        let result = self.run(session, initial_rate, initial_lanes);

        if let Err(err) = result {
            match err {
                Error::LinkUnplugged => log::info!("DP: sink unplugged during link training"),
                Error::Aux(_) if session.pattern_written => {
                    log::error!("DP: link training aborted: {}", err);
                    self.restore_normal_pattern();
                },
                _ => log::error!("DP: link training failed: {}", err),
            }
        }
        result
    }

    fn run(
        &mut self,
        session: &mut TrainingSession,
        initial_rate: LinkRate,
        initial_lanes: LaneCount,
    ) -> Result<(LinkRate, LaneCount)> {
        let mut state = State::Idle;
        loop {
            state = match state {
                State::Idle => self.negotiate(session, initial_rate, initial_lanes)?,
                State::PhySetup => self.phy_setup(session)?,
                State::ClockRecovery => self.clock_recovery_round(session)?,
                State::EqualizationSetup => self.equalization_setup(session)?,
                State::Equalization => self.equalization_round(session)?,
                State::ReduceLinkRate(phase) => self.reduce_link_rate(session, phase),
                State::Success => {
                    let negotiated = (session.link_rate(), session.lane_count());
                    session.negotiated = Some(negotiated);
                    log::info!(
                        "DP: link trained at {} x{} (lane set {:02x?})",
                        negotiated.0,
                        negotiated.1.count(),
                        session.last_lane_set
                    );
                    return Ok(negotiated);
                },
                State::Failed(phase) => return Err(self.fail(session, phase)),
            };
        }
    }

    // =========================================================================
    // State handlers
    // =========================================================================

    fn negotiate(
        &mut self,
        session: &mut TrainingSession,
        initial_rate: LinkRate,
        initial_lanes: LaneCount,
    ) -> Result<State> {
        self.poll_unplug()?;

        let mut raw = [0u8; dpcd::CAPABILITY_LEN];
        self.read(regs::DPCD_REV, &mut raw)?;
        let caps = SinkCapabilities::parse(&raw);
        log::info!(
            "DP: link training start, DPCD {:#04x} rate {:#04x} lanes {:#04x}",
            caps.revision,
            caps.max_link_rate_code,
            raw[regs::MAX_LANE_COUNT as usize]
        );

        let negotiated = negotiate::negotiate(
            &caps,
            initial_rate,
            initial_lanes,
            self.config,
            session.forced(),
        )?;
        session.start(&negotiated, caps.aux_rd_interval);
        Ok(State::PhySetup)
    }

    fn phy_setup(&mut self, session: &mut TrainingSession) -> Result<State> {
        self.poll_unplug()?;
        session.stats.phy_setups += 1;

        let rate = session.link_rate();
        let lanes = session.lane_count();
        let enhanced = session.features().contains(LinkFeatures::ENHANCED_FRAME);

        let reset_needed = !self.platform.is_pipeline_active()
            || self.phy.link_rate() != Some(rate)
            || self.phy.lane_count() != Some(lanes);

        if reset_needed {
            self.phy.reset(true);
            self.phy.set_link_rate(rate);
            self.phy.mode_setting();
            self.phy.set_lane_count(lanes);
            if enhanced {
                self.phy.set_enhanced_framing(true);
            }
            let settle = self.config.phy_reset_settle_us;
            self.platform.sleep_us(settle, settle.saturating_add(1));
            self.phy.reset(false);
            session.stats.phy_resets += 1;
            log::debug!("DP: PHY reset for {} x{}", rate, lanes.count());
        } else {
            log::debug!("DP: PHY already at {} x{}, skipping reset", rate, lanes.count());
        }

        let link_config = dpcd::link_config_bytes(rate, lanes, enhanced);
        self.write(regs::LINK_BW_SET, &link_config)?;

        if let Err(e) = self.phy.wait_pll_lock() {
            log::warn!("DP: {} at {}, continuing", e, rate);
        }
        self.phy.post_init();

        self.phy.set_training_pattern(TrainingPattern::Pattern1);
        self.write(
            regs::TRAINING_PATTERN_SET,
            &[dpcd::training_pattern_set(TrainingPattern::Pattern1)],
        )?;
        session.pattern_written = true;

        Ok(State::ClockRecovery)
    }

    fn clock_recovery_round(&mut self, session: &mut TrainingSession) -> Result<State> {
        self.poll_unplug()?;
        session.stats.cr_rounds += 1;

        self.program_lanes(session)?;
        self.wait_aux_rd_interval(session);

        let mut raw = [0u8; dpcd::LANE_STATUS_LEN];
        self.read(regs::LANE0_1_STATUS, &mut raw)?;
        let status = LaneAlignStatus::from_burst(&raw);
        let lanes = session.lane_count();
        log::debug!("DP: CR done mask {:#x}", status.cr_done_mask());

        if status.clock_recovered(lanes) {
            log::debug!("DP: clock recovery done at {}", session.link_rate());
            return Ok(State::EqualizationSetup);
        }

        if session
            .lanes
            .swing_maxed(lanes, self.config.max_reach_repeats)
        {
            log::info!("DP: voltage swing maxed out on all lanes");
            session.stats.max_swing_fallbacks += 1;
            return Ok(State::ReduceLinkRate(TrainingPhase::ClockRecovery));
        }

        let adjust = self.read_adjust_request()?;
        if adjust.same_swing(session.lanes.drive(), lanes) {
            if session.cr_stalls >= self.config.cr_stall_limit {
                log::info!("DP: sink keeps requesting the same swing");
                session.stats.cr_stall_fallbacks += 1;
                return Ok(State::ReduceLinkRate(TrainingPhase::ClockRecovery));
            }
            session.cr_stalls += 1;
        } else {
            session.cr_stalls = 0;
        }

        session.lanes.adopt(&adjust);
        session.stats.cr_adjustments += 1;
        session.total_retries += 1;
        log::debug!("DP: CR adjust {:02x?}", adjust.to_bytes());

        if session.total_retries >= self.config.total_retry_limit {
            log::warn!(
                "DP: clock recovery retry budget ({}) used up",
                session.total_retries
            );
            session.stats.retry_budget_fallbacks += 1;
            return Ok(State::ReduceLinkRate(TrainingPhase::ClockRecovery));
        }
        Ok(State::ClockRecovery)
    }

    fn equalization_setup(&mut self, session: &mut TrainingSession) -> Result<State> {
        session.stats.eq_setups += 1;
        session.eq_retries = 0;

        let pattern = session.features().equalization_pattern();
        self.phy.set_training_pattern(pattern);
        self.write(
            regs::TRAINING_PATTERN_SET,
            &[dpcd::training_pattern_set(pattern)],
        )?;
        log::debug!("DP: equalization with {:?}", pattern);

        Ok(State::Equalization)
    }

    fn equalization_round(&mut self, session: &mut TrainingSession) -> Result<State> {
        self.poll_unplug()?;
        session.stats.eq_rounds += 1;

        self.program_lanes(session)?;
        self.wait_aux_rd_interval(session);

        let mut raw = [0u8; dpcd::LANE_ALIGN_STATUS_LEN];
        self.read(regs::LANE0_1_STATUS, &mut raw)?;
        let status = LaneAlignStatus::from_burst(&raw);
        let lanes = session.lane_count();
        log::debug!(
            "DP: EQ status cr {:#x} eq {:#x} lock {:#x} align {}",
            status.cr_done_mask(),
            status.eq_done_mask(),
            status.symbol_locked_mask(),
            status.interlane_aligned()
        );

        if !status.clock_recovered(lanes) {
            log::info!("DP: clock recovery lost during equalization");
            return Ok(State::ReduceLinkRate(TrainingPhase::Equalization));
        }

        if status.channel_equalized(lanes) && status.interlane_aligned() {
            self.phy.set_training_pattern(TrainingPattern::Normal);
            self.write(
                regs::TRAINING_PATTERN_SET,
                &[dpcd::training_pattern_set(TrainingPattern::Normal)],
            )?;
            return Ok(State::Success);
        }

        if session.eq_retries >= self.config.eq_retry_limit {
            return Ok(State::Failed(TrainingPhase::Equalization));
        }

        let adjust = self.read_adjust_request()?;
        session.lanes.adopt(&adjust);
        session.stats.eq_adjustments += 1;
        session.eq_retries += 1;
        log::debug!("DP: EQ adjust {:02x?}", adjust.to_bytes());

        Ok(State::Equalization)
    }

    fn reduce_link_rate(&mut self, session: &mut TrainingSession, phase: TrainingPhase) -> State {
        match session.link_rate().lower() {
            Some(lower) => {
                log::info!(
                    "DP: {} failed at {}, retrying at {}",
                    phase,
                    session.link_rate(),
                    lower
                );
                session.stats.fallbacks += 1;
                session.begin_rate(lower);
                State::PhySetup
            },
            None => State::Failed(phase),
        }
    }

    fn fail(&mut self, session: &TrainingSession, phase: TrainingPhase) -> Error {
        self.restore_normal_pattern();
        Error::TrainingExhausted {
            phase,
            link_rate: session.link_rate(),
            lane_count: session.lane_count(),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn poll_unplug(&self) -> Result<()> {
        if self.platform.is_unplugged() {
            Err(Error::LinkUnplugged)
        } else {
            Ok(())
        }
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<()> {
        aux::read(&mut *self.aux, address, buf, self.config.aux_retry_limit)
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<()> {
        aux::write(&mut *self.aux, address, data, self.config.aux_retry_limit)
    }

    fn read_adjust_request(&mut self) -> Result<AdjustRequest> {
        let mut raw = [0u8; dpcd::ADJUST_REQUEST_LEN];
        self.read(regs::ADJUST_REQUEST_LANE0_1, &mut raw)?;
        Ok(AdjustRequest::parse(&raw))
    }

    /// Program the PHY drive and the sink's lane-set registers
    fn program_lanes(&mut self, session: &mut TrainingSession) -> Result<()> {
        self.phy.set_voltage_pre_emphasis(
            &session.lanes.swings(),
            &session.lanes.pre_emphases(),
        );

        let sets = session.lanes.program(self.config.max_reach_repeats);
        let bytes: [u8; MAX_LANES] = sets.map(|set| set.encode());
        session.last_lane_set = bytes;
        log::debug!("DP: lane set {:02x?}", bytes);

        self.write(regs::TRAINING_LANE0_SET, &bytes)
    }

    fn wait_aux_rd_interval(&self, session: &TrainingSession) {
        let us = self.config.aux_rd_interval_us(session.aux_rd_interval());
        self.platform.sleep_us(us, us.saturating_add(1));
    }

    /// Leave the sink receiving normal data; best effort
    fn restore_normal_pattern(&mut self) {
        let normal = dpcd::training_pattern_set(TrainingPattern::Normal);
        if let Err(e) = self.aux.write(regs::TRAINING_PATTERN_SET, &[normal]) {
            log::warn!("DP: could not restore normal pattern: {}", e);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
