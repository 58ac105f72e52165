//! # DisplayPort Link
//!
//! Owns the AUX channel and PHY of one DisplayPort source behind the
//! training lock and remembers the parameters of the last trained link.
//!
//! Every operation that touches the sink or the PHY (training, probing, the
//! health check and HPD IRQ servicing) runs with the lock held, so an IRQ
//! arriving mid-training waits for the session to finish.

use core::fmt;

use spin::Mutex;

use helix_dp_core::dpcd::{self, regs, IrqVector, LinkStatus};
use helix_dp_core::{AuxChannel, Error, LaneCount, LinkRate, PhyController, Platform, Result};

use crate::aux;
use crate::compliance::{self, TestAction};
use crate::config::{TrainingConfig, TrainingOverride};
use crate::engine::LinkTrainer;
use crate::health;
use crate::session::{TrainingReport, TrainingSession};
use crate::sink::{self, SinkInfo};

/// Result of servicing an HPD IRQ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqOutcome {
    /// Link is healthy, nothing was done
    Healthy,
    /// Link was degraded and has been retrained
    Retrained {
        /// New link rate
        link_rate: LinkRate,
        /// New lane count
        lane_count: LaneCount,
    },
    /// An automated test request was serviced
    TestRequest(TestAction),
}

/// Hardware and cached state guarded by the training lock
struct LinkInner<A, P> {
    aux: A,
    phy: P,
    negotiated: Option<(LinkRate, LaneCount)>,
    last_report: Option<TrainingReport>,
}

/// A DisplayPort source link
pub struct DpLink<A, P, H> {
    inner: Mutex<LinkInner<A, P>>,
    platform: H,
    config: TrainingConfig,
}

impl<A, P, H> fmt::Debug for DpLink<A, P, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DpLink")
            .field("config", &self.config)
            .field("locked", &self.inner.is_locked())
            .finish_non_exhaustive()
    }
}

impl<A, P, H> DpLink<A, P, H>
where
    A: AuxChannel,
    P: PhyController,
    H: Platform,
{
    /// Create a link over the given hardware
    pub fn new(aux: A, phy: P, platform: H, config: TrainingConfig) -> Self {
        Self {
            inner: Mutex::new(LinkInner {
                aux,
                phy,
                negotiated: None,
                last_report: None,
            }),
            platform,
            config,
        }
    }

    /// Training configuration
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Platform services
    pub fn platform(&self) -> &H {
        &self.platform
    }

    /// Parameters of the currently trained link
    pub fn negotiated(&self) -> Option<(LinkRate, LaneCount)> {
        self.inner.lock().negotiated
    }

    /// Report of the last training session
    pub fn last_report(&self) -> Option<TrainingReport> {
        self.inner.lock().last_report.clone()
    }

    /// Run one training session
    ///
    /// The negotiated pair is cached on success; any error clears the cache.
    pub fn train(
        &self,
        initial_rate: LinkRate,
        initial_lanes: LaneCount,
        forced: TrainingOverride,
    ) -> Result<(LinkRate, LaneCount)> {
        let mut inner = self.inner.lock();
        self.train_locked(&mut inner, initial_rate, initial_lanes, forced)
    }

    /// Probe a freshly connected sink
    pub fn probe_sink(&self) -> Result<SinkInfo> {
        let mut inner = self.inner.lock();
        sink::probe_sink(&mut inner.aux, &self.platform, &self.config)
    }

    /// Check the trained link
    pub fn check_health(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        health::check_link_health(&mut inner.aux, &inner.phy, self.config.aux_retry_limit)
    }

    /// Service an HPD IRQ from the sink
    pub fn service_irq(&self) -> Result<IrqOutcome> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;

        if self.platform.is_unplugged() {
            log::info!("DP: HPD IRQ after unplug");
            inner.negotiated = None;
            return Err(Error::LinkUnplugged);
        }

        let retries = self.config.aux_retry_limit;
        let mut raw = [0u8; dpcd::STATUS_LEN];
        aux::read(&mut inner.aux, regs::SINK_COUNT, &mut raw, retries)?;
        log::debug!("DP: HPD IRQ status {:02x?}", raw);
        if LinkStatus::is_all_ones(&raw) {
            log::warn!("DP: HPD IRQ status reads all ones");
            return Err(Error::InvalidStatus);
        }
        let status = LinkStatus::parse(&raw);

        if status.irq_vector.contains(IrqVector::AUTOMATED_TEST_REQUEST) {
            match compliance::handle_test_request(&mut inner.aux, &mut inner.phy, retries) {
                Ok(TestAction::Retrain(forced)) => {
                    let (rate, lanes) = inner
                        .negotiated
                        .unwrap_or((LinkRate::Hbr3, LaneCount::Four));
                    self.train_locked(inner, rate, lanes, forced)?;
                    return Ok(IrqOutcome::TestRequest(TestAction::Retrain(forced)));
                },
                Ok(action) => return Ok(IrqOutcome::TestRequest(action)),
                // Not ours to run; the link itself may still need attention.
                Err(Error::UnsupportedTestRequest(_)) => {},
                Err(e) => return Err(e),
            }
        }

        match health::check_link_health_with_status(
            &mut inner.aux,
            &inner.phy,
            &status.lanes,
            retries,
        ) {
            Ok(()) => Ok(IrqOutcome::Healthy),
            Err(e) if e.needs_retrain() => {
                let Some((rate, lanes)) = inner.negotiated else {
                    log::warn!("DP: {} with no trained link", e);
                    return Err(e);
                };
                log::info!("DP: retraining after HPD IRQ ({})", e);
                let (link_rate, lane_count) =
                    self.train_locked(inner, rate, lanes, TrainingOverride::NONE)?;
                Ok(IrqOutcome::Retrained {
                    link_rate,
                    lane_count,
                })
            },
            Err(e) => Err(e),
        }
    }

    /// Forget the trained link, e.g. on disconnect
    pub fn invalidate(&self) {
        let mut inner = self.inner.lock();
        if inner.negotiated.take().is_some() {
            log::debug!("DP: cached link parameters dropped");
        }
    }

    /// Run `f` on the hardware with the training lock held
    pub fn with_hardware<R>(&self, f: impl FnOnce(&mut A, &mut P) -> R) -> R {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        f(&mut inner.aux, &mut inner.phy)
    }

    /// Tear down and hand the hardware back
    pub fn into_parts(self) -> (A, P, H) {
        let inner = self.inner.into_inner();
        (inner.aux, inner.phy, self.platform)
    }

    fn train_locked(
        &self,
        inner: &mut LinkInner<A, P>,
        initial_rate: LinkRate,
        initial_lanes: LaneCount,
        forced: TrainingOverride,
    ) -> Result<(LinkRate, LaneCount)> {
        let mut session = TrainingSession::with_override(forced);
        let result = LinkTrainer::new(&mut inner.aux, &mut inner.phy, &self.platform, &self.config)
            .train(&mut session, initial_rate, initial_lanes);

        inner.last_report = Some(session.report());
        inner.negotiated = result.ok();
        result
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::PhyTestPattern;
    use crate::mock::{MockPhy, MockPlatform, MockSink};
    use helix_dp_core::dpcd::TestRequest;
    use helix_dp_core::{HealthFault, TrainingPhase};

    type TestLink = DpLink<MockSink, MockPhy, MockPlatform>;

    fn link(sink: MockSink) -> TestLink {
        DpLink::new(sink, MockPhy::new(), MockPlatform::new(), TrainingConfig::default())
    }

    fn trained_link() -> TestLink {
        let sink = MockSink::new(LinkRate::Hbr2, LaneCount::Four)
            .cr_done_after(1)
            .eq_done_after(1);
        let link = link(sink);
        assert_eq!(
            link.train(LinkRate::Hbr3, LaneCount::Four, TrainingOverride::NONE),
            Ok((LinkRate::Hbr2, LaneCount::Four))
        );
        link
    }

    #[test]
    fn test_train_caches_parameters() {
        let link = trained_link();
        assert_eq!(link.negotiated(), Some((LinkRate::Hbr2, LaneCount::Four)));

        let report = link.last_report().unwrap();
        assert_eq!(report.attempted.as_slice(), [LinkRate::Hbr2]);
        assert_eq!(report.negotiated, Some((LinkRate::Hbr2, LaneCount::Four)));
        assert_eq!(link.check_health(), Ok(()));
    }

    #[test]
    fn test_failed_training_clears_cache() {
        let link = trained_link();
        link.with_hardware(|sink, _| {
            *sink = MockSink::new(LinkRate::Hbr2, LaneCount::Four);
        });

        let result = link.train(LinkRate::Hbr2, LaneCount::Four, TrainingOverride::NONE);
        assert!(matches!(
            result,
            Err(Error::TrainingExhausted {
                phase: TrainingPhase::ClockRecovery,
                ..
            })
        ));
        assert_eq!(link.negotiated(), None);
        assert_eq!(link.last_report().unwrap().stats.fallbacks, 2);
    }

    #[test]
    fn test_irq_healthy_link() {
        let link = trained_link();
        assert_eq!(link.service_irq(), Ok(IrqOutcome::Healthy));
        assert_eq!(link.last_report().unwrap().stats.phy_setups, 1);
    }

    #[test]
    fn test_irq_degraded_link_retrains() {
        let link = trained_link();
        link.with_hardware(|sink, _| sink.force_lane_status_once([0x77, 0x77, 0x80]));

        assert_eq!(
            link.service_irq(),
            Ok(IrqOutcome::Retrained {
                link_rate: LinkRate::Hbr2,
                lane_count: LaneCount::Four,
            })
        );
        assert_eq!(link.negotiated(), Some((LinkRate::Hbr2, LaneCount::Four)));
    }

    #[test]
    fn test_irq_degraded_without_trained_link() {
        let sink = MockSink::new(LinkRate::Hbr2, LaneCount::Four);
        let link = link(sink);
        link.with_hardware(|sink, _| {
            sink.poke(regs::LINK_BW_SET, 0x14);
            sink.poke(regs::LANE_COUNT_SET, 0x84);
        });

        assert_eq!(
            link.service_irq(),
            Err(Error::LinkDegraded(HealthFault::LinkRateMismatch))
        );
    }

    #[test]
    fn test_irq_phy_test_pattern() {
        let link = trained_link();
        link.with_hardware(|sink, _| {
            sink.poke(
                regs::DEVICE_SERVICE_IRQ_VECTOR,
                IrqVector::AUTOMATED_TEST_REQUEST.bits(),
            );
            sink.poke(regs::TEST_REQUEST, TestRequest::PHY_TEST_PATTERN.bits());
            sink.poke(regs::PHY_TEST_PATTERN, 0x01);
        });

        assert_eq!(
            link.service_irq(),
            Ok(IrqOutcome::TestRequest(TestAction::PhyTestPattern(
                PhyTestPattern::D10_2
            )))
        );
    }

    #[test]
    fn test_irq_test_link_training() {
        let link = trained_link();
        link.with_hardware(|sink, _| {
            sink.poke(
                regs::DEVICE_SERVICE_IRQ_VECTOR,
                IrqVector::AUTOMATED_TEST_REQUEST.bits(),
            );
            sink.poke(regs::TEST_REQUEST, TestRequest::LINK_TRAINING.bits());
            sink.poke(regs::TEST_LINK_RATE, 0x06);
            sink.poke(regs::TEST_LANE_COUNT, 0x01);
        });

        let forced = TrainingOverride::forced(LinkRate::Rbr, LaneCount::One);
        assert_eq!(
            link.service_irq(),
            Ok(IrqOutcome::TestRequest(TestAction::Retrain(forced)))
        );
        assert_eq!(link.negotiated(), Some((LinkRate::Rbr, LaneCount::One)));
    }

    #[test]
    fn test_irq_unsupported_test_falls_through_to_health() {
        let link = trained_link();
        link.with_hardware(|sink, _| {
            sink.poke(
                regs::DEVICE_SERVICE_IRQ_VECTOR,
                IrqVector::AUTOMATED_TEST_REQUEST.bits(),
            );
            sink.poke(regs::TEST_REQUEST, TestRequest::EDID_READ.bits());
        });

        assert_eq!(link.service_irq(), Ok(IrqOutcome::Healthy));
        let (sink, _, _) = link.into_parts();
        assert_eq!(sink.written(regs::TEST_RESPONSE), Some(std::vec::Vec::from([0x01])));
    }

    #[test]
    fn test_irq_after_unplug() {
        let link = trained_link();
        link.platform().unplug_flag().set(true);

        assert_eq!(link.service_irq(), Err(Error::LinkUnplugged));
        assert_eq!(link.negotiated(), None);
    }

    #[test]
    fn test_irq_all_ones_status() {
        let link = trained_link();
        link.with_hardware(|sink, _| {
            for addr in regs::SINK_COUNT..=regs::SINK_STATUS {
                sink.poke(addr, 0xFF);
            }
            sink.force_lane_status([0xFF, 0xFF, 0xFF]);
        });

        assert_eq!(link.service_irq(), Err(Error::InvalidStatus));
        assert_eq!(link.negotiated(), Some((LinkRate::Hbr2, LaneCount::Four)));
    }

    #[test]
    fn test_probe_then_invalidate() {
        let link = trained_link();
        let info = link.probe_sink().unwrap();
        assert_eq!(info.caps.max_lanes(), Some(LaneCount::Four));

        link.invalidate();
        assert_eq!(link.negotiated(), None);
    }
}
