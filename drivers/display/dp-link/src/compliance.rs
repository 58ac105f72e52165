//! # Automated Compliance Tests
//!
//! Handling of the sink's `AUTOMATED_TEST_REQUEST`. Link training and PHY
//! pattern requests are serviced; video, audio and EDID tests belong to
//! other parts of the display stack and are only acknowledged.

use helix_dp_core::dpcd::{self, regs, AdjustRequest, LaneSet, TestRequest};
use helix_dp_core::{AuxChannel, Error, LaneCount, LinkRate, PhyController, Result, MAX_LANES};

use crate::aux;
use crate::config::TrainingOverride;

/// PHY compliance pattern requested through `PHY_TEST_PATTERN`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhyTestPattern {
    /// No pattern, normal scrambled data
    Disabled,
    /// D10.2 without scrambling
    D10_2,
    /// Symbol error rate measurement pattern
    SymbolErrorRate,
    /// PRBS7
    Prbs7,
    /// 80-bit custom pattern
    Custom80Bit,
    /// HBR2 compliance eye pattern
    Hbr2Compliance,
    /// Code this driver does not know
    Unknown(u8),
}

impl PhyTestPattern {
    /// Decode `PHY_TEST_PATTERN`
    pub fn from_code(code: u8) -> Self {
        match code & 0x07 {
            0 => Self::Disabled,
            1 => Self::D10_2,
            2 => Self::SymbolErrorRate,
            3 => Self::Prbs7,
            4 => Self::Custom80Bit,
            5 => Self::Hbr2Compliance,
            _ => Self::Unknown(code),
        }
    }
}

/// What the caller has to do for a serviced test request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestAction {
    /// Retrain with the forced parameters
    Retrain(TrainingOverride),
    /// Drive levels were applied; start transmitting this pattern
    PhyTestPattern(PhyTestPattern),
}

/// Service an automated test request
///
/// The request is always acknowledged first. Requests this driver does not
/// run come back as [`Error::UnsupportedTestRequest`].
pub fn handle_test_request<A, P>(aux: &mut A, phy: &mut P, aux_retries: u32) -> Result<TestAction>
where
    A: AuxChannel + ?Sized,
    P: PhyController + ?Sized,
{
    let mut raw = [0u8; 1];
    aux::read(&mut *aux, regs::TEST_REQUEST, &mut raw, aux_retries)?;
    let request = TestRequest::from_bits_truncate(raw[0]);
    log::info!("DP: automated test request {:#04x}", raw[0]);

    aux::write(&mut *aux, regs::TEST_RESPONSE, &[dpcd::TEST_ACK], aux_retries)?;

    if request.contains(TestRequest::LINK_TRAINING) {
        return link_training_request(aux, aux_retries);
    }
    if request.contains(TestRequest::PHY_TEST_PATTERN) {
        return phy_test_pattern_request(aux, phy, aux_retries);
    }

    log::warn!("DP: unsupported automated test request {:?}", request);
    Err(Error::UnsupportedTestRequest(raw[0]))
}

fn link_training_request<A>(aux: &mut A, aux_retries: u32) -> Result<TestAction>
where
    A: AuxChannel + ?Sized,
{
    let mut rate = [0u8; 1];
    let mut lanes = [0u8; 1];
    aux::read(&mut *aux, regs::TEST_LINK_RATE, &mut rate, aux_retries)?;
    aux::read(&mut *aux, regs::TEST_LANE_COUNT, &mut lanes, aux_retries)?;
    let lane_count = lanes[0] & dpcd::TEST_LANE_COUNT_MASK;
    log::info!(
        "DP: test link training rate {:#04x} lanes {}",
        rate[0],
        lane_count
    );

    let forced = TrainingOverride {
        link_rate: LinkRate::floor_code(rate[0]),
        lane_count: LaneCount::floor_count(lane_count),
    };
    Ok(TestAction::Retrain(forced))
}

fn phy_test_pattern_request<A, P>(aux: &mut A, phy: &mut P, aux_retries: u32) -> Result<TestAction>
where
    A: AuxChannel + ?Sized,
    P: PhyController + ?Sized,
{
    let mut raw = [0u8; dpcd::ADJUST_REQUEST_LEN];
    aux::read(&mut *aux, regs::ADJUST_REQUEST_LANE0_1, &mut raw, aux_retries)?;
    let adjust = AdjustRequest::parse(&raw);

    let swing = adjust.lanes.map(|lane| lane.swing);
    let pre_emphasis = adjust.lanes.map(|lane| lane.pre_emphasis);
    phy.set_voltage_pre_emphasis(&swing, &pre_emphasis);

    let bytes: [u8; MAX_LANES] = adjust.lanes.map(|drive| {
        LaneSet {
            drive,
            ..LaneSet::default()
        }
        .encode()
    });
    log::info!("DP: test lane set {:02x?}", bytes);
    aux::write(&mut *aux, regs::TRAINING_LANE0_SET, &bytes, aux_retries)?;

    let mut code = [0u8; 1];
    aux::read(&mut *aux, regs::PHY_TEST_PATTERN, &mut code, aux_retries)?;
    let pattern = PhyTestPattern::from_code(code[0]);
    if let PhyTestPattern::Unknown(c) = pattern {
        log::warn!("DP: unknown PHY test pattern {:#04x}", c);
    }
    Ok(TestAction::PhyTestPattern(pattern))
}

// =============================================================================
// TESTS
// =============================================================================
