//! # Link Health Check
//!
//! Non-looping check of a trained link. It re-reads what the sink believes
//! the link configuration is and, when the sink flags a status change, the
//! per-lane lock state. Any fault means the caller should retrain.

use helix_dp_core::dpcd::{self, regs, LaneAlignStatus};
use helix_dp_core::{AuxChannel, HealthFault, LaneCount, LinkRate, PhyController, Result};

use crate::aux;

/// Read the sink state and check the link
///
/// Only reads; calling it repeatedly against unchanged hardware yields the
/// same answer.
pub fn check_link_health<A, P>(aux: &mut A, phy: &P, aux_retries: u32) -> Result<()>
where
    A: AuxChannel + ?Sized,
    P: PhyController + ?Sized,
{
    let mut status = [0u8; dpcd::LANE_ALIGN_STATUS_LEN];
    aux::read(&mut *aux, regs::LANE0_1_STATUS, &mut status, aux_retries)?;
    check_link_health_with_status(aux, phy, &LaneAlignStatus::from_burst(&status), aux_retries)
}

/// Check the link against lane status that was already read
///
/// Used from the HPD IRQ path, which gets the status bytes as part of the
/// full status burst.
pub fn check_link_health_with_status<A, P>(
    aux: &mut A,
    phy: &P,
    status: &LaneAlignStatus,
    aux_retries: u32,
) -> Result<()>
where
    A: AuxChannel + ?Sized,
    P: PhyController + ?Sized,
{
    let mut programmed = [0u8; 2];
    aux::read(aux, regs::LINK_BW_SET, &mut programmed, aux_retries)?;

    evaluate(programmed, phy.link_rate(), phy.lane_count(), status).map_err(|fault| {
        log::warn!(
            "DP: link unhealthy: {} (sink {:02x?}, align {:?})",
            fault,
            programmed,
            status.align
        );
        fault.into()
    })
}

/// Pure health decision
///
/// `programmed` is `LINK_BW_SET` / `LANE_COUNT_SET` as read from the sink.
pub fn evaluate(
    programmed: [u8; 2],
    phy_rate: Option<LinkRate>,
    phy_lanes: Option<LaneCount>,
    status: &LaneAlignStatus,
) -> core::result::Result<(), HealthFault> {
    match phy_rate {
        Some(rate) if rate.code() == programmed[0] => {},
        _ => return Err(HealthFault::LinkRateMismatch),
    }
    let lanes = match phy_lanes {
        Some(lanes) if lanes.count() == programmed[1] & dpcd::MAX_LANE_COUNT_MASK => lanes,
        _ => return Err(HealthFault::LaneCountMismatch),
    };

    if !status.link_status_updated() {
        return Ok(());
    }

    if !status.interlane_aligned() {
        return Err(HealthFault::InterlaneAlignLost);
    }
    match status.first_unlocked_lane(lanes) {
        Some(lane) => Err(HealthFault::LaneNotLocked(lane)),
        None => Ok(()),
    }
}

// =============================================================================
// TESTS
// =============================================================================
