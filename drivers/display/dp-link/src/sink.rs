//! # Sink Probe
//!
//! First contact with a freshly connected sink: read its capabilities, wait
//! for it to report a downstream sink and take a first status snapshot.

use helix_dp_core::dpcd::{self, regs, LinkStatus, SinkCapabilities};
use helix_dp_core::{AuxChannel, Error, Platform, Result};

use crate::config::{TrainingConfig, SINK_LATE_POLLS};

/// What the probe learned about the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkInfo {
    /// Receiver capabilities
    pub caps: SinkCapabilities,
    /// Status burst at probe time
    pub status: LinkStatus,
    /// Sink count polls it took
    pub sink_count_polls: u32,
}

/// Probe a connected sink
pub fn probe_sink<A, H>(aux: &mut A, platform: &H, config: &TrainingConfig) -> Result<SinkInfo>
where
    A: AuxChannel + ?Sized,
    H: Platform + ?Sized,
{
    poll_unplug(platform)?;
    let caps = read_capabilities(aux, platform, config)?;

    let mut raw = [0u8; dpcd::STATUS_LEN];
    let polls = wait_for_sink_count(aux, platform, config, &mut raw[0])?;

    // Sink count is already in raw[0]; fetch the rest of the burst.
    crate::aux::read(
        aux,
        regs::DEVICE_SERVICE_IRQ_VECTOR,
        &mut raw[1..],
        config.aux_retry_limit,
    )?;
    log::info!("DP: link status {:02x?}", raw);

    if LinkStatus::is_all_ones(&raw) {
        log::warn!("DP: status burst reads all ones");
        return Err(Error::InvalidStatus);
    }

    Ok(SinkInfo {
        caps,
        status: LinkStatus::parse(&raw),
        sink_count_polls: polls,
    })
}

fn poll_unplug<H: Platform + ?Sized>(platform: &H) -> Result<()> {
    if platform.is_unplugged() {
        Err(Error::LinkUnplugged)
    } else {
        Ok(())
    }
}

/// Capability burst, retried with backoff
fn read_capabilities<A, H>(
    aux: &mut A,
    platform: &H,
    config: &TrainingConfig,
) -> Result<SinkCapabilities>
where
    A: AuxChannel + ?Sized,
    H: Platform + ?Sized,
{
    let mut raw = [0u8; dpcd::CAPABILITY_LEN];
    let mut attempt = 0;
    loop {
        match aux.read(regs::DPCD_REV, &mut raw) {
            Ok(()) => break,
            Err(e) if attempt < config.aux_retry_limit => {
                attempt += 1;
                log::warn!(
                    "DP: capability read failed ({}), retry {}/{}",
                    e,
                    attempt,
                    config.aux_retry_limit
                );
                platform.sleep_ms(config.aux_retry_backoff_ms);
                poll_unplug(platform)?;
            },
            Err(e) => {
                log::error!("DP: capability read failed: {}", e);
                return Err(e.into());
            },
        }
    }
    log::info!("DP: DPCD {:02x?}", &raw[..12]);
    Ok(SinkCapabilities::parse(&raw))
}

/// Poll `SINK_COUNT` until it is non-zero; returns the number of polls
fn wait_for_sink_count<A, H>(
    aux: &mut A,
    platform: &H,
    config: &TrainingConfig,
    sink_count_byte: &mut u8,
) -> Result<u32>
where
    A: AuxChannel + ?Sized,
    H: Platform + ?Sized,
{
    for poll in 0..config.sink_count_polls {
        if poll > 0 {
            poll_unplug(platform)?;
        }
        // A failed read counts as "no sink yet".
        let byte = aux.read_byte(regs::SINK_COUNT).unwrap_or(0);
        if dpcd::sink_count(byte) != 0 {
            *sink_count_byte = byte;
            let polls = poll + 1;
            if polls > 1 {
                log::info!("DP: sink count after {} polls", polls);
            }
            if config.sink_count_polls - poll < SINK_LATE_POLLS {
                platform.sleep_ms(config.sink_settle_ms);
            }
            return Ok(polls);
        }
        platform.sleep_ms(config.sink_count_poll_interval_ms);
    }

    log::error!(
        "DP: sink count still zero after {} polls",
        config.sink_count_polls
    );
    Err(Error::SinkNotReady)
}

// =============================================================================
// TESTS
// =============================================================================
