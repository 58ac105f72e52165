//! # DisplayPort Driver Traits
//!
//! Capabilities the platform injects into the link layer.
//!
//! ## Trait Map
//!
//! ```text
//! LinkTrainer
//!    │
//!    ├── AuxChannel      (DPCD byte access over the AUX side channel)
//!    │
//!    ├── PhyController   (main-link PHY: rate, lanes, drive, patterns)
//!    │
//!    └── Platform        (unplug flag, sleeps, display pipeline state)
//! ```
//!
//! All calls are blocking. Implementations own their own transaction-level
//! retries (AUX_DEFER handling and the like); the link layer only retries
//! whole transactions.

use crate::error::{AuxError, PhyError};
use crate::types::{DriveLevel, LaneCount, LinkRate, TrainingPattern, MAX_LANES};

// =============================================================================
// AUX CHANNEL
// =============================================================================

/// Byte-addressed DPCD access
pub trait AuxChannel {
    /// Read `buf.len()` bytes starting at `address`
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), AuxError>;

    /// Write `data` starting at `address`
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), AuxError>;

    /// Read a single register
    fn read_byte(&mut self, address: u32) -> Result<u8, AuxError> {
        let mut byte = [0u8; 1];
        self.read(address, &mut byte)?;
        Ok(byte[0])
    }

    /// Write a single register
    fn write_byte(&mut self, address: u32, value: u8) -> Result<(), AuxError> {
        self.write(address, &[value])
    }
}

// =============================================================================
// PHY CONTROLLER
// =============================================================================

/// Main-link PHY control
///
/// The reset sequence the link layer issues is: `reset(true)`, link rate,
/// `mode_setting`, lane count, enhanced framing, settle, `reset(false)`,
/// `wait_pll_lock`, `post_init`.
pub trait PhyController {
    /// Assert or release the PHY reset
    fn reset(&mut self, assert: bool);

    /// Program the main-link rate
    fn set_link_rate(&mut self, rate: LinkRate);

    /// Program the number of active lanes
    fn set_lane_count(&mut self, lanes: LaneCount);

    /// Enable or disable enhanced framing
    fn set_enhanced_framing(&mut self, enable: bool);

    /// Apply mode-dependent analog settings for the programmed rate
    fn mode_setting(&mut self);

    /// Finish initialization once the PLL is locked
    fn post_init(&mut self);

    /// Wait for the link PLL to lock
    fn wait_pll_lock(&mut self) -> Result<(), PhyError>;

    /// Program voltage swing and pre-emphasis for all four lanes
    fn set_voltage_pre_emphasis(
        &mut self,
        swing: &[DriveLevel; MAX_LANES],
        pre_emphasis: &[DriveLevel; MAX_LANES],
    );

    /// Start transmitting a training pattern
    fn set_training_pattern(&mut self, pattern: TrainingPattern);

    /// Link rate currently programmed, if the PHY is configured
    fn link_rate(&self) -> Option<LinkRate>;

    /// Lane count currently programmed, if the PHY is configured
    fn lane_count(&self) -> Option<LaneCount>;
}

// =============================================================================
// PLATFORM SERVICES
// =============================================================================

/// Hotplug state, timing and pipeline queries
pub trait Platform {
    /// Whether the sink has been unplugged
    ///
    /// Polled, never waited on. The flag is owned by the hotplug handler.
    fn is_unplugged(&self) -> bool;

    /// Sleep at least `min_us`, at most about `max_us`
    fn sleep_us(&self, min_us: u32, max_us: u32);

    /// Sleep for `ms` milliseconds
    fn sleep_ms(&self, ms: u32) {
        let us = ms.saturating_mul(1000);
        self.sleep_us(us, us.saturating_add(1000));
    }

    /// Whether the display pipeline feeding the PHY is running
    ///
    /// An inactive pipeline forces a PHY reset before training.
    fn is_pipeline_active(&self) -> bool;
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct Registers {
        mem: [u8; 8],
    }

    impl AuxChannel for Registers {
        fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), AuxError> {
            let start = address as usize;
            let src = self.mem.get(start..start + buf.len()).ok_or(AuxError::Nack)?;
            buf.copy_from_slice(src);
            Ok(())
        }

        fn write(&mut self, address: u32, data: &[u8]) -> Result<(), AuxError> {
            let start = address as usize;
            let dst = self
                .mem
                .get_mut(start..start + data.len())
                .ok_or(AuxError::Nack)?;
            dst.copy_from_slice(data);
            Ok(())
        }
    }

    struct Clock {
        slept: Cell<(u32, u32)>,
    }

    impl Platform for Clock {
        fn is_unplugged(&self) -> bool {
            false
        }

        fn sleep_us(&self, min_us: u32, max_us: u32) {
            self.slept.set((min_us, max_us));
        }

        fn is_pipeline_active(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_byte_helpers() {
        let mut regs = Registers { mem: [0; 8] };
        regs.write_byte(3, 0xA5).unwrap();
        assert_eq!(regs.read_byte(3).unwrap(), 0xA5);
        assert_eq!(regs.read_byte(8), Err(AuxError::Nack));
    }

    #[test]
    fn test_sleep_ms_range() {
        let clock = Clock {
            slept: Cell::new((0, 0)),
        };
        clock.sleep_ms(50);
        assert_eq!(clock.slept.get(), (50_000, 51_000));
    }
}
