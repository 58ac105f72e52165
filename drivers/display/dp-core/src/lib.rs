//! # Helix DisplayPort Core
//!
//! Foundational types for the DisplayPort source driver.
//!
//! This crate holds everything the link layer needs to talk about a
//! DisplayPort link without touching hardware: the legal link rates and lane
//! counts, per-lane drive settings, the DPCD register map with its bit-exact
//! codecs, and the traits through which the platform injects the AUX channel,
//! the PHY and the hotplug/timing services.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       helix-dp-core                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │   Types     │  │    DPCD     │  │      Traits         │  │
//! │  │ (LinkRate,  │  │ (registers, │  │ (AuxChannel,        │  │
//! │  │  LaneCount) │  │  codecs)    │  │  PhyController)     │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! │                    ┌─────────────┐                          │
//! │                    │    Error    │                          │
//! │                    └─────────────┘                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(any(test, feature = "std"))]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod dpcd;
pub mod error;
pub mod traits;
pub mod types;

// Re-exports for convenience
pub use error::{AuxError, Error, HealthFault, PhyError, Result, TrainingPhase};
pub use traits::{AuxChannel, PhyController, Platform};
pub use types::*;
