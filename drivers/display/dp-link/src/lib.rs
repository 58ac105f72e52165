//! # Helix DisplayPort Link Layer
//!
//! Link training and link management for a DisplayPort source.
//!
//! The training engine negotiates a working main link with the sink: it
//! reads the sink's capabilities, programs the PHY, runs the clock recovery
//! and channel equalization loops and steps down the link-rate ladder when a
//! rate will not train.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          DpLink                               │
//! │        (training lock, cached link parameters, HPD IRQ)       │
//! ├──────────────┬──────────────┬───────────────┬─────────────────┤
//! │ LinkTrainer  │    Health    │  Sink probe   │   Compliance    │
//! │  (FSM loop)  │    check     │ (caps, count) │  (test request) │
//! ├──────────────┴──────────────┴───────────────┴─────────────────┤
//! │           TrainingSession  /  negotiation  /  config          │
//! ├───────────────────────────────────────────────────────────────┤
//! │        helix-dp-core: AuxChannel, PhyController, Platform     │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Training State Machine
//!
//! ```text
//! Idle ──► PhySetup ──► ClockRecovery ──► EqualizationSetup ──► Equalization ──► Success
//!             ▲               │                                      │
//!             │               ▼                                      ▼
//!             └──────── ReduceLinkRate ◄─────────── (CR lost) ───────┘
//!                             │
//!                             ▼ (at 1.62 Gbps)
//!                           Failed
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

pub mod compliance;
pub mod config;
pub mod engine;
pub mod health;
pub mod link;
pub mod negotiate;
pub mod session;
pub mod sink;

mod aux;

#[cfg(test)]
mod mock;

pub use compliance::{PhyTestPattern, TestAction};
pub use config::{TrainingConfig, TrainingOverride};
pub use engine::LinkTrainer;
pub use health::check_link_health;
pub use link::{DpLink, IrqOutcome};
pub use negotiate::LinkFeatures;
pub use session::{LaneConfig, TrainingReport, TrainingSession, TrainingStats};
pub use sink::SinkInfo;

pub use helix_dp_core::{Error, LaneCount, LinkRate, Result};
