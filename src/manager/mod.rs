//! # Manager layer: hooks, shared critical section, watchdog and liveness.
//!
//! Contents:
//! - [`Manager`] — application extension point (conversion + lifecycle hooks)
//! - [`Shared`], [`StartOutcome`] — registry, running counter and the single
//!   mutex spanning predicate re-check, counter update and hook dispatch
//! - [`Watchdog`], [`WatchdogConfig`], [`HeartbeatPetition`] — heartbeat
//!   petitions flowing through the ordinary scheduling path
//! - [`Liveness`], [`LivenessGate`], [`SystemdNotifier`], [`ChannelLiveness`]
//!   — "I am alive" reporting to an external supervisor

mod liveness;
mod manager;
mod shared;
mod watchdog;

pub use liveness::{ChannelLiveness, Liveness, LivenessGate, SystemdNotifier};
pub use manager::Manager;
pub use shared::{Shared, StartOutcome};
pub use watchdog::{HeartbeatPetition, Watchdog, WatchdogConfig, HEARTBEAT_ID};
