//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by the orchestrator, the
//! processor loop, the watchdog and the transport server.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] — event classification and payload metadata
//! - [`Bus`] — thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Orchestrator`, `Processor`, `Shared` (start/finish
//!   critical section), `Watchdog`, `Server`.
//! - **Consumers**: the subscriber fan-out listener, and the transport
//!   server (cancel acknowledgements wait for `PetitionFinished`).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
