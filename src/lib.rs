//! # orchid
//!
//! **Orchid** is a request orchestrator: a long-running service that
//! accepts work requests ("petitions") from authenticated remote clients,
//! orders them by priority subject to admission conditions, executes each
//! admitted petition as an independently supervised OS process, streams
//! progress back to the requesting client, and reports liveness to an
//! external supervisor through a watchdog heartbeat that travels the same
//! scheduling path as user work.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  Client ──Message──► Server (authenticated TCP)
//!                         │ Manager::convert
//!                         ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │ Orchestrator                                                      │
//! │  - Bus (broadcast events) + SubscriberSet (fan-out)               │
//! │  - Shared (registry + running counter + one mutex)                │
//! │  - PetitionQueue (priority, FIFO among equal priorities)          │
//! └──────┬────────────────────────────────────────────────────────────┘
//!        ▼
//!   Processor loop (single consumer)
//!     ├─ pop up to look_ahead pending petitions
//!     ├─ admission re-check under the Shared mutex   ◄── closes the
//!     │    evaluate-then-commit race                     check-then-act gap
//!     ├─ Started   → worker task → separate OS process
//!     ├─ Unmet     → back into the queue (order kept)
//!     └─ sentinel  → drain & exit
//!
//!  Watchdog ──HeartbeatPetition──► same queue ──► same admission path
//!     └─ round trip in deadline → Liveness::notify_alive()
//!        repeated misses / loop faults → notifications stop → external
//!        supervisor restarts the service
//! ```
//!
//! ### Petition lifecycle
//! ```text
//! Pending ──► Enqueued ──► Running ──► Finished
//!                │             │          ▲
//!                ├─► Cancelled ◄┘          │
//!                └─► Broken ───────────────┘
//! ```
//!
//! ## Features
//! | Area            | Description                                             | Key types / traits                      |
//! |-----------------|---------------------------------------------------------|-----------------------------------------|
//! | **Petitions**   | Schedulable, admission-controlled units of work.        | [`Petition`], [`FnPetition`], [`ProcessPetition`] |
//! | **Managers**    | Conversion + lifecycle hooks around user petitions.     | [`Manager`]                             |
//! | **Scheduling**  | Priority order, bounded look-ahead, starvation control. | [`Orchestrator`], [`Config`]            |
//! | **Watchdog**    | Heartbeats through the ordinary path + liveness.        | [`Watchdog`], [`Liveness`]              |
//! | **Transport**   | Authenticated framing, streaming replies, cancellation. | [`Server`], [`Client`], [`Message`]     |
//! | **Subscribers** | Hook into runtime events (logging, metrics, custom).    | [`Subscribe`]                           |
//! | **Errors**      | Typed errors for runtime, petitions and transport.      | [`RuntimeError`], [`PetitionError`]     |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use orchid::{
//!     AuthKey, Config, Manager, Message, Orchestrator, PetitionRef, ProcessPetition, Server,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! struct ShellManager;
//!
//! impl Manager for ShellManager {
//!     fn convert(&self, m: &Message) -> Option<PetitionRef> {
//!         let cmd = m.extras.get("cmd")?.as_str()?.to_string();
//!         Some(
//!             ProcessPetition::new(m.id.clone(), 100, "sh", ["-c".to_string(), cmd])
//!                 .with_process_group()
//!                 .arc(),
//!         )
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = Orchestrator::builder(Config::default(), ShellManager).build();
//!
//!     let server = Server::bind(
//!         "127.0.0.1:50000",
//!         orchestrator.clone(),
//!         AuthKey::new(b"secret".to_vec()),
//!     )
//!     .await?;
//!     tokio::spawn(server.serve(CancellationToken::new()));
//!
//!     orchestrator.run().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod error;
mod manager;
mod petitions;
mod transport;

pub mod events;
pub mod subscribers;

// ---- Public re-exports ----

pub use config::Config;
pub use core::{Orchestrator, OrchestratorBuilder};
pub use error::{PetitionError, RuntimeError, StateError, TransportError};
pub use manager::{
    ChannelLiveness, Liveness, LivenessGate, Manager, Shared, StartOutcome, SystemdNotifier,
    Watchdog, WatchdogConfig, HEARTBEAT_ID,
};
pub use petitions::{
    ActionContext, Counters, FnPetition, FnPetitionBuilder, Petition, PetitionHandle, PetitionId,
    PetitionKind, PetitionRef, PetitionState, Priority, ProcessPetition, Reply, SentinelPetition,
    WorkerPid, SENTINEL_ID,
};
pub use subscribers::Subscribe;
pub use transport::{AuthKey, Client, Message, OutputFrame, PetitionStream, Request, Server};

#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
