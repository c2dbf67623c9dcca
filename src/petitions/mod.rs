//! # Petition abstractions and implementations.
//!
//! This module provides the core petition-related types:
//! - [`Petition`] — trait for schedulable, admission-controlled work
//! - [`PetitionId`], [`Priority`], [`PetitionKind`], [`Counters`] — the
//!   identity/ordering/admission vocabulary
//! - [`PetitionState`], [`StateCell`] — the lifecycle state machine
//! - [`PetitionHandle`], [`ActionContext`], [`Reply`] — orchestrator-side
//!   bookkeeping and the action-facing surface
//! - [`FnPetition`] — closure-backed petition for embedding and tests
//! - [`ProcessPetition`] — petition running a command as a separate OS
//!   process with signal-based cancellation
//! - [`SentinelPetition`] — the cooperative-shutdown marker

mod func;
mod handle;
mod petition;
mod process;
mod reserved;
mod state;

pub use func::{FnPetition, FnPetitionBuilder};
pub use handle::{ActionContext, PetitionHandle, Reply};
pub use petition::{Counters, Petition, PetitionId, PetitionKind, PetitionRef, Priority, WorkerPid};
pub use process::ProcessPetition;
pub use reserved::{SentinelPetition, SENTINEL_ID};
pub use state::{PetitionState, StateCell};
