//! # Petition abstraction.
//!
//! This module defines the [`Petition`] trait — the schedulable unit of
//! work — together with its identifier, priority and kind types.
//!
//! A petition bundles:
//! - a client-supplied [`PetitionId`] (unique among concurrently live
//!   petitions, not across time);
//! - a scheduling [`Priority`] (lower value runs first);
//! - an admission predicate over shared [`Counters`];
//! - an async action that performs the work, usually by spawning a separate
//!   OS process;
//! - a polymorphic `terminate` used on cancellation.
//!
//! ## Rules
//! - Ordering between petitions depends only on `(priority, arrival)`;
//!   equality depends only on `id`. Concrete petition types never leak
//!   their extra fields into comparisons, so different implementations mix
//!   freely inside one queue.
//! - The admission predicate must be a pure function of the [`Counters`]
//!   snapshot it receives: it is re-evaluated under the registry mutex
//!   immediately before resources are committed, and stale petition-local
//!   data would reopen the check-then-act race.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PetitionError;
use crate::petitions::handle::ActionContext;

/// Scheduling priority. Lower values run first.
///
/// [`Priority::MIN`] is reserved for heartbeat petitions and
/// [`Priority::MAX`] for the shutdown sentinel; keep user priorities well
/// inside the range.
pub type Priority = i64;

/// Worker process identifier as recorded in the registry.
pub type WorkerPid = i32;

/// Client-supplied petition identifier: an integer or a string.
///
/// Ids must be unique among concurrently live petitions only; reusing the
/// id of a finished petition is fine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PetitionId {
    /// Numeric identifier.
    Num(i64),
    /// Textual identifier.
    Text(String),
}

impl fmt::Display for PetitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PetitionId::Num(n) => write!(f, "{n}"),
            PetitionId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for PetitionId {
    fn from(n: i64) -> Self {
        PetitionId::Num(n)
    }
}

impl From<&str> for PetitionId {
    fn from(s: &str) -> Self {
        PetitionId::Text(s.to_string())
    }
}

impl From<String> for PetitionId {
    fn from(s: String) -> Self {
        PetitionId::Text(s)
    }
}

/// Explicit petition discriminator.
///
/// Control flow that must treat internal petitions specially (the shared
/// critical section skipping user hooks, the processor recognizing the
/// shutdown sentinel) checks this value — never the concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PetitionKind {
    /// Ordinary client-submitted work.
    User,
    /// Internal watchdog heartbeat; bypasses user manager hooks.
    Heartbeat,
    /// Shutdown sentinel; drains and stops the processor loop.
    Sentinel,
}

/// Snapshot of the shared counters an admission predicate may consult.
///
/// Produced inside the registry mutex, so the values are consistent with
/// the commit that follows a successful check.
#[derive(Debug, Clone, Copy)]
pub struct Counters {
    /// Petitions currently running a worker.
    pub running: usize,
    /// Petitions currently registered (queued or running).
    pub live: usize,
}

/// # Schedulable unit of work.
///
/// Implementations supply identity, priority, the admission predicate, the
/// action and the cancellation behavior. The orchestrator owns lifecycle
/// state and the client channel; actions reach both through the
/// [`ActionContext`] they receive.
///
/// ## Example
/// ```rust
/// use async_trait::async_trait;
/// use orchid::{ActionContext, Counters, Petition, PetitionError, PetitionId, Priority, WorkerPid};
///
/// struct Echo {
///     id: PetitionId,
/// }
///
/// #[async_trait]
/// impl Petition for Echo {
///     fn id(&self) -> &PetitionId { &self.id }
///     fn priority(&self) -> Priority { 50 }
///     fn condition(&self, counters: &Counters) -> bool { counters.running < 4 }
///
///     async fn execute(&self, ctx: ActionContext) -> Result<(), PetitionError> {
///         ctx.line("hello");
///         ctx.done(Some(0));
///         Ok(())
///     }
///
///     fn terminate(&self, _pid: Option<WorkerPid>) -> bool { true }
/// }
/// ```
#[async_trait]
pub trait Petition: Send + Sync + 'static {
    /// Returns the client-supplied identifier.
    fn id(&self) -> &PetitionId;

    /// Returns the scheduling priority (lower runs first).
    fn priority(&self) -> Priority;

    /// Returns the petition discriminator. Defaults to [`PetitionKind::User`].
    fn kind(&self) -> PetitionKind {
        PetitionKind::User
    }

    /// Admission predicate: whether this petition may start now.
    ///
    /// Must depend only on the given snapshot; must not mutate anything.
    fn condition(&self, counters: &Counters) -> bool;

    /// Performs the work once admitted.
    ///
    /// Long-running work belongs in a separate OS process spawned here;
    /// report its pid through [`ActionContext::report_pid`] so cancellation
    /// can reach it. Stream output with [`ActionContext::line`] and deliver
    /// the final status with [`ActionContext::done`].
    async fn execute(&self, ctx: ActionContext) -> Result<(), PetitionError>;

    /// Invoked on cancellation with the recorded worker pid, if any.
    ///
    /// Returns whether termination succeeded. Implementations typically
    /// deliver an OS signal to the pid (or its process group) or run a
    /// custom finalizer.
    fn terminate(&self, pid: Option<WorkerPid>) -> bool;
}

/// Shared reference to a petition.
pub type PetitionRef = Arc<dyn Petition>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_petition_id_display() {
        assert_eq!(PetitionId::from(7).to_string(), "7");
        assert_eq!(PetitionId::from("deploy").to_string(), "deploy");
    }

    #[test]
    fn test_petition_id_json_roundtrip() {
        let num: PetitionId = serde_json::from_str("42").unwrap();
        assert_eq!(num, PetitionId::Num(42));
        let text: PetitionId = serde_json::from_str("\"a\"").unwrap();
        assert_eq!(text, PetitionId::Text("a".into()));
    }
}
