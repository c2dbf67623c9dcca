//! # Petition lifecycle state machine.
//!
//! [`PetitionState`] models the scheduling lifecycle and [`StateCell`]
//! enforces its transition table:
//!
//! ```text
//! Pending ──► Enqueued ──► Running ──► Finished
//!                │             │          ▲
//!                ├─► Cancelled ◄┘          │
//!                │        └────────────────┤
//!                └─► Broken ───────────────┘
//! ```
//!
//! ## Rules
//! - `Cancelled` is reachable from `Enqueued` (never started) and from
//!   `Running` (worker asked to terminate); both resolve to `Finished` once
//!   cleanup completes.
//! - `Broken` marks conversion/start/action failures and also resolves to
//!   `Finished` — a degraded petition is never left dangling.
//! - Invalid transitions return [`StateError`] and leave the state
//!   unchanged; they are logged, never applied.

use std::fmt;
use std::sync::Mutex;

use crate::error::StateError;

/// Scheduling lifecycle of a petition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PetitionState {
    /// Just created, not visible to the processor yet.
    Pending,
    /// Waiting in the priority queue for admission.
    Enqueued,
    /// Admitted; worker process is running.
    Running,
    /// Cancellation requested; cleanup in progress.
    Cancelled,
    /// Failed to start or errored while running; cleanup in progress.
    Broken,
    /// Terminal. The petition left the registry and its channel is closed.
    Finished,
}

impl PetitionState {
    /// Whether the petition is waiting in the queue.
    #[inline]
    pub fn is_enqueued(self) -> bool {
        matches!(self, PetitionState::Enqueued)
    }

    /// Whether the petition's worker is running.
    #[inline]
    pub fn is_running(self) -> bool {
        matches!(self, PetitionState::Running)
    }

    /// Whether the petition reached its terminal state.
    #[inline]
    pub fn is_finished(self) -> bool {
        matches!(self, PetitionState::Finished)
    }

    /// Whether the petition was cancelled and awaits cleanup.
    #[inline]
    pub fn is_cancelled(self) -> bool {
        matches!(self, PetitionState::Cancelled)
    }

    /// Whether the petition is broken and awaits cleanup.
    #[inline]
    pub fn is_broken(self) -> bool {
        matches!(self, PetitionState::Broken)
    }

    /// Whether the transition `self → next` is allowed.
    pub fn can_move_to(self, next: PetitionState) -> bool {
        use PetitionState::*;
        matches!(
            (self, next),
            (Pending, Enqueued)
                | (Pending, Broken)
                | (Enqueued, Running)
                | (Enqueued, Cancelled)
                | (Enqueued, Broken)
                | (Running, Finished)
                | (Running, Cancelled)
                | (Running, Broken)
                | (Cancelled, Finished)
                | (Cancelled, Broken)
                | (Broken, Finished)
        )
    }
}

impl fmt::Display for PetitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PetitionState::Pending => "pending",
            PetitionState::Enqueued => "enqueued",
            PetitionState::Running => "running",
            PetitionState::Cancelled => "cancelled",
            PetitionState::Broken => "broken",
            PetitionState::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Thread-safe holder of one petition's lifecycle state.
///
/// The cell validates every movement against the transition table. Setting
/// the current state again is a no-op returning `Ok`.
#[derive(Debug)]
pub struct StateCell {
    state: Mutex<PetitionState>,
}

impl StateCell {
    /// Creates a cell in [`PetitionState::Pending`].
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PetitionState::Pending),
        }
    }

    /// Returns the current state.
    pub fn get(&self) -> PetitionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Moves to `next`, validating against the transition table.
    ///
    /// Returns the previous state on success. Re-setting the current state
    /// is accepted and reported as that same state.
    pub fn set(&self, next: PetitionState) -> Result<PetitionState, StateError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let current = *state;
        if current == next {
            return Ok(current);
        }
        if !current.can_move_to(next) {
            return Err(StateError {
                from: current,
                to: next,
            });
        }
        *state = next;
        Ok(current)
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), PetitionState::Pending);
        cell.set(PetitionState::Enqueued).unwrap();
        cell.set(PetitionState::Running).unwrap();
        cell.set(PetitionState::Finished).unwrap();
        assert!(cell.get().is_finished());
    }

    #[test]
    fn test_cancel_from_enqueued_resolves_to_finished() {
        let cell = StateCell::new();
        cell.set(PetitionState::Enqueued).unwrap();
        cell.set(PetitionState::Cancelled).unwrap();
        cell.set(PetitionState::Finished).unwrap();
        assert!(cell.get().is_finished());
    }

    #[test]
    fn test_cancel_from_running_resolves_to_finished() {
        let cell = StateCell::new();
        cell.set(PetitionState::Enqueued).unwrap();
        cell.set(PetitionState::Running).unwrap();
        cell.set(PetitionState::Cancelled).unwrap();
        cell.set(PetitionState::Finished).unwrap();
        assert!(cell.get().is_finished());
    }

    #[test]
    fn test_finished_is_terminal() {
        let cell = StateCell::new();
        cell.set(PetitionState::Enqueued).unwrap();
        cell.set(PetitionState::Running).unwrap();
        cell.set(PetitionState::Finished).unwrap();
        let err = cell.set(PetitionState::Running).unwrap_err();
        assert_eq!(err.from, PetitionState::Finished);
        assert_eq!(err.to, PetitionState::Running);
        // state unchanged after a rejected move
        assert!(cell.get().is_finished());
    }

    #[test]
    fn test_pending_cannot_run_directly() {
        let cell = StateCell::new();
        assert!(cell.set(PetitionState::Running).is_err());
    }

    #[test]
    fn test_setting_current_state_is_noop() {
        let cell = StateCell::new();
        cell.set(PetitionState::Enqueued).unwrap();
        assert_eq!(
            cell.set(PetitionState::Enqueued).unwrap(),
            PetitionState::Enqueued
        );
    }
}
