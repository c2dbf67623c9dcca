//! # Manager trait — the application-facing extension point.
//!
//! A [`Manager`] supplies the conversion hook that turns wire
//! [`Message`]s into petitions, plus the `on_start`/`on_finish` hooks the
//! orchestrator invokes around every user petition.
//!
//! ## Rules
//! - `on_start` and `on_finish` run **inside the shared critical section**
//!   (the same mutex that re-checks the admission predicate and updates the
//!   running counter). Keep them minimal and never panic: every other
//!   petition waits while they run.
//! - Heartbeat petitions never reach these hooks; the orchestrator filters
//!   them by [`PetitionKind`](crate::PetitionKind) before dispatching.
//! - `convert` returning `None` silently drops the message: nothing is
//!   scheduled and no error is surfaced to the client beyond the absence of
//!   output.

use crate::petitions::{PetitionHandle, PetitionRef};
use crate::transport::Message;

/// Application hooks around petition conversion and lifecycle.
///
/// ## Example
/// ```rust
/// use orchid::{Manager, Message, PetitionHandle, PetitionRef, ProcessPetition};
///
/// struct SleepManager;
///
/// impl Manager for SleepManager {
///     fn convert(&self, message: &Message) -> Option<PetitionRef> {
///         let secs = message.extras.get("seconds")?.as_u64()?;
///         Some(
///             ProcessPetition::new(message.id.clone(), 100, "sleep", [secs.to_string()])
///                 .arc(),
///         )
///     }
///
///     fn on_start(&self, petition: &PetitionHandle) -> bool {
///         println!("starting {}", petition.id());
///         true
///     }
/// }
/// ```
pub trait Manager: Send + Sync + 'static {
    /// Maps a wire message into a concrete petition.
    ///
    /// Returns `None` for malformed input (missing or mistyped `extras`
    /// keys); the message is dropped without scheduling anything.
    fn convert(&self, message: &Message) -> Option<PetitionRef>;

    /// Invoked when a petition passed admission, immediately after the
    /// running counter was committed.
    ///
    /// A `false` return is an unhealthy start: the petition never runs,
    /// `on_finish` is invoked immediately and no process is left behind.
    fn on_start(&self, petition: &PetitionHandle) -> bool {
        let _ = petition;
        true
    }

    /// Invoked exactly once when a previously started petition finishes
    /// (normally, cancelled or broken).
    fn on_finish(&self, petition: &PetitionHandle) {
        let _ = petition;
    }

    /// Invoked when a petition's admission predicate did not hold during a
    /// scheduling round. Useful for reporting; the petition stays queued.
    fn condition_failed(&self, petition: &PetitionHandle) {
        let _ = petition;
    }
}
