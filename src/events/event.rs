//! # Runtime events emitted by the orchestrator, processor and watchdog.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Intake events**: message reception and conversion outcome
//! - **Lifecycle events**: petition scheduling flow (enqueued, starting,
//!   started, finished, cancelled, broken)
//! - **Scheduling events**: admission misses and starvation
//! - **Service events**: watchdog beats, processor faults, shutdown
//!
//! The [`Event`] struct carries additional metadata such as timestamps,
//! petition ids, reasons and worker pids.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order when events are
//! delivered out of order.
//!
//! ## Example
//! ```rust
//! use orchid::events::{Event, EventKind};
//!
//! let ev = Event::now(EventKind::PetitionBroken)
//!     .with_petition("deploy-42")
//!     .with_reason("boom");
//!
//! assert_eq!(ev.kind, EventKind::PetitionBroken);
//! assert_eq!(ev.petition.as_deref(), Some("deploy-42"));
//! assert_eq!(ev.reason.as_deref(), Some("boom"));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `petition` (subscriber name), `reason` (panic info).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `petition` (subscriber name), `reason` ("full" / "closed").
    SubscriberOverflow,

    // === Intake events ===
    /// A wire message was received and handed to the conversion hook.
    ///
    /// Sets: `petition` (message id).
    MessageReceived,

    /// A wire message was dropped without scheduling anything.
    ///
    /// Sets: `petition` (message id), `reason` ("invalid" / "duplicate").
    MessageDropped,

    // === Petition lifecycle events ===
    /// Petition entered the priority queue.
    ///
    /// Sets: `petition`.
    PetitionEnqueued,

    /// Petition passed admission and its start sequence begins.
    ///
    /// Sets: `petition`.
    PetitionStarting,

    /// Petition's worker process reported its pid.
    ///
    /// Sets: `petition`, `pid`.
    PetitionStarted,

    /// Petition reached its terminal state and left the registry.
    ///
    /// Sets: `petition`.
    PetitionFinished,

    /// A cancellation request was received for a petition.
    ///
    /// Sets: `petition`.
    CancelRequested,

    /// Petition moved to the cancelled state.
    ///
    /// Sets: `petition`.
    PetitionCancelled,

    /// Petition failed to start or its action errored.
    ///
    /// Sets: `petition`, `reason`.
    PetitionBroken,

    // === Scheduling events ===
    /// Admission predicate did not hold; petition returned to the queue.
    ///
    /// Sets: `petition`.
    ConditionUnmet,

    /// Petition was re-queued past the starvation threshold; look-ahead
    /// collapses to 1 until it starts.
    ///
    /// Sets: `petition`.
    PetitionStarving,

    // === Service events ===
    /// Watchdog heartbeat completed its round trip within the deadline.
    WatchdogBeat,

    /// Watchdog heartbeat missed its deadline.
    ///
    /// Sets: `reason` (consecutive miss count).
    WatchdogMissed,

    /// Processor loop iteration failed; the loop continues.
    ///
    /// Sets: `reason`.
    ProcessorError,

    /// Shutdown requested (sentinel enqueued or OS signal observed).
    ShutdownRequested,

    /// Processor loop drained and exited.
    ProcessorStopped,

    /// Shutdown grace period exceeded; some petitions were still live.
    GraceExceeded,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Petition id (or subscriber name for subscriber events).
    pub petition: Option<Arc<str>>,
    /// Human-readable reason (errors, drop causes, miss counts).
    pub reason: Option<Arc<str>>,
    /// Worker process id, if applicable.
    pub pid: Option<i32>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// the next global sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            petition: None,
            reason: None,
            pid: None,
        }
    }

    /// Attaches a petition id (or subscriber name).
    #[inline]
    pub fn with_petition(mut self, petition: impl Into<Arc<str>>) -> Self {
        self.petition = Some(petition.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a worker process id.
    #[inline]
    pub fn with_pid(mut self, pid: i32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::now(EventKind::SubscriberOverflow)
            .with_petition(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::now(EventKind::SubscriberPanicked)
            .with_petition(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}
