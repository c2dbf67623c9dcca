//! # Event subscriber trait.
//!
//! Provides [`Subscribe`] — an extension point for plugging custom event
//! handlers into the runtime.
//!
//! Each subscriber gets:
//! - **Dedicated worker task** (runs independently)
//! - **Per-subscriber bounded queue** (capacity via [`Subscribe::queue_capacity`])
//! - **Panic isolation** (panics are caught and reported as
//!   `EventKind::SubscriberPanicked`)
//!
//! ## Rules
//! - A slow subscriber only affects its own queue.
//! - Queue overflow drops the event **for this subscriber only** and
//!   publishes `EventKind::SubscriberOverflow`; other subscribers are
//!   unaffected.
//! - Events are processed sequentially (FIFO) per subscriber.
//! - Subscribers do not block publishers or each other.

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber for runtime observability.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
/// - Slow processing affects only this subscriber's queue.
///
/// ## Example
/// ```rust
/// use async_trait::async_trait;
/// use orchid::{Subscribe, events::{Event, EventKind}};
///
/// struct FailureCounter;
///
/// #[async_trait]
/// impl Subscribe for FailureCounter {
///     async fn on_event(&self, ev: &Event) {
///         if matches!(ev.kind, EventKind::PetitionBroken) {
///             // export a metric, page someone, ...
///         }
///     }
///
///     fn name(&self) -> &'static str { "failure-counter" }
/// }
/// ```
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event.
    ///
    /// Called from a dedicated worker task, not in the publisher context.
    /// Events are delivered in FIFO order per subscriber.
    async fn on_event(&self, event: &Event);

    /// Returns the subscriber name used in overflow/panic events.
    ///
    /// Prefer short, descriptive names (e.g., "metrics", "audit").
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity for this subscriber.
    ///
    /// The runtime clamps capacity to a minimum of 1. Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
