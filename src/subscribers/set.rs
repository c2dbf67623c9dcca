//! # Non-blocking event fan-out to multiple subscribers.
//!
//! Provides [`SubscriberSet`] — distributes events to multiple subscribers
//! concurrently without blocking the publisher.
//!
//! ## Architecture
//! ```text
//! emit(event)
//!     │
//!     ├──► [queue 1] ──► worker 1 ──► subscriber1.on_event()
//!     │    (bounded)         └──────► panic → SubscriberPanicked
//!     ├──► [queue 2] ──► worker 2 ──► subscriber2.on_event()
//!     └──► [queue N] ──► worker N ──► subscriberN.on_event()
//! ```
//!
//! ## Rules
//! - **No cross-subscriber ordering**: subscriber A may process event N
//!   while B processes N+5.
//! - **Overflow**: event dropped for that subscriber only,
//!   `SubscriberOverflow` published.
//! - **Non-blocking**: `emit_arc()` returns immediately (uses `try_send`).
//! - **Per-subscriber FIFO**: each subscriber sees events in order.

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{Bus, Event};
use crate::subscribers::Subscribe;

/// Per-subscriber channel metadata.
struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Fan-out coordinator for multiple event subscribers.
pub struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    #[allow(dead_code)]
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Creates a new set and spawns one worker task per subscriber.
    ///
    /// ### Per-subscriber setup
    /// - Bounded mpsc queue (capacity from [`Subscribe::queue_capacity`],
    ///   minimum 1)
    /// - Dedicated worker task (runs until the queue closes)
    /// - Panic isolation via `catch_unwind`
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let cap = sub.queue_capacity().max(1);
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);
            let s = Arc::clone(&sub);
            let bus_for_worker = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = s.on_event(ev.as_ref());
                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await
                    {
                        let info = {
                            let any = &*panic_err;
                            if let Some(msg) = any.downcast_ref::<&'static str>() {
                                (*msg).to_string()
                            } else if let Some(msg) = any.downcast_ref::<String>() {
                                msg.clone()
                            } else {
                                "unknown panic".to_string()
                            }
                        };
                        bus_for_worker.publish(Event::subscriber_panicked(s.name(), info));
                    }
                }
            });
            channels.push(SubscriberChannel { name, sender: tx });
            workers.push(handle);
        }
        Self {
            channels,
            workers,
            bus,
        }
    }

    /// Emits a pre-allocated `Arc<Event>` to all subscribers.
    ///
    /// - Uses `try_send` (non-blocking).
    /// - On queue full: drops the event for that subscriber, publishes
    ///   `SubscriberOverflow`.
    /// - Overflow events themselves are never re-published on overflow, so
    ///   a saturated subscriber cannot loop.
    pub fn emit_arc(&self, event: Arc<Event>) {
        let is_overflow_evt = event.is_subscriber_overflow();

        for channel in &self.channels {
            match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    if !is_overflow_evt {
                        self.bus
                            .publish(Event::subscriber_overflow(channel.name, "full"));
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    if !is_overflow_evt {
                        self.bus
                            .publish(Event::subscriber_overflow(channel.name, "closed"));
                    }
                }
            }
        }
    }
}
