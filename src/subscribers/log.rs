//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] prints events to stdout in a human-readable format.
//! Enabled via the `logging` feature; intended for development and the
//! bundled demos, not production — implement a custom
//! [`Subscribe`](crate::Subscribe) for structured logging or metrics.
//!
//! ## Output format
//! ```text
//! [received] petition=a
//! [enqueued] petition=a
//! [starting] petition=a
//! [started] petition=a pid=4242
//! [finished] petition=a
//! [condition-unmet] petition=b
//! [watchdog-beat]
//! [shutdown-requested]
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Simple stdout logging subscriber.
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let petition = e.petition.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::MessageReceived => println!("[received] petition={petition}"),
            EventKind::MessageDropped => {
                println!("[dropped] petition={petition} reason={:?}", e.reason)
            }
            EventKind::PetitionEnqueued => println!("[enqueued] petition={petition}"),
            EventKind::PetitionStarting => println!("[starting] petition={petition}"),
            EventKind::PetitionStarted => {
                println!("[started] petition={petition} pid={:?}", e.pid)
            }
            EventKind::PetitionFinished => println!("[finished] petition={petition}"),
            EventKind::CancelRequested => println!("[cancel-requested] petition={petition}"),
            EventKind::PetitionCancelled => println!("[cancelled] petition={petition}"),
            EventKind::PetitionBroken => {
                println!("[broken] petition={petition} reason={:?}", e.reason)
            }
            EventKind::ConditionUnmet => println!("[condition-unmet] petition={petition}"),
            EventKind::PetitionStarving => println!("[starving] petition={petition}"),
            EventKind::WatchdogBeat => println!("[watchdog-beat]"),
            EventKind::WatchdogMissed => println!("[watchdog-missed] misses={:?}", e.reason),
            EventKind::ProcessorError => println!("[processor-error] reason={:?}", e.reason),
            EventKind::ShutdownRequested => println!("[shutdown-requested]"),
            EventKind::ProcessorStopped => println!("[processor-stopped]"),
            EventKind::GraceExceeded => println!("[grace-exceeded]"),
            EventKind::SubscriberPanicked => {
                println!("[subscriber-panicked] name={petition} info={:?}", e.reason)
            }
            EventKind::SubscriberOverflow => {
                println!("[subscriber-overflow] name={petition} reason={:?}", e.reason)
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
