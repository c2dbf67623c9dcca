//! # Event subscribers for the orchid runtime.
//!
//! Provides the [`Subscribe`] trait and the [`SubscriberSet`] fan-out used
//! to deliver runtime events broadcast through the
//! [`Bus`](crate::events::Bus) to user-defined handlers (logging, metrics,
//! alerting).
//!
//! ## Event flow
//! ```text
//! Processor/Shared/Watchdog ── publish(Event) ──► Bus ──► listener
//!                                                           │
//!                                                   SubscriberSet::emit_arc
//!                                                  ┌────────┼────────┐
//!                                                  ▼        ▼        ▼
//!                                               worker1  worker2  workerN
//!                                                  ▼        ▼        ▼
//!                                              sub1.on  sub2.on  subN.on
//!                                               _event()  _event()  _event()
//! ```

mod set;
mod subscriber;

pub use set::SubscriberSet;
pub use subscriber::Subscribe;

#[cfg(feature = "logging")]
mod log;
#[cfg(feature = "logging")]
pub use log::LogWriter;
