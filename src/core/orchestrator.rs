//! # Orchestrator: facade over the queue, the shared context and the loop.
//!
//! The [`Orchestrator`] owns the event bus, the subscriber fan-out, the
//! petition queue and the shared critical section. It converts submissions,
//! routes cancellations, injects the shutdown sentinel and drives the
//! processor loop until it drains.
//!
//! ## High-level architecture
//! ```text
//! Inputs:
//!   Server / embedder ──► submit(Message, Reply) ──► Manager::convert
//!                                                        │ Some(petition)
//!                                                        ▼
//!                               register (duplicate ids dropped) ──► queue
//!   Watchdog ──► enqueue(HeartbeatPetition) ──────────────► queue
//!   cancel(id) ─────────────────────────────► cancel intake (processor)
//!   shutdown() ──► sentinel (Priority::MAX) ─► queue
//!
//! run():
//!   ├─► subscriber listener: Bus ──► SubscriberSet::emit (fire-and-forget)
//!   ├─► Processor::run() — the scheduling loop
//!   └─► OS signal watch → shutdown() → sentinel → drain within grace
//! ```
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use orchid::{Config, Manager, Message, Orchestrator, PetitionRef, ProcessPetition};
//!
//! struct EchoManager;
//!
//! impl Manager for EchoManager {
//!     fn convert(&self, m: &Message) -> Option<PetitionRef> {
//!         let text = m.extras.get("text")?.as_str()?.to_string();
//!         Some(ProcessPetition::new(m.id.clone(), 100, "echo", [text]).arc())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = Orchestrator::builder(Config::default(), EchoManager).build();
//!     orchestrator.run().await?;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::core::processor::Processor;
use crate::core::queue::PetitionQueue;
use crate::core::shutdown;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::manager::{LivenessGate, Manager, Shared};
use crate::petitions::{
    PetitionHandle, PetitionId, PetitionRef, PetitionState, Reply, SentinelPetition,
};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::transport::Message;

/// Coordinates petition intake, scheduling and graceful shutdown.
pub struct Orchestrator {
    cfg: Config,
    bus: Bus,
    shared: Arc<Shared>,
    queue: Arc<PetitionQueue>,
    subs: Arc<SubscriberSet>,
    gate: Arc<LivenessGate>,
    cancel_tx: mpsc::UnboundedSender<PetitionId>,
    cancel_rx: Mutex<Option<mpsc::UnboundedReceiver<PetitionId>>>,
    token: CancellationToken,
    arrivals: AtomicU64,
}

impl Orchestrator {
    /// Starts building an orchestrator around the given manager.
    pub fn builder(cfg: Config, manager: impl Manager) -> OrchestratorBuilder {
        OrchestratorBuilder {
            cfg,
            manager: Arc::new(manager),
            subscribers: Vec::new(),
        }
    }

    /// Returns the event bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Returns the shared context (registry + counters).
    pub fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Returns the liveness gate consulted by the watchdog.
    pub fn liveness_gate(&self) -> Arc<LivenessGate> {
        self.gate.clone()
    }

    /// Number of petitions currently running a worker.
    pub fn running(&self) -> usize {
        self.shared.running()
    }

    /// Whether a petition with this id is currently live.
    pub fn is_live(&self, id: &PetitionId) -> bool {
        self.shared.is_live(id)
    }

    /// Converts and schedules a wire message.
    ///
    /// Returns the live handle, or `None` when the message was dropped —
    /// either malformed (conversion refused it) or its id collides with a
    /// live petition. Dropping is silent by design: no error frame goes
    /// back, the client only observes the absence of output.
    pub fn submit(&self, message: Message, reply: Reply) -> Option<PetitionHandle> {
        self.bus.publish(
            Event::now(EventKind::MessageReceived).with_petition(message.id.to_string()),
        );

        if self.shared.is_live(&message.id) {
            warn!(id = %message.id, "message with live id received; dropping");
            self.bus.publish(
                Event::now(EventKind::MessageDropped)
                    .with_petition(message.id.to_string())
                    .with_reason("duplicate"),
            );
            return None;
        }

        let Some(petition) = self.shared.manager().convert(&message) else {
            debug!(id = %message.id, "message failed conversion; dropping");
            self.bus.publish(
                Event::now(EventKind::MessageDropped)
                    .with_petition(message.id.to_string())
                    .with_reason("invalid"),
            );
            return None;
        };

        self.enqueue(petition, reply)
    }

    /// Registers and enqueues an already-built petition.
    ///
    /// Used by `submit` and by internal producers (watchdog heartbeats).
    pub fn enqueue(&self, petition: PetitionRef, reply: Reply) -> Option<PetitionHandle> {
        let seq = self.arrivals.fetch_add(1, Ordering::Relaxed);
        let handle = PetitionHandle::new(petition, seq, reply);

        if handle.set_state(PetitionState::Enqueued).is_err() {
            return None;
        }
        if !self.shared.register(&handle) {
            debug!(id = %handle.id(), "petition id already live; dropping");
            self.bus.publish(
                Event::now(EventKind::MessageDropped)
                    .with_petition(handle.id().to_string())
                    .with_reason("duplicate"),
            );
            return None;
        }

        self.queue.push(handle.clone());
        self.bus.publish(
            Event::now(EventKind::PetitionEnqueued).with_petition(handle.id().to_string()),
        );
        Some(handle)
    }

    /// Requests cancellation of a live petition.
    ///
    /// Delivery is asynchronous; the petition's stream is closed once it
    /// reaches `Finished`.
    pub fn cancel(&self, id: PetitionId) {
        let _ = self.cancel_tx.send(id);
    }

    /// Injects the shutdown sentinel: the processor drains and exits.
    pub fn shutdown(&self) {
        self.bus.publish(Event::now(EventKind::ShutdownRequested));
        let seq = self.arrivals.fetch_add(1, Ordering::Relaxed);
        let handle = PetitionHandle::new(SentinelPetition::arc(), seq, Reply::null());
        if handle.set_state(PetitionState::Enqueued).is_ok() {
            self.queue.push(handle);
        }
    }

    /// Runs the processor loop until it drains (sentinel or OS signal).
    ///
    /// Returns [`RuntimeError::AlreadyRunning`] when invoked twice, and
    /// [`RuntimeError::GraceExceeded`] when live petitions outlasted the
    /// configured grace after shutdown.
    pub async fn run(self: &Arc<Self>) -> Result<(), RuntimeError> {
        let cancel_rx = self
            .cancel_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or(RuntimeError::AlreadyRunning)?;

        self.subscriber_listener();

        let processor = Processor::new(
            self.cfg.clone(),
            self.shared.clone(),
            self.queue.clone(),
            self.bus.clone(),
            self.gate.clone(),
            cancel_rx,
            self.token.child_token(),
        );

        let mut loop_task = tokio::spawn(processor.run());
        let result = tokio::select! {
            joined = &mut loop_task => return flatten_join(joined),
            signal = shutdown::wait_for_shutdown_signal() => {
                if let Err(err) = signal {
                    warn!(%err, "signal listener failed; shutting down");
                }
                self.shutdown();
                flatten_join(loop_task.await)
            }
        };
        result
    }

    /// Subscribes to the bus and forwards events to the subscriber set
    /// (fire-and-forget).
    fn subscriber_listener(&self) {
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        let token = self.token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit_arc(Arc::new(ev)),
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
            }
        });
    }
}

fn flatten_join(
    joined: Result<Result<(), RuntimeError>, tokio::task::JoinError>,
) -> Result<(), RuntimeError> {
    match joined {
        Ok(res) => res,
        Err(err) => {
            warn!(%err, "processor task aborted");
            Ok(())
        }
    }
}

/// Builder for constructing an [`Orchestrator`].
pub struct OrchestratorBuilder {
    cfg: Config,
    manager: Arc<dyn Manager>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl OrchestratorBuilder {
    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (petition lifecycle, watchdog,
    /// faults) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the orchestrator. Must be called inside a tokio runtime (the
    /// subscriber workers spawn immediately).
    pub fn build(self) -> Arc<Orchestrator> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        let shared = Shared::new(self.manager, bus.clone());
        let (cancel_tx, cancel_rx) = mpsc::unbounded_channel();

        Arc::new(Orchestrator {
            cfg: self.cfg,
            bus,
            shared,
            queue: Arc::new(PetitionQueue::new()),
            subs,
            gate: Arc::new(LivenessGate::new()),
            cancel_tx,
            cancel_rx: Mutex::new(Some(cancel_rx)),
            token: CancellationToken::new(),
            arrivals: AtomicU64::new(0),
        })
    }
}
