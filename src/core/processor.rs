//! # Processor: the priority-driven scheduling loop.
//!
//! Single consumer of the petition queue. Each round takes up to
//! `look_ahead` pending petitions in priority order, commits the admissible
//! ones through the shared critical section, spawns a supervising worker
//! per admitted petition and returns the rest to the queue unchanged.
//!
//! ## Architecture
//! ```text
//! clients/watchdog ──► PetitionQueue ──► round():
//!                                          ├─ sentinel?   → drain & exit
//!                                          ├─ left queue? → skip (cancel path settled it)
//!                                          ├─ start_petition()
//!                                          │    ├─ Started   → worker::spawn (own OS process)
//!                                          │    ├─ Unhealthy → finish immediately, never runs
//!                                          │    └─ Unmet     → back into the queue, FIFO kept
//!                                          └─ starvation bookkeeping
//!
//! cancel intake ──► handle_cancel():
//!     Running  → mark Cancelled, terminate(recorded pid); worker drives finish
//!     Enqueued → mark Cancelled, finish now, close the stream
//! ```
//!
//! ## Rules
//! - A petition whose predicate fails is **returned, not discarded**; its
//!   original arrival seq keeps relative order among equal priorities.
//! - A petition re-queued past `starvation_threshold` collapses the
//!   effective look-ahead to 1 until it starts — the head cannot be
//!   overtaken forever.
//! - When a full round makes no progress and the queue tail is unchanged,
//!   the loop sleeps a jittered interval instead of spinning.
//! - A panicking round is caught and logged; the loop continues. Past
//!   `fault_threshold` consecutive faults the liveness gate closes so the
//!   external supervisor takes over. The service does not self-kill.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::core::queue::PetitionQueue;
use crate::core::worker;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::manager::{LivenessGate, Shared, StartOutcome};
use crate::petitions::{PetitionHandle, PetitionId, PetitionKind, PetitionState};

/// Outcome of one scheduling round.
struct Round {
    progressed: bool,
    sentinel: bool,
    tail: Option<u64>,
}

pub(crate) struct Processor {
    cfg: Config,
    shared: Arc<Shared>,
    queue: Arc<PetitionQueue>,
    bus: Bus,
    gate: Arc<LivenessGate>,
    cancel_rx: mpsc::UnboundedReceiver<PetitionId>,
    token: CancellationToken,
    worker_token: CancellationToken,
    workers: JoinSet<()>,
    starving: HashSet<PetitionId>,
    faults: u32,
    last_tail: Option<u64>,
}

impl Processor {
    pub(crate) fn new(
        cfg: Config,
        shared: Arc<Shared>,
        queue: Arc<PetitionQueue>,
        bus: Bus,
        gate: Arc<LivenessGate>,
        cancel_rx: mpsc::UnboundedReceiver<PetitionId>,
        token: CancellationToken,
    ) -> Self {
        let worker_token = token.child_token();
        Self {
            cfg,
            shared,
            queue,
            bus,
            gate,
            cancel_rx,
            token,
            worker_token,
            workers: JoinSet::new(),
            starving: HashSet::new(),
            faults: 0,
            last_tail: None,
        }
    }

    /// Runs the loop until the sentinel is dequeued or the token fires,
    /// then drains.
    pub(crate) async fn run(mut self) -> Result<(), RuntimeError> {
        loop {
            let look = self.effective_look_ahead();
            tokio::select! {
                maybe_id = self.cancel_rx.recv() => {
                    match maybe_id {
                        Some(id) => self.handle_cancel(id),
                        None => {
                            // orchestrator gone; nothing left to schedule for
                            break;
                        }
                    }
                }
                batch = self.queue.wait_batch(look, &self.token) => {
                    if batch.is_empty() {
                        // only happens on cancellation
                        break;
                    }
                    if self.process_batch(batch).await {
                        return self.drain().await;
                    }
                }
            }
        }
        self.drain().await
    }

    /// Runs one guarded round. Returns `true` when the sentinel was seen.
    async fn process_batch(&mut self, batch: Vec<PetitionHandle>) -> bool {
        let outcome =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.round(batch)));

        match outcome {
            Ok(round) => {
                self.faults = 0;
                if round.sentinel {
                    return true;
                }
                if !round.progressed && round.tail.is_some() && round.tail == self.last_tail {
                    self.idle_wait().await;
                }
                self.last_tail = round.tail;
                false
            }
            Err(_panic) => {
                warn!("scheduling round panicked; loop continues");
                self.bus.publish(
                    Event::now(EventKind::ProcessorError).with_reason("round_panic"),
                );
                self.faults += 1;
                if self.faults >= self.cfg.fault_threshold {
                    self.gate.suppress();
                }
                false
            }
        }
    }

    /// One scheduling round over an already-popped batch.
    fn round(&mut self, batch: Vec<PetitionHandle>) -> Round {
        let mut progressed = false;
        let mut sentinel = false;
        let mut tail = None;
        let mut unmet: Vec<PetitionHandle> = Vec::new();

        for handle in batch {
            tail = Some(handle.seq());

            if handle.kind() == PetitionKind::Sentinel {
                // sentinel carries Priority::MAX, so nothing follows it
                sentinel = true;
                break;
            }
            if !handle.state().is_enqueued() {
                // cancelled while queued; the cancel path settled it
                debug!(id = %handle.id(), state = %handle.state(), "dropping settled petition");
                continue;
            }

            match self.shared.start_petition(&handle) {
                StartOutcome::Started => {
                    handle.reset_seen();
                    self.unstarve(handle.id());
                    worker::spawn(
                        &mut self.workers,
                        self.shared.clone(),
                        self.bus.clone(),
                        handle,
                        self.worker_token.child_token(),
                    );
                    progressed = true;
                }
                StartOutcome::Unmet => {
                    self.bus.publish(
                        Event::now(EventKind::ConditionUnmet)
                            .with_petition(handle.id().to_string()),
                    );
                    self.shared.manager().condition_failed(&handle);
                    unmet.push(handle);
                }
                StartOutcome::Unhealthy => {
                    self.shared.finish_petition(&handle);
                    handle.reply().done(Some(1));
                    progressed = true;
                }
                StartOutcome::Skipped => {}
            }
        }

        for handle in unmet {
            let seen = handle.bump_seen();
            if seen >= self.cfg.starvation_threshold
                && self.starving.insert(handle.id().clone())
            {
                warn!(id = %handle.id(), seen, "petition is starving; look-ahead collapses to 1");
                self.bus.publish(
                    Event::now(EventKind::PetitionStarving)
                        .with_petition(handle.id().to_string()),
                );
            }
            self.queue.push(handle);
        }

        Round {
            progressed,
            sentinel,
            tail,
        }
    }

    /// Cancellation intake, routed by current lifecycle state.
    fn handle_cancel(&mut self, id: PetitionId) {
        self.bus
            .publish(Event::now(EventKind::CancelRequested).with_petition(id.to_string()));

        let Some(handle) = self.shared.lookup(&id) else {
            debug!(%id, "cancel for unknown or finished petition");
            return;
        };

        match handle.state() {
            PetitionState::Running => {
                if handle.set_state(PetitionState::Cancelled).is_ok() {
                    self.bus.publish(
                        Event::now(EventKind::PetitionCancelled).with_petition(id.to_string()),
                    );
                    if !handle.terminate() {
                        handle
                            .reply()
                            .line(format!("failed to terminate petition {id}"));
                        warn!(%id, "terminate reported failure; waiting for worker exit");
                    }
                    // the worker observes the dead process and drives finish
                }
            }
            PetitionState::Enqueued => {
                if handle.set_state(PetitionState::Cancelled).is_ok() {
                    self.bus.publish(
                        Event::now(EventKind::PetitionCancelled).with_petition(id.to_string()),
                    );
                    handle.terminate();
                    self.shared.finish_petition(&handle);
                    handle.reply().done(None);
                }
            }
            state => {
                debug!(%id, %state, "cancel ignored in this state");
            }
        }
    }

    /// Drains the queue, terminates running workers and waits out the grace
    /// period. Every exit path of the loop funnels through here.
    async fn drain(mut self) -> Result<(), RuntimeError> {
        debug!("processor draining");

        for handle in self.queue.drain() {
            if handle.kind() == PetitionKind::Sentinel {
                continue;
            }
            if handle.state().is_enqueued() {
                if handle.set_state(PetitionState::Cancelled).is_ok() {
                    self.bus.publish(
                        Event::now(EventKind::PetitionCancelled)
                            .with_petition(handle.id().to_string()),
                    );
                }
                self.shared.finish_petition(&handle);
                handle.reply().done(None);
            }
        }

        for handle in self.shared.snapshot_handles() {
            if handle.state().is_running() && handle.set_state(PetitionState::Cancelled).is_ok() {
                self.bus.publish(
                    Event::now(EventKind::PetitionCancelled)
                        .with_petition(handle.id().to_string()),
                );
                handle.terminate();
            }
        }
        self.worker_token.cancel();

        let grace = self.cfg.grace;
        let mut workers = self.workers;
        let all_done = async { while workers.join_next().await.is_some() {} };
        match tokio::time::timeout(grace, all_done).await {
            Ok(()) => {
                self.bus.publish(Event::now(EventKind::ProcessorStopped));
                Ok(())
            }
            Err(_) => {
                self.bus.publish(Event::now(EventKind::GraceExceeded));
                Err(RuntimeError::GraceExceeded {
                    grace,
                    stuck: self.shared.snapshot_ids(),
                })
            }
        }
    }

    fn effective_look_ahead(&self) -> usize {
        if self.starving.is_empty() {
            self.cfg.look_ahead_clamped()
        } else {
            1
        }
    }

    fn unstarve(&mut self, id: &PetitionId) {
        if self.starving.remove(id) {
            debug!(%id, "starving petition started; look-ahead restored");
        }
    }

    /// Jittered pause when a round made no progress on an unchanged queue.
    async fn idle_wait(&self) {
        let (lo, hi) = self.cfg.idle_wait_bounds();
        let lo_ms = lo.as_millis() as u64;
        let hi_ms = (hi.as_millis() as u64).max(lo_ms);
        let wait = Duration::from_millis(rand::thread_rng().gen_range(lo_ms..=hi_ms));
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = self.token.cancelled() => {}
        }
    }
}
