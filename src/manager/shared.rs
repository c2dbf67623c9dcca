//! # Shared context: registry, running counter and the start/finish
//! critical section.
//!
//! [`Shared`] owns the only state the processor and the manager hooks
//! exchange: the registry of live petitions and the `running` counter. One
//! mutex spans the admission re-check, the counter update, the state
//! transition and the hook invocation — this single critical section is
//! what closes the check-then-act race between evaluating a predicate and
//! committing resources.
//!
//! ## Rules
//! - The predicate consulted during queue scanning is advisory; the
//!   authoritative evaluation happens here, under the lock, immediately
//!   before `running` is incremented.
//! - `finish_petition` is idempotent: a second call for the same petition
//!   is a no-op returning `false`.
//! - `on_start`/`on_finish` only ever see [`PetitionKind::User`] petitions;
//!   heartbeats and the sentinel are filtered by discriminator.
//! - Nothing `await`s inside the critical section.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::events::{Bus, Event, EventKind};
use crate::manager::Manager;
use crate::petitions::{Counters, PetitionHandle, PetitionId, PetitionKind, PetitionState};

/// Outcome of an admission commit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Predicate held; resources committed; worker may spawn.
    Started,
    /// Predicate did not hold; petition stays enqueued.
    Unmet,
    /// `on_start` reported an unhealthy start; caller must finish the
    /// petition immediately without running it.
    Unhealthy,
    /// Petition already left the `Enqueued` state (cancelled while queued);
    /// nothing was committed.
    Skipped,
}

struct Inner {
    registry: HashMap<PetitionId, PetitionHandle>,
    running: usize,
}

/// Registry + counter + hook dispatch behind one mutex.
pub struct Shared {
    inner: Mutex<Inner>,
    manager: Arc<dyn Manager>,
    bus: Bus,
}

impl Shared {
    /// Creates the shared context.
    pub fn new(manager: Arc<dyn Manager>, bus: Bus) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                registry: HashMap::new(),
                running: 0,
            }),
            manager,
            bus,
        })
    }

    /// Returns the application manager.
    pub fn manager(&self) -> &Arc<dyn Manager> {
        &self.manager
    }

    /// Number of petitions currently running a worker.
    pub fn running(&self) -> usize {
        self.lock().running
    }

    /// Number of live petitions (queued or running).
    pub fn live(&self) -> usize {
        self.lock().registry.len()
    }

    /// Snapshot of the shared counters.
    pub fn counters(&self) -> Counters {
        let inner = self.lock();
        Counters {
            running: inner.running,
            live: inner.registry.len(),
        }
    }

    /// Looks up a live petition by id.
    pub fn lookup(&self, id: &PetitionId) -> Option<PetitionHandle> {
        self.lock().registry.get(id).cloned()
    }

    /// Whether a petition with this id is currently live.
    pub fn is_live(&self, id: &PetitionId) -> bool {
        self.lock().registry.contains_key(id)
    }

    /// Identifiers of all live petitions, sorted for stable output.
    pub fn snapshot_ids(&self) -> Vec<String> {
        let inner = self.lock();
        let mut ids: Vec<String> = inner.registry.keys().map(|id| id.to_string()).collect();
        ids.sort_unstable();
        ids
    }

    /// Handles of all live petitions.
    pub fn snapshot_handles(&self) -> Vec<PetitionHandle> {
        self.lock().registry.values().cloned().collect()
    }

    /// Registers a freshly converted petition.
    ///
    /// Returns `false` when another live petition already uses the id; the
    /// caller drops the newcomer.
    pub fn register(&self, handle: &PetitionHandle) -> bool {
        let mut inner = self.lock();
        if inner.registry.contains_key(handle.id()) {
            return false;
        }
        inner.registry.insert(handle.id().clone(), handle.clone());
        true
    }

    /// Commits admission for an enqueued petition.
    ///
    /// Re-evaluates the predicate under the lock, updates the counter,
    /// moves the state to `Running` and dispatches `on_start`. The
    /// predicate check and the commit are indivisible: no other start or
    /// finish can interleave.
    pub fn start_petition(&self, handle: &PetitionHandle) -> StartOutcome {
        let mut inner = self.lock();

        if !handle.state().is_enqueued() {
            return StartOutcome::Skipped;
        }

        let counters = Counters {
            running: inner.running,
            live: inner.registry.len(),
        };
        if !handle.condition(&counters) {
            return StartOutcome::Unmet;
        }

        if let Err(err) = handle.set_state(PetitionState::Running) {
            warn!(id = %handle.id(), %err, "admission commit rejected by state machine");
            return StartOutcome::Skipped;
        }
        handle.mark_counted();
        inner.running += 1;
        self.bus.publish(
            Event::now(EventKind::PetitionStarting).with_petition(handle.id().to_string()),
        );

        let healthy = match handle.kind() {
            PetitionKind::User => self.manager.on_start(handle),
            PetitionKind::Heartbeat | PetitionKind::Sentinel => true,
        };

        if !healthy {
            if let Err(err) = handle.set_state(PetitionState::Broken) {
                warn!(id = %handle.id(), %err, "could not mark unhealthy start as broken");
            }
            self.bus.publish(
                Event::now(EventKind::PetitionBroken)
                    .with_petition(handle.id().to_string())
                    .with_reason("unhealthy_start"),
            );
            return StartOutcome::Unhealthy;
        }

        StartOutcome::Started
    }

    /// Finishes a petition: removes it from the registry, settles the
    /// counter and resolves its state to `Finished`.
    ///
    /// Returns `true` iff the petition existed **and** had been started —
    /// the idempotency guard required of `on_finish`. The user hook runs
    /// only in that case.
    pub fn finish_petition(&self, handle: &PetitionHandle) -> bool {
        let mut inner = self.lock();

        let existed = inner.registry.remove(handle.id()).is_some();
        let was_started = handle.take_counted();
        if was_started {
            inner.running -= 1;
        }

        self.resolve_to_finished(handle);

        if existed && was_started && handle.kind() == PetitionKind::User {
            self.manager.on_finish(handle);
        }
        if existed {
            // cancel acknowledgements key off this event, so it fires for
            // never-started petitions too
            self.bus.publish(
                Event::now(EventKind::PetitionFinished).with_petition(handle.id().to_string()),
            );
        }
        existed && was_started
    }

    /// Drives whatever state the petition is in down to `Finished`.
    fn resolve_to_finished(&self, handle: &PetitionHandle) {
        match handle.state() {
            PetitionState::Enqueued => {
                // never started: cancelled on its way out
                let _ = handle.set_state(PetitionState::Cancelled);
                self.settle(handle, PetitionState::Finished);
            }
            PetitionState::Running
            | PetitionState::Cancelled
            | PetitionState::Broken => {
                self.settle(handle, PetitionState::Finished);
            }
            PetitionState::Pending | PetitionState::Finished => {}
        }
    }

    fn settle(&self, handle: &PetitionHandle, next: PetitionState) {
        if let Err(err) = handle.set_state(next) {
            warn!(id = %handle.id(), %err, "could not settle petition state");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::petitions::{FnPetition, Reply};

    struct NoopManager;
    impl Manager for NoopManager {
        fn convert(&self, _m: &crate::transport::Message) -> Option<crate::PetitionRef> {
            None
        }
    }

    fn enqueued_handle(id: &str, priority: i64) -> PetitionHandle {
        let petition = FnPetition::builder(id, priority).arc();
        let handle = PetitionHandle::new(petition, 0, Reply::null());
        handle.set_state(PetitionState::Enqueued).unwrap();
        handle
    }

    fn shared() -> Arc<Shared> {
        Shared::new(Arc::new(NoopManager), Bus::new(16))
    }

    #[test]
    fn test_counter_increments_once_per_start() {
        let shared = shared();
        let handle = enqueued_handle("a", 1);
        assert!(shared.register(&handle));

        assert_eq!(shared.start_petition(&handle), StartOutcome::Started);
        assert_eq!(shared.running(), 1);

        assert!(shared.finish_petition(&handle));
        assert_eq!(shared.running(), 0);
        assert!(handle.state().is_finished());
    }

    #[test]
    fn test_finish_is_idempotent() {
        let shared = shared();
        let handle = enqueued_handle("a", 1);
        shared.register(&handle);
        shared.start_petition(&handle);

        assert!(shared.finish_petition(&handle));
        assert!(!shared.finish_petition(&handle));
        assert_eq!(shared.running(), 0);
    }

    #[test]
    fn test_finish_never_started_returns_false() {
        let shared = shared();
        let handle = enqueued_handle("a", 1);
        shared.register(&handle);

        assert!(!shared.finish_petition(&handle));
        assert_eq!(shared.running(), 0);
        assert!(handle.state().is_finished());
    }

    #[test]
    fn test_unmet_condition_commits_nothing() {
        let shared = shared();
        let petition = FnPetition::builder("gated", 1)
            .condition(|_| false)
            .arc();
        let handle = PetitionHandle::new(petition, 0, Reply::null());
        handle.set_state(PetitionState::Enqueued).unwrap();
        shared.register(&handle);

        assert_eq!(shared.start_petition(&handle), StartOutcome::Unmet);
        assert_eq!(shared.running(), 0);
        assert!(handle.state().is_enqueued());
    }

    #[test]
    fn test_duplicate_live_id_rejected() {
        let shared = shared();
        let first = enqueued_handle("same", 1);
        let second = enqueued_handle("same", 2);
        assert!(shared.register(&first));
        assert!(!shared.register(&second));
    }

    #[test]
    fn test_predicate_sees_committed_running_count() {
        // Two petitions sharing a single slot: the second must observe the
        // first one's committed counter and be turned away.
        let shared = shared();
        let gate = |c: &Counters| c.running < 1;

        let a = PetitionHandle::new(
            FnPetition::builder("a", 1).condition(gate).arc(),
            0,
            Reply::null(),
        );
        let b = PetitionHandle::new(
            FnPetition::builder("b", 2).condition(gate).arc(),
            1,
            Reply::null(),
        );
        a.set_state(PetitionState::Enqueued).unwrap();
        b.set_state(PetitionState::Enqueued).unwrap();
        shared.register(&a);
        shared.register(&b);

        assert_eq!(shared.start_petition(&a), StartOutcome::Started);
        assert_eq!(shared.start_petition(&b), StartOutcome::Unmet);

        shared.finish_petition(&a);
        assert_eq!(shared.start_petition(&b), StartOutcome::Started);
    }

    #[test]
    fn test_unhealthy_start_marks_broken() {
        struct RefusingManager;
        impl Manager for RefusingManager {
            fn convert(&self, _m: &crate::transport::Message) -> Option<crate::PetitionRef> {
                None
            }
            fn on_start(&self, _p: &PetitionHandle) -> bool {
                false
            }
        }

        let shared = Shared::new(Arc::new(RefusingManager), Bus::new(16));
        let handle = enqueued_handle("sick", 1);
        shared.register(&handle);

        assert_eq!(shared.start_petition(&handle), StartOutcome::Unhealthy);
        assert!(handle.state().is_broken());
        // the caller finishes it right away; counter settles back to zero
        assert!(shared.finish_petition(&handle));
        assert_eq!(shared.running(), 0);
        assert!(handle.state().is_finished());
    }
}
