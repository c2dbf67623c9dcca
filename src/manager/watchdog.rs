//! # Watchdog: heartbeat petitions + liveness round trips.
//!
//! The watchdog proves the whole scheduling path is healthy by sending its
//! heartbeat **through the same queue and admission machinery as user
//! work**: every `interval` it enqueues a [`HeartbeatPetition`] whose
//! action resolves a oneshot. If the round trip completes within
//! `deadline`, one liveness notification goes out; when round trips keep
//! missing, notifications stop so the external supervisor restarts the
//! service.
//!
//! ## Architecture
//! ```text
//! Watchdog tick ──► HeartbeatPetition ──► priority queue (Priority::MIN)
//!                                              │ same admission/execute path
//!                                              ▼
//!                        oneshot resolved ◄── worker
//!                               │
//!              within deadline ─┼─ missed
//!                               ▼          ▼
//!               Liveness::notify_alive   miss count ≥ max_missed
//!               (unless gate suppressed)   └─► LivenessGate::suppress()
//! ```
//!
//! ## Rules
//! - Heartbeats pin [`Priority::MIN`]: they overtake all user work.
//! - Their predicate always holds — resource limits never gate liveness.
//! - User `on_start`/`on_finish` hooks never observe heartbeats; the shared
//!   critical section filters them by [`PetitionKind::Heartbeat`].
//! - A heartbeat enqueued while the previous one is still live is dropped
//!   (duplicate id) and counts as a miss.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::Orchestrator;
use crate::error::PetitionError;
use crate::events::{Event, EventKind};
use crate::manager::liveness::{Liveness, LivenessGate};
use crate::petitions::{
    ActionContext, Counters, Petition, PetitionId, PetitionKind, Priority, Reply, WorkerPid,
};

/// Reserved identifier of heartbeat petitions.
pub const HEARTBEAT_ID: &str = "__heartbeat__";

/// Watchdog timing configuration.
#[derive(Clone, Debug)]
pub struct WatchdogConfig {
    /// Interval between heartbeat petitions.
    pub interval: Duration,
    /// Maximum round-trip time before a heartbeat counts as missed.
    pub deadline: Duration,
    /// Consecutive misses after which liveness reporting stops.
    pub max_missed: u32,
}

impl Default for WatchdogConfig {
    /// Defaults: `interval = 10s`, `deadline = 5s`, `max_missed = 3`.
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            deadline: Duration::from_secs(5),
            max_missed: 3,
        }
    }
}

impl WatchdogConfig {
    /// Builds the configuration from the environment.
    ///
    /// Honors the supervisor convention first: when `WATCHDOG_USEC` is set
    /// the interval becomes half of it. Explicit overrides:
    /// `ORCHID_WATCHDOG_INTERVAL_SECS`, `ORCHID_WATCHDOG_DEADLINE_SECS`,
    /// `ORCHID_WATCHDOG_MAX_MISSED`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(usec) = read_env_u64("WATCHDOG_USEC") {
            cfg.interval = Duration::from_micros(usec / 2).max(Duration::from_secs(1));
        }
        if let Some(secs) = read_env_u64("ORCHID_WATCHDOG_INTERVAL_SECS") {
            cfg.interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = read_env_u64("ORCHID_WATCHDOG_DEADLINE_SECS") {
            cfg.deadline = Duration::from_secs(secs.max(1));
        }
        if let Some(n) = read_env_u64("ORCHID_WATCHDOG_MAX_MISSED") {
            cfg.max_missed = n.min(u64::from(u32::MAX)) as u32;
        }
        cfg
    }
}

fn read_env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.trim().parse().ok()
}

/// Internal heartbeat petition: a lightweight round trip through the
/// ordinary scheduling path.
pub struct HeartbeatPetition {
    id: PetitionId,
    tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl HeartbeatPetition {
    /// Creates a heartbeat resolving `tx` when executed.
    pub fn new(tx: oneshot::Sender<()>) -> Self {
        Self {
            id: PetitionId::Text(HEARTBEAT_ID.to_string()),
            tx: Mutex::new(Some(tx)),
        }
    }
}

#[async_trait]
impl Petition for HeartbeatPetition {
    fn id(&self) -> &PetitionId {
        &self.id
    }

    fn priority(&self) -> Priority {
        Priority::MIN
    }

    fn kind(&self) -> PetitionKind {
        PetitionKind::Heartbeat
    }

    fn condition(&self, _counters: &Counters) -> bool {
        true
    }

    async fn execute(&self, _ctx: ActionContext) -> Result<(), PetitionError> {
        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(tx) = tx {
            let _ = tx.send(());
        }
        Ok(())
    }

    fn terminate(&self, _pid: Option<WorkerPid>) -> bool {
        true
    }
}

/// Periodic heartbeat driver and liveness reporter.
pub struct Watchdog {
    cfg: WatchdogConfig,
    notifier: Arc<dyn Liveness>,
}

impl Watchdog {
    /// Creates a watchdog reporting through `notifier`.
    pub fn new(cfg: WatchdogConfig, notifier: Arc<dyn Liveness>) -> Self {
        Self { cfg, notifier }
    }

    /// Spawns the heartbeat loop against the given orchestrator.
    ///
    /// Runs until `token` is cancelled. The orchestrator's
    /// [`LivenessGate`] is consulted before every notification, so
    /// processor-level fault suppression silences the watchdog too.
    pub fn spawn(
        self,
        orchestrator: Arc<Orchestrator>,
        token: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(orchestrator, token).await;
        })
    }

    async fn run(self, orchestrator: Arc<Orchestrator>, token: CancellationToken) {
        let gate: Arc<LivenessGate> = orchestrator.liveness_gate();
        let bus = orchestrator.bus().clone();
        let mut ticker = tokio::time::interval(self.cfg.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut missed: u32 = 0;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let (tx, rx) = oneshot::channel();
            let heartbeat = Arc::new(HeartbeatPetition::new(tx));
            let accepted = orchestrator
                .enqueue(heartbeat, Reply::null())
                .is_some();

            let beat = if accepted {
                tokio::select! {
                    _ = token.cancelled() => break,
                    res = tokio::time::timeout(self.cfg.deadline, rx) => {
                        matches!(res, Ok(Ok(())))
                    }
                }
            } else {
                // previous heartbeat still live; the path is wedged
                false
            };

            if beat {
                missed = 0;
                if !gate.is_suppressed() {
                    self.notifier.notify_alive();
                    bus.publish(Event::now(EventKind::WatchdogBeat));
                }
            } else {
                missed += 1;
                debug!(missed, "watchdog heartbeat missed");
                bus.publish(
                    Event::now(EventKind::WatchdogMissed).with_reason(missed.to_string()),
                );
                if missed >= self.cfg.max_missed {
                    gate.suppress();
                }
            }
        }
    }
}
