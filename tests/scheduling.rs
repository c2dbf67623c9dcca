//! Scheduling-order, counter and lifecycle properties of the processor
//! loop, driven through the public orchestrator API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use orchid::{
    Config, Counters, FnPetition, Manager, Message, Orchestrator, PetitionHandle, PetitionRef,
    PetitionState, Reply,
};

/// Manager that records hook invocations in arrival order.
#[derive(Default)]
struct RecordingManager {
    started: Mutex<Vec<String>>,
    finished: Mutex<Vec<String>>,
    unhealthy: bool,
}

impl Manager for RecordingManager {
    fn convert(&self, _message: &Message) -> Option<PetitionRef> {
        None
    }

    fn on_start(&self, petition: &PetitionHandle) -> bool {
        self.started
            .lock()
            .unwrap()
            .push(petition.id().to_string());
        !self.unhealthy
    }

    fn on_finish(&self, petition: &PetitionHandle) {
        self.finished
            .lock()
            .unwrap()
            .push(petition.id().to_string());
    }
}

fn test_config() -> Config {
    Config {
        idle_wait_min: Duration::from_millis(10),
        idle_wait_max: Duration::from_millis(40),
        grace: Duration::from_secs(5),
        ..Config::default()
    }
}

fn quick_petition(id: &str, priority: i64) -> PetitionRef {
    FnPetition::builder(id, priority).arc()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_petitions_start_in_priority_order() {
    let manager = Arc::new(RecordingManager::default());
    let mgr = manager.clone();
    let orchestrator = Orchestrator::builder(test_config(), ProxyManager(mgr)).build();

    // submitted out of order; must start by ascending priority value
    for (id, priority) in [("late", 30), ("first", 1), ("mid", 10), ("second", 2)] {
        orchestrator
            .enqueue(quick_petition(id, priority), Reply::null())
            .expect("enqueue");
    }
    orchestrator.shutdown();
    orchestrator.run().await.expect("run");

    let started = manager.started.lock().unwrap().clone();
    assert_eq!(started, ["first", "second", "mid", "late"]);
}

/// Forwards to a shared RecordingManager so tests can inspect it afterwards.
struct ProxyManager(Arc<RecordingManager>);

impl Manager for ProxyManager {
    fn convert(&self, message: &Message) -> Option<PetitionRef> {
        self.0.convert(message)
    }
    fn on_start(&self, petition: &PetitionHandle) -> bool {
        self.0.on_start(petition)
    }
    fn on_finish(&self, petition: &PetitionHandle) {
        self.0.on_finish(petition)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_equal_priority_ties_break_by_arrival() {
    let manager = Arc::new(RecordingManager::default());
    let orchestrator =
        Orchestrator::builder(test_config(), ProxyManager(manager.clone())).build();

    for id in ["a", "b", "c"] {
        orchestrator
            .enqueue(quick_petition(id, 5), Reply::null())
            .expect("enqueue");
    }
    orchestrator.shutdown();
    orchestrator.run().await.expect("run");

    let started = manager.started.lock().unwrap().clone();
    assert_eq!(started, ["a", "b", "c"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_running_counter_settles_to_zero() {
    let manager = Arc::new(RecordingManager::default());
    let orchestrator =
        Orchestrator::builder(test_config(), ProxyManager(manager.clone())).build();

    for i in 0..5 {
        orchestrator
            .enqueue(quick_petition(&format!("p{i}"), i), Reply::null())
            .expect("enqueue");
    }
    orchestrator.shutdown();
    orchestrator.run().await.expect("run");

    assert_eq!(orchestrator.running(), 0);
    // one on_start and one on_finish per petition, no double counting
    assert_eq!(manager.started.lock().unwrap().len(), 5);
    assert_eq!(manager.finished.lock().unwrap().len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_admission_limit_serializes_execution() {
    // two petitions sharing one slot: peak concurrency must stay at 1
    let running_now = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let manager = Arc::new(RecordingManager::default());
    let orchestrator =
        Orchestrator::builder(test_config(), ProxyManager(manager.clone())).build();

    for id in ["one", "two"] {
        let running_now = running_now.clone();
        let peak = peak.clone();
        let petition = FnPetition::builder(id, 10)
            .condition(|c: &Counters| c.running < 1)
            .action(move |ctx| {
                let running_now = running_now.clone();
                let peak = peak.clone();
                async move {
                    let now = running_now.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    running_now.fetch_sub(1, Ordering::SeqCst);
                    ctx.done(Some(0));
                    Ok(())
                }
            })
            .arc();
        orchestrator
            .enqueue(petition, Reply::null())
            .expect("enqueue");
    }
    orchestrator.shutdown();
    orchestrator.run().await.expect("run");

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(manager.started.lock().unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_never_admissible_petition_stays_pending_and_cancellable() {
    let manager = Arc::new(RecordingManager::default());
    let orchestrator =
        Orchestrator::builder(test_config(), ProxyManager(manager.clone())).build();

    let blocked = FnPetition::builder("blocked", 1)
        .condition(|_| false)
        .arc();
    let handle = orchestrator
        .enqueue(blocked, Reply::null())
        .expect("enqueue");

    let orch = orchestrator.clone();
    let run = tokio::spawn(async move { orch.run().await });

    // give the loop a few rounds to prove it never starts the petition
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(manager.started.lock().unwrap().is_empty());
    assert_eq!(orchestrator.running(), 0);

    orchestrator.cancel(handle.id().clone());
    // the cancellation settles the petition even though it never ran
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if handle.state() == PetitionState::Finished {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("petition should settle after cancel");

    orchestrator.shutdown();
    run.await.unwrap().expect("run");

    // never started → the user hooks never saw it
    assert!(manager.started.lock().unwrap().is_empty());
    assert!(manager.finished.lock().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_look_ahead_lets_ready_petition_overtake() {
    let manager = Arc::new(RecordingManager::default());
    let cfg = Config {
        look_ahead: 3,
        ..test_config()
    };
    let orchestrator = Orchestrator::builder(cfg, ProxyManager(manager.clone())).build();

    // head of the queue is never admissible; the next one is
    let stuck = FnPetition::builder("stuck", 1).condition(|_| false).arc();
    let ready = quick_petition("ready", 2);
    orchestrator
        .enqueue(stuck, Reply::null())
        .expect("enqueue");
    orchestrator
        .enqueue(ready, Reply::null())
        .expect("enqueue");

    let orch = orchestrator.clone();
    let run = tokio::spawn(async move { orch.run().await });

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if manager
                .started
                .lock()
                .unwrap()
                .iter()
                .any(|id| id == "ready")
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("ready petition should overtake the stuck head");

    orchestrator.shutdown();
    run.await.unwrap().expect("run");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_starving_petition_collapses_look_ahead_until_it_starts() {
    use orchid::events::EventKind;
    use std::sync::atomic::AtomicBool;

    let manager = Arc::new(RecordingManager::default());
    let cfg = Config {
        look_ahead: 3,
        starvation_threshold: 3,
        ..test_config()
    };
    let orchestrator = Orchestrator::builder(cfg, ProxyManager(manager.clone())).build();
    let mut events = orchestrator.bus().subscribe();

    let admissible = Arc::new(AtomicBool::new(false));
    let gate = admissible.clone();
    let hungry = FnPetition::builder("hungry", 1)
        .condition(move |_| gate.load(Ordering::SeqCst))
        .arc();
    orchestrator
        .enqueue(hungry, Reply::null())
        .expect("enqueue");

    let orch = orchestrator.clone();
    let run = tokio::spawn(async move { orch.run().await });

    // the petition is re-queued past the threshold and reported starving
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let ev = events.recv().await.expect("bus open");
            if ev.kind == EventKind::PetitionStarving {
                break;
            }
        }
    })
    .await
    .expect("starving event in time");

    // once admissible it starts, despite having starved
    admissible.store(true, Ordering::SeqCst);
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if !manager.started.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("starving petition should start once admissible");

    orchestrator.shutdown();
    run.await.unwrap().expect("run");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unhealthy_start_finishes_without_running() {
    let manager = Arc::new(RecordingManager {
        unhealthy: true,
        ..RecordingManager::default()
    });
    let orchestrator =
        Orchestrator::builder(test_config(), ProxyManager(manager.clone())).build();

    let ran = Arc::new(AtomicUsize::new(0));
    let ran_probe = ran.clone();
    let petition = FnPetition::builder("sick", 1)
        .action(move |ctx| {
            let ran = ran_probe.clone();
            async move {
                ran.fetch_add(1, Ordering::SeqCst);
                ctx.done(Some(0));
                Ok(())
            }
        })
        .arc();
    orchestrator
        .enqueue(petition, Reply::null())
        .expect("enqueue");
    orchestrator.shutdown();
    orchestrator.run().await.expect("run");

    // on_start refused → action skipped, on_finish still ran exactly once
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(manager.started.lock().unwrap().len(), 1);
    assert_eq!(manager.finished.lock().unwrap().len(), 1);
    assert_eq!(orchestrator.running(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_broken_action_still_finishes() {
    let manager = Arc::new(RecordingManager::default());
    let orchestrator =
        Orchestrator::builder(test_config(), ProxyManager(manager.clone())).build();

    let petition = FnPetition::builder("boom", 1)
        .action(|_ctx| async move { Err(orchid::PetitionError::fail("kaput")) })
        .arc();
    let handle = orchestrator
        .enqueue(petition, Reply::null())
        .expect("enqueue");
    orchestrator.shutdown();
    orchestrator.run().await.expect("run");

    assert_eq!(handle.state(), PetitionState::Finished);
    assert_eq!(manager.finished.lock().unwrap().len(), 1);
    assert_eq!(orchestrator.running(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_duplicate_live_id_is_dropped() {
    let orchestrator =
        Orchestrator::builder(test_config(), RecordingManager::default()).build();

    let first = orchestrator.enqueue(
        FnPetition::builder("dup", 1).condition(|_| false).arc(),
        Reply::null(),
    );
    assert!(first.is_some());
    let second = orchestrator.enqueue(quick_petition("dup", 2), Reply::null());
    assert!(second.is_none());
}
