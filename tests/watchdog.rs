//! Watchdog behavior: heartbeat round trips through the ordinary
//! scheduling path, liveness notifications and deliberate suppression.

use std::sync::Arc;
use std::time::Duration;

use orchid::{
    ChannelLiveness, Config, Manager, Message, Orchestrator, PetitionHandle, PetitionRef,
    Watchdog, WatchdogConfig,
};
use tokio_util::sync::CancellationToken;

/// User manager that would fail the test if a heartbeat ever reached its
/// hooks.
struct HeartbeatAllergicManager;

impl Manager for HeartbeatAllergicManager {
    fn convert(&self, _message: &Message) -> Option<PetitionRef> {
        None
    }

    fn on_start(&self, petition: &PetitionHandle) -> bool {
        assert_ne!(
            petition.id().to_string(),
            orchid::HEARTBEAT_ID,
            "user hooks must never observe heartbeat petitions"
        );
        true
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

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_heartbeats_produce_liveness_notifications() {
    let orchestrator = Orchestrator::builder(test_config(), HeartbeatAllergicManager).build();

    let (sink, mut notifications) = ChannelLiveness::channel();
    let watchdog = Watchdog::new(
        WatchdogConfig {
            interval: Duration::from_millis(50),
            deadline: Duration::from_millis(500),
            max_missed: 3,
        },
        Arc::new(sink),
    );

    let token = CancellationToken::new();
    watchdog.spawn(orchestrator.clone(), token.clone());

    let orch = orchestrator.clone();
    let run = tokio::spawn(async move { orch.run().await });

    // at least two full round trips within a generous window
    for _ in 0..2 {
        tokio::time::timeout(Duration::from_secs(5), notifications.recv())
            .await
            .expect("liveness notification in time")
            .expect("sink open");
    }

    assert!(!orchestrator.liveness_gate().is_suppressed());

    token.cancel();
    orchestrator.shutdown();
    run.await.unwrap().expect("run");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missed_round_trips_suppress_liveness() {
    // the processor never runs, so heartbeats are enqueued but never
    // executed: every round trip misses its deadline
    let orchestrator = Orchestrator::builder(test_config(), HeartbeatAllergicManager).build();

    let (sink, mut notifications) = ChannelLiveness::channel();
    let watchdog = Watchdog::new(
        WatchdogConfig {
            interval: Duration::from_millis(30),
            deadline: Duration::from_millis(30),
            max_missed: 2,
        },
        Arc::new(sink),
    );

    let token = CancellationToken::new();
    watchdog.spawn(orchestrator.clone(), token.clone());

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if orchestrator.liveness_gate().is_suppressed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("gate should close after repeated misses");

    assert!(notifications.try_recv().is_err(), "no beat should have been reported");
    token.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_suppressed_gate_silences_notifications() {
    let orchestrator = Orchestrator::builder(test_config(), HeartbeatAllergicManager).build();

    let (sink, mut notifications) = ChannelLiveness::channel();
    let watchdog = Watchdog::new(
        WatchdogConfig {
            interval: Duration::from_millis(30),
            deadline: Duration::from_millis(500),
            max_missed: 100,
        },
        Arc::new(sink),
    );

    let token = CancellationToken::new();
    watchdog.spawn(orchestrator.clone(), token.clone());

    let orch = orchestrator.clone();
    let run = tokio::spawn(async move { orch.run().await });

    // healthy first, then silenced
    tokio::time::timeout(Duration::from_secs(5), notifications.recv())
        .await
        .expect("first beat in time")
        .expect("sink open");

    orchestrator.liveness_gate().suppress();
    // let any in-flight notification land before draining
    tokio::time::sleep(Duration::from_millis(100)).await;
    while notifications.try_recv().is_ok() {}

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(
        notifications.try_recv().is_err(),
        "suppressed gate must not produce notifications"
    );

    token.cancel();
    orchestrator.shutdown();
    run.await.unwrap().expect("run");
}
