//! End-to-end tests over the real TCP transport: handshake, submission
//! streaming, cancellation and silent drops.

use std::sync::Arc;
use std::time::Duration;

use orchid::{
    AuthKey, Client, Config, Manager, Message, Orchestrator, PetitionRef, ProcessPetition, Server,
};
use tokio_util::sync::CancellationToken;

/// Manager mirroring the canonical "hello world" workload: `counter`
/// output lines with `sleep_time` seconds between them, produced by a
/// worker process.
struct CountManager;

impl Manager for CountManager {
    fn convert(&self, message: &Message) -> Option<PetitionRef> {
        let counter = message.extras.get("counter")?.as_u64()?;
        let sleep_time = message.extras.get("sleep_time")?.as_f64()?;
        let script = format!(
            "i=0; while [ $i -lt {counter} ]; do echo \"Hello World! $i\"; i=$((i+1)); sleep {sleep_time}; done"
        );
        Some(
            ProcessPetition::new(message.id.clone(), 100, "sh", ["-c".to_string(), script])
                .with_process_group()
                .arc(),
        )
    }
}

struct Fixture {
    orchestrator: Arc<Orchestrator>,
    client: Client,
    addr: std::net::SocketAddr,
    token: CancellationToken,
    run: tokio::task::JoinHandle<Result<(), orchid::RuntimeError>>,
}

async fn start_service(key: &[u8]) -> Fixture {
    let cfg = Config {
        idle_wait_min: Duration::from_millis(10),
        idle_wait_max: Duration::from_millis(40),
        grace: Duration::from_secs(10),
        ..Config::default()
    };
    let orchestrator = Orchestrator::builder(cfg, CountManager).build();

    let server = Server::bind(
        "127.0.0.1:0",
        orchestrator.clone(),
        AuthKey::new(key.to_vec()),
    )
    .await
    .expect("bind");
    let addr = server.local_addr().expect("local addr");

    let token = CancellationToken::new();
    tokio::spawn(server.serve(token.clone()));

    let orch = orchestrator.clone();
    let run = tokio::spawn(async move { orch.run().await });

    Fixture {
        orchestrator,
        client: Client::new(addr.to_string(), AuthKey::new(key.to_vec())),
        addr,
        token,
        run,
    }
}

impl Fixture {
    async fn teardown(self) {
        self.orchestrator.shutdown();
        self.token.cancel();
        let _ = self.run.await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_end_to_end_streams_lines_and_exit_code() {
    let fx = start_service(b"secret").await;

    let message = Message::new("a")
        .with_extra("counter", 3)
        .with_extra("sleep_time", 0);
    let stream = fx.client.submit(message).await.expect("submit");

    let mut lines = Vec::new();
    let code = stream
        .drain(|line| lines.push(line.to_string()))
        .await
        .expect("drain");

    assert_eq!(code, 0);
    assert_eq!(
        lines,
        ["Hello World! 0", "Hello World! 1", "Hello World! 2"]
    );

    fx.teardown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_end_to_end_cancellation_of_running_petition() {
    let fx = start_service(b"secret").await;

    // long-running petition: first line proves the worker process started
    let message = Message::new("long")
        .with_extra("counter", 1000)
        .with_extra("sleep_time", 1);
    let mut stream = fx.client.submit(message).await.expect("submit");

    let first = tokio::time::timeout(Duration::from_secs(10), stream.recv())
        .await
        .expect("first line in time")
        .expect("recv")
        .expect("stream open");
    assert_eq!(first, orchid::OutputFrame::Line { text: "Hello World! 0".into() });

    // cancel resolves once the petition reaches its terminal state
    tokio::time::timeout(Duration::from_secs(10), fx.client.cancel("long"))
        .await
        .expect("cancel in time")
        .expect("cancel");

    // the worker was signalled; its stream closes and maps to success
    let code = tokio::time::timeout(Duration::from_secs(10), stream.drain(|_| {}))
        .await
        .expect("drain in time")
        .expect("drain");
    assert_eq!(code, 0);

    // the running counter was decremented exactly once
    assert_eq!(fx.orchestrator.running(), 0);
    assert!(!fx.orchestrator.is_live(&"long".into()));

    fx.teardown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_wrong_key_is_refused() {
    let fx = start_service(b"secret").await;

    let rogue = Client::new(fx.addr.to_string(), AuthKey::new(b"not-the-secret".to_vec()));
    let err = rogue
        .submit(Message::new("a").with_extra("counter", 1).with_extra("sleep_time", 0))
        .await
        .expect_err("handshake must fail");
    assert!(matches!(err, orchid::TransportError::Unauthorized));

    fx.teardown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_malformed_message_is_dropped_silently() {
    let fx = start_service(b"secret").await;

    // missing `counter`: conversion refuses, stream closes with no output
    let message = Message::new("bad").with_extra("sleep_time", 0);
    let stream = fx.client.submit(message).await.expect("submit");

    let mut lines = 0usize;
    let code = tokio::time::timeout(Duration::from_secs(5), stream.drain(|_| lines += 1))
        .await
        .expect("drain in time")
        .expect("drain");

    assert_eq!(lines, 0);
    assert_eq!(code, 0);
    assert!(!fx.orchestrator.is_live(&"bad".into()));

    fx.teardown().await;
}
