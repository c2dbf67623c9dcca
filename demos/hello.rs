//! # Example: hello
//!
//! Minimal end-to-end walkthrough: an in-process service plus a client
//! submitting one petition and printing its streamed output.
//!
//! Demonstrates how to:
//! - Implement a [`Manager`] that converts messages into [`ProcessPetition`]s.
//! - Serve authenticated submissions over TCP.
//! - Stream worker output back to the client and read the exit code.
//!
//! ## Flow
//! ```text
//! Client ──Message{counter, sleep_time}──► Server
//!    │                                       │ Manager::convert
//!    │                                       ▼
//!    │                              ProcessPetition (sh loop)
//!    │                                       │ admission → worker process
//!    ◄──"Hello World! 0..N" lines, Done(0)──┘
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example hello --features logging
//! ```

use std::sync::Arc;

use orchid::{
    AuthKey, Client, Config, LogWriter, Manager, Message, Orchestrator, PetitionRef,
    ProcessPetition, Server, Subscribe,
};
use tokio_util::sync::CancellationToken;

struct HelloManager;

impl Manager for HelloManager {
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

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "orchid=debug".into()),
        )
        .init();

    // 1. Build the orchestrator with a stdout event log
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
    let orchestrator = Orchestrator::builder(Config::default(), HelloManager)
        .with_subscribers(subs)
        .build();

    // 2. Serve on a loopback port with a shared key
    let key = AuthKey::new(b"hello-demo".to_vec());
    let server = Server::bind("127.0.0.1:0", orchestrator.clone(), key.clone()).await?;
    let addr = server.local_addr()?;
    let token = CancellationToken::new();
    tokio::spawn(server.serve(token.clone()));

    // 3. Drive the scheduling loop in the background
    let orch = orchestrator.clone();
    let run = tokio::spawn(async move { orch.run().await });

    // 4. Submit one petition and stream its output
    let client = Client::new(addr.to_string(), key);
    let message = Message::new("hello")
        .with_extra("counter", 3)
        .with_extra("sleep_time", 0.2);
    let stream = client.submit(message).await?;
    let code = stream.drain(|line| println!("> {line}")).await?;
    println!("petition finished with exit code {code}");

    // 5. Shut everything down
    token.cancel();
    orchestrator.shutdown();
    run.await??;
    Ok(())
}
