//! # Example: cancel_running
//!
//! Demonstrates cancellation of a petition whose worker process is already
//! running.
//!
//! Shows how to:
//! - Start a long-running worker process through a petition.
//! - Cancel it by id over the transport.
//! - Observe the `Running → Cancelled → Finished` settlement from the
//!   client's perspective (stream closure maps to success).
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► submit long-running petition (sh: echo + sleep loop)
//!   ├─► read the first output line (worker is running, pid recorded)
//!   ├─► client.cancel("long")
//!   │     ├─► service marks Cancelled, signals the process group
//!   │     ├─► worker observes the dead process, drives finish
//!   │     └─► cancel acknowledged once the petition is Finished
//!   └─► drain the stream → exit code 0
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example cancel_running
//! ```

use orchid::{
    AuthKey, Client, Config, Manager, Message, Orchestrator, PetitionRef, ProcessPetition, Server,
};
use tokio_util::sync::CancellationToken;

struct SleeperManager;

impl Manager for SleeperManager {
    fn convert(&self, message: &Message) -> Option<PetitionRef> {
        let seconds = message.extras.get("seconds")?.as_u64()?;
        let script = format!("echo started; sleep {seconds}; echo never-reached");
        Some(
            ProcessPetition::new(message.id.clone(), 100, "sh", ["-c".to_string(), script])
                .with_process_group()
                .arc(),
        )
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Service setup
    let orchestrator = Orchestrator::builder(Config::default(), SleeperManager).build();
    let key = AuthKey::new(b"cancel-demo".to_vec());
    let server = Server::bind("127.0.0.1:0", orchestrator.clone(), key.clone()).await?;
    let addr = server.local_addr()?;
    let token = CancellationToken::new();
    tokio::spawn(server.serve(token.clone()));
    let orch = orchestrator.clone();
    let run = tokio::spawn(async move { orch.run().await });

    // 2. Submit a petition that would run for an hour
    let client = Client::new(addr.to_string(), key);
    let mut stream = client
        .submit(Message::new("long").with_extra("seconds", 3600))
        .await?;

    // 3. Wait until the worker proves it is running
    if let Some(frame) = stream.recv().await? {
        println!("first frame: {frame:?}");
    }

    // 4. Cancel; resolves once the petition reaches Finished
    println!("cancelling...");
    client.cancel("long").await?;
    println!("cancel acknowledged");

    // 5. The interrupted stream still settles cleanly
    let code = stream.drain(|line| println!("> {line}")).await?;
    println!("stream settled with exit code {code}");

    token.cancel();
    orchestrator.shutdown();
    run.await??;
    Ok(())
}
