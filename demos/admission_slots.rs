//! # Example: admission_slots
//!
//! Demonstrates admission control: three petitions compete for a single
//! execution slot, so they run strictly one after another even though all
//! are queued at once.
//!
//! Shows how to:
//! - Gate petitions on the shared `running` counter via their predicate.
//! - Observe `ConditionUnmet` events while petitions wait for the slot.
//!
//! ## Flow
//! ```text
//! enqueue p1, p2, p3 (all: condition = running < 1)
//!   round 1: p1 admitted ── p2, p3 unmet → back into the queue
//!   (p1 finishes, slot frees)
//!   round k: p2 admitted ── p3 unmet → back into the queue
//!   ...
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example admission_slots
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use orchid::{
    events::{Event, EventKind},
    Config, Manager, Message, Orchestrator, PetitionRef, ProcessPetition, Reply, Subscribe,
};

struct NoConvert;

impl Manager for NoConvert {
    fn convert(&self, _message: &Message) -> Option<PetitionRef> {
        None
    }

    fn on_start(&self, petition: &orchid::PetitionHandle) -> bool {
        println!("[hook] slot taken by {}", petition.id());
        true
    }

    fn on_finish(&self, petition: &orchid::PetitionHandle) {
        println!("[hook] slot freed by {}", petition.id());
    }
}

/// Prints admission misses as they happen.
struct UnmetPrinter;

#[async_trait]
impl Subscribe for UnmetPrinter {
    async fn on_event(&self, ev: &Event) {
        if matches!(ev.kind, EventKind::ConditionUnmet) {
            println!("[event] {} is waiting for the slot", ev.petition.as_deref().unwrap_or("-"));
        }
    }

    fn name(&self) -> &'static str {
        "unmet-printer"
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // short idle waits keep the retry cadence visible but snappy
    let cfg = Config {
        idle_wait_min: Duration::from_millis(100),
        idle_wait_max: Duration::from_millis(300),
        ..Config::default()
    };
    let orchestrator = Orchestrator::builder(cfg, NoConvert)
        .with_subscribers(vec![Arc::new(UnmetPrinter) as Arc<dyn Subscribe>])
        .build();

    // three petitions, one slot: with_slots(1) gates on running < 1
    for id in ["p1", "p2", "p3"] {
        let petition = ProcessPetition::new(id, 10, "sh", ["-c".to_string(), format!("echo {id} working; sleep 1")])
            .with_slots(1)
            .arc();
        let _ = orchestrator.enqueue(petition, Reply::null());
    }

    orchestrator.shutdown();
    orchestrator.run().await?;
    println!("all petitions done, running = {}", orchestrator.running());
    Ok(())
}
