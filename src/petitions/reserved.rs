//! Internal petitions that only make sense within the orchestrator.
//!
//! [`SentinelPetition`] is the cooperative-shutdown marker: it carries the
//! lowest possible scheduling urgency ([`Priority::MAX`]) so everything
//! already queued ahead of it is observed first, and the processor drains
//! and exits when it is dequeued.

use async_trait::async_trait;

use crate::error::PetitionError;
use crate::petitions::handle::ActionContext;
use crate::petitions::petition::{
    Counters, Petition, PetitionId, PetitionKind, PetitionRef, Priority, WorkerPid,
};

/// Reserved identifier of the shutdown sentinel.
pub const SENTINEL_ID: &str = "__shutdown__";

/// Shutdown sentinel. Dequeuing it makes the processor drain and exit.
pub struct SentinelPetition {
    id: PetitionId,
}

impl SentinelPetition {
    /// Creates the sentinel as a shared [`PetitionRef`].
    pub fn arc() -> PetitionRef {
        std::sync::Arc::new(Self {
            id: PetitionId::Text(SENTINEL_ID.to_string()),
        })
    }
}

#[async_trait]
impl Petition for SentinelPetition {
    fn id(&self) -> &PetitionId {
        &self.id
    }

    fn priority(&self) -> Priority {
        Priority::MAX
    }

    fn kind(&self) -> PetitionKind {
        PetitionKind::Sentinel
    }

    fn condition(&self, _counters: &Counters) -> bool {
        true
    }

    async fn execute(&self, _ctx: ActionContext) -> Result<(), PetitionError> {
        Ok(())
    }

    fn terminate(&self, _pid: Option<WorkerPid>) -> bool {
        true
    }
}
