//! # Closure-backed petition (`FnPetition`)
//!
//! [`FnPetition`] builds a petition from plain closures: an admission
//! predicate and an action factory. It is the quickest way to embed the
//! orchestrator in an application or to drive it from tests without
//! defining a dedicated petition type.
//!
//! ## Concurrency semantics
//! - The action factory is called once per admission and must produce a
//!   fresh future owning its own state.
//! - Shared state across petitions goes through an explicit `Arc<...>`
//!   inside the closures.
//!
//! ## Example
//! ```rust
//! use orchid::{Counters, FnPetition, Petition, PetitionRef};
//!
//! let p: PetitionRef = FnPetition::builder("compact-db", 10)
//!     .condition(|c: &Counters| c.running == 0)
//!     .action(|ctx| async move {
//!         ctx.line("compacting...");
//!         ctx.done(Some(0));
//!         Ok(())
//!     })
//!     .arc();
//!
//! assert_eq!(p.priority(), 10);
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PetitionError;
use crate::petitions::handle::ActionContext;
use crate::petitions::petition::{
    Counters, Petition, PetitionId, PetitionRef, Priority, WorkerPid,
};

type BoxActionFuture = Pin<Box<dyn Future<Output = Result<(), PetitionError>> + Send>>;
type ConditionFn = Box<dyn Fn(&Counters) -> bool + Send + Sync>;
type ActionFn = Box<dyn Fn(ActionContext) -> BoxActionFuture + Send + Sync>;
type TerminateFn = Box<dyn Fn(Option<WorkerPid>) -> bool + Send + Sync>;

/// Closure-backed petition implementation.
pub struct FnPetition {
    id: PetitionId,
    priority: Priority,
    condition: ConditionFn,
    action: ActionFn,
    terminate: TerminateFn,
}

impl FnPetition {
    /// Starts building a petition with the given id and priority.
    ///
    /// Defaults: condition always holds, action is a no-op that reports
    /// success, terminate reports success.
    pub fn builder(id: impl Into<PetitionId>, priority: Priority) -> FnPetitionBuilder {
        FnPetitionBuilder {
            id: id.into(),
            priority,
            condition: Box::new(|_| true),
            action: Box::new(|ctx| -> BoxActionFuture {
                Box::pin(async move {
                    ctx.done(Some(0));
                    Ok(())
                })
            }),
            terminate: Box::new(|_| true),
        }
    }
}

/// Builder for [`FnPetition`].
pub struct FnPetitionBuilder {
    id: PetitionId,
    priority: Priority,
    condition: ConditionFn,
    action: ActionFn,
    terminate: TerminateFn,
}

impl FnPetitionBuilder {
    /// Sets the admission predicate.
    pub fn condition<C>(mut self, condition: C) -> Self
    where
        C: Fn(&Counters) -> bool + Send + Sync + 'static,
    {
        self.condition = Box::new(condition);
        self
    }

    /// Sets the action. The closure is invoked once per admission and must
    /// return a fresh future.
    pub fn action<A, Fut>(mut self, action: A) -> Self
    where
        A: Fn(ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PetitionError>> + Send + 'static,
    {
        self.action = Box::new(move |ctx| -> BoxActionFuture { Box::pin(action(ctx)) });
        self
    }

    /// Sets the terminate callback invoked on cancellation.
    pub fn terminate<T>(mut self, terminate: T) -> Self
    where
        T: Fn(Option<WorkerPid>) -> bool + Send + Sync + 'static,
    {
        self.terminate = Box::new(terminate);
        self
    }

    /// Finishes the builder.
    pub fn build(self) -> FnPetition {
        FnPetition {
            id: self.id,
            priority: self.priority,
            condition: self.condition,
            action: self.action,
            terminate: self.terminate,
        }
    }

    /// Finishes the builder as a shared [`PetitionRef`].
    pub fn arc(self) -> PetitionRef {
        Arc::new(self.build())
    }
}

#[async_trait]
impl Petition for FnPetition {
    fn id(&self) -> &PetitionId {
        &self.id
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn condition(&self, counters: &Counters) -> bool {
        (self.condition)(counters)
    }

    async fn execute(&self, ctx: ActionContext) -> Result<(), PetitionError> {
        (self.action)(ctx).await
    }

    fn terminate(&self, pid: Option<WorkerPid>) -> bool {
        (self.terminate)(pid)
    }
}
