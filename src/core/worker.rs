//! # Worker execution: one admitted petition, one supervised action.
//!
//! [`spawn`] runs a petition's action in its own task and drives the finish
//! path exactly once when the action returns — normally, after
//! cancellation, or after a failure. The action itself is expected to put
//! the real work in a separate OS process; this task only supervises it.
//!
//! ## Rules
//! - An action error marks the petition `Broken` and is logged; the
//!   petition still reaches `Finished` (degraded, never dangling).
//! - The client stream is always closed: a final frame is delivered here if
//!   the action did not already send one (`Some(1)` after a failure, `None`
//!   otherwise).
//! - A panicking action is caught; it is treated like a failure.

use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::events::{Bus, Event, EventKind};
use crate::manager::Shared;
use crate::petitions::{ActionContext, PetitionHandle, PetitionState};

/// Spawns the supervising task for one admitted petition.
pub(crate) fn spawn(
    set: &mut JoinSet<()>,
    shared: Arc<Shared>,
    bus: Bus,
    handle: PetitionHandle,
    token: CancellationToken,
) {
    let ctx = ActionContext::new(handle.clone(), token, bus.clone());
    set.spawn(async move {
        let petition = handle.petition().clone();
        let outcome = std::panic::AssertUnwindSafe(petition.execute(ctx))
            .catch_unwind()
            .await;

        let failed = match outcome {
            Ok(Ok(())) => false,
            Ok(Err(err)) => {
                warn!(id = %handle.id(), %err, "petition action failed");
                mark_broken(&bus, &handle, err.as_label());
                true
            }
            Err(_panic) => {
                warn!(id = %handle.id(), "petition action panicked");
                mark_broken(&bus, &handle, "action_panic");
                true
            }
        };

        shared.finish_petition(&handle);
        // no-op when the action already delivered its final frame
        handle.reply().done(if failed { Some(1) } else { None });
    });
}

fn mark_broken(bus: &Bus, handle: &PetitionHandle, reason: &'static str) {
    if let Err(err) = handle.set_state(PetitionState::Broken) {
        warn!(id = %handle.id(), %err, "could not mark petition as broken");
    }
    bus.publish(
        Event::now(EventKind::PetitionBroken)
            .with_petition(handle.id().to_string())
            .with_reason(reason),
    );
}
