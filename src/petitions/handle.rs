//! # Orchestrator-side petition bookkeeping.
//!
//! [`PetitionHandle`] pairs a [`Petition`](crate::Petition) with everything
//! the orchestrator tracks for it: the lifecycle [`StateCell`], the arrival
//! sequence number used for FIFO tie-breaks, the per-petition [`Reply`]
//! channel back to the owning client, the recorded worker pid and the
//! starvation counter.
//!
//! [`ActionContext`] is the slice of a handle that petition actions are
//! allowed to touch: pid reporting, output streaming and the final status.
//!
//! ## Rules
//! - Handles are cheap to clone (`Arc` inner); the processor, the registry
//!   and the worker task all hold the same bookkeeping.
//! - The final [`Reply::done`] frame is delivered at most once; later calls
//!   are no-ops.
//! - The recorded pid is written once, when the worker spawns.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::StateError;
use crate::events::{Bus, Event, EventKind};
use crate::petitions::petition::{Counters, PetitionId, PetitionKind, PetitionRef, Priority, WorkerPid};
use crate::petitions::state::{PetitionState, StateCell};
use crate::transport::OutputFrame;

/// Sender half of the per-petition stream back to the owning client.
///
/// A reply either wraps a live channel (remote client) or is a null sink
/// (internal petitions such as heartbeats). Output lines are delivered in
/// order; the final [`OutputFrame::Done`] is sent at most once and closes
/// the stream.
#[derive(Clone, Debug)]
pub struct Reply {
    tx: Option<mpsc::UnboundedSender<OutputFrame>>,
    done: Arc<AtomicBool>,
}

impl Reply {
    /// Creates a connected reply and the receiver end for the transport.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutputFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(tx),
                done: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// Creates a sink that discards everything (internal petitions).
    pub fn null() -> Self {
        Self {
            tx: None,
            done: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Streams one output line to the client. Silently dropped when the
    /// client is gone or the final frame was already sent.
    pub fn line(&self, line: impl Into<String>) {
        if self.done.load(Ordering::Acquire) {
            return;
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(OutputFrame::Line { text: line.into() });
        }
    }

    /// Delivers the final status frame. `None` is read as success (code 0)
    /// by the client. Only the first call has any effect.
    pub fn done(&self, code: Option<i32>) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(OutputFrame::Done { code });
        }
    }

    /// Whether the final frame was already delivered.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

struct HandleInner {
    petition: PetitionRef,
    state: StateCell,
    seq: u64,
    reply: Reply,
    pid: Mutex<Option<WorkerPid>>,
    seen: AtomicU32,
    counted: AtomicBool,
}

/// Cheap-to-clone bookkeeping for one live petition.
#[derive(Clone)]
pub struct PetitionHandle {
    inner: Arc<HandleInner>,
}

impl PetitionHandle {
    /// Wraps a petition with fresh bookkeeping.
    ///
    /// `seq` is the arrival sequence number; it breaks priority ties in
    /// submission order and never changes across re-queues.
    pub fn new(petition: PetitionRef, seq: u64, reply: Reply) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                petition,
                state: StateCell::new(),
                seq,
                reply,
                pid: Mutex::new(None),
                seen: AtomicU32::new(0),
                counted: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the petition identifier.
    pub fn id(&self) -> &PetitionId {
        self.inner.petition.id()
    }

    /// Returns the scheduling priority.
    pub fn priority(&self) -> Priority {
        self.inner.petition.priority()
    }

    /// Returns the petition discriminator.
    pub fn kind(&self) -> PetitionKind {
        self.inner.petition.kind()
    }

    /// Returns the arrival sequence number.
    pub fn seq(&self) -> u64 {
        self.inner.seq
    }

    /// Returns the underlying petition.
    pub fn petition(&self) -> &PetitionRef {
        &self.inner.petition
    }

    /// Returns the reply channel.
    pub fn reply(&self) -> &Reply {
        &self.inner.reply
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> PetitionState {
        self.inner.state.get()
    }

    /// Moves the lifecycle state, validating the transition.
    pub fn set_state(&self, next: PetitionState) -> Result<PetitionState, StateError> {
        self.inner.state.set(next)
    }

    /// Evaluates the admission predicate against a counters snapshot.
    pub fn condition(&self, counters: &Counters) -> bool {
        self.inner.petition.condition(counters)
    }

    /// Invokes the petition's terminate operation with the recorded pid.
    pub fn terminate(&self) -> bool {
        self.inner.petition.terminate(self.pid())
    }

    /// Records the worker pid. First write wins.
    pub fn record_pid(&self, pid: WorkerPid) {
        let mut slot = self.inner.pid.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(pid);
        }
    }

    /// Returns the recorded worker pid, if the worker spawned.
    pub fn pid(&self) -> Option<WorkerPid> {
        *self.inner.pid.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Bumps and returns the times the processor has seen this petition
    /// without admitting it.
    pub(crate) fn bump_seen(&self) -> u32 {
        self.inner.seen.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Clears the starvation counter (called when the petition starts).
    pub(crate) fn reset_seen(&self) {
        self.inner.seen.store(0, Ordering::Relaxed);
    }

    /// Marks the petition as counted in `running`. Returns whether it was
    /// already counted.
    pub(crate) fn mark_counted(&self) -> bool {
        self.inner.counted.swap(true, Ordering::AcqRel)
    }

    /// Clears the counted mark. Returns whether it was set.
    pub(crate) fn take_counted(&self) -> bool {
        self.inner.counted.swap(false, Ordering::AcqRel)
    }
}

impl std::fmt::Debug for PetitionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PetitionHandle")
            .field("id", &self.id().to_string())
            .field("priority", &self.priority())
            .field("seq", &self.seq())
            .field("state", &self.state())
            .finish()
    }
}

/// The slice of a [`PetitionHandle`] an action is allowed to use.
///
/// Carries the cancellation token for cooperative parts of the action
/// (waiting on a child process, sleeping between output lines).
#[derive(Clone)]
pub struct ActionContext {
    handle: PetitionHandle,
    token: CancellationToken,
    bus: Bus,
}

impl ActionContext {
    pub(crate) fn new(handle: PetitionHandle, token: CancellationToken, bus: Bus) -> Self {
        Self { handle, token, bus }
    }

    /// Returns the petition identifier.
    pub fn id(&self) -> &PetitionId {
        self.handle.id()
    }

    /// Records the worker process id so cancellation can reach it.
    ///
    /// Call as soon as the process spawns; until the pid is recorded a
    /// cancellation can only mark the petition, not signal the worker.
    pub fn report_pid(&self, pid: WorkerPid) {
        self.handle.record_pid(pid);
        self.bus.publish(
            Event::now(EventKind::PetitionStarted)
                .with_petition(self.handle.id().to_string())
                .with_pid(pid),
        );
    }

    /// Streams one output line to the owning client.
    pub fn line(&self, line: impl Into<String>) {
        self.handle.reply().line(line);
    }

    /// Delivers the final status frame (at most once).
    pub fn done(&self, code: Option<i32>) {
        self.handle.reply().done(code);
    }

    /// Whether cancellation was requested for this petition.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns the cancellation token for cooperative waits.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_done_is_once_only() {
        let (reply, mut rx) = Reply::channel();
        reply.line("a");
        reply.done(Some(3));
        reply.done(Some(7));
        reply.line("dropped after done");

        assert!(matches!(rx.try_recv(), Ok(OutputFrame::Line { text }) if text == "a"));
        assert!(matches!(rx.try_recv(), Ok(OutputFrame::Done { code: Some(3) })));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_null_reply_swallows_everything() {
        let reply = Reply::null();
        reply.line("nobody listens");
        reply.done(None);
        assert!(reply.is_done());
    }
}
