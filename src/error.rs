//! Error types used by the orchid runtime, petitions and transport.
//!
//! This module defines four error enums:
//!
//! - [`RuntimeError`] — errors raised by the orchestration runtime itself.
//! - [`PetitionError`] — errors raised by individual petition actions.
//! - [`StateError`] — invalid petition lifecycle transitions.
//! - [`TransportError`] — wire-level faults between clients and the service.
//!
//! All types provide `as_label()` returning a short stable snake_case label
//! for logs and events.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the orchid runtime.
///
/// These represent failures in the orchestration system itself, such as a
/// shutdown drain exceeding its grace period.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some petitions remained live.
    #[error("shutdown grace {grace:?} exceeded; live petitions: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Identifiers of petitions that did not finish in time.
        stuck: Vec<String>,
    },

    /// The processor loop was started twice on the same orchestrator.
    #[error("processor already running")]
    AlreadyRunning,

    /// OS signal listener registration failed.
    #[error("signal registration failed: {0}")]
    Signal(#[from] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::AlreadyRunning => "runtime_already_running",
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }
}

/// # Errors produced by petition actions.
///
/// These represent failures of a single petition's work. A failed action
/// never takes the orchestrator down: the petition is marked broken, routed
/// through the ordinary finish path, and its client channel is closed.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PetitionError {
    /// The worker process could not be spawned.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// I/O failure while streaming worker output.
    #[error("worker i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// Action-specific failure with a human-readable message.
    #[error("action failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Action observed cancellation and stopped early.
    #[error("action cancelled")]
    Cancelled,
}

impl PetitionError {
    /// Returns a short stable label (snake_case) for use in logs/events.
    pub fn as_label(&self) -> &'static str {
        match self {
            PetitionError::Spawn(_) => "petition_spawn",
            PetitionError::Io(_) => "petition_io",
            PetitionError::Fail { .. } => "petition_failed",
            PetitionError::Cancelled => "petition_cancelled",
        }
    }

    /// Builds a [`PetitionError::Fail`] from any displayable error.
    pub fn fail(error: impl std::fmt::Display) -> Self {
        PetitionError::Fail {
            error: error.to_string(),
        }
    }
}

/// # Invalid petition lifecycle transition.
///
/// The state machine rejects movements not present in its transition table
/// (e.g. `Finished → Running`). Callers log the error and keep the current
/// state; an invalid transition never panics the processor loop.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid petition state transition [{from} --X-> {to}]")]
pub struct StateError {
    /// State the petition was in.
    pub from: crate::petitions::PetitionState,
    /// State the caller attempted to move to.
    pub to: crate::petitions::PetitionState,
}

/// # Errors produced by the client/server transport.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TransportError {
    /// Underlying socket failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The shared-key digest check failed; connection refused.
    #[error("authentication failed")]
    Unauthorized,

    /// Peer sent a frame that does not decode as the expected message.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Peer closed the connection before the exchange completed.
    #[error("connection closed by peer")]
    Closed,
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs/events.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Io(_) => "transport_io",
            TransportError::Unauthorized => "transport_unauthorized",
            TransportError::Malformed(_) => "transport_malformed",
            TransportError::Closed => "transport_closed",
        }
    }
}
