//! # OS-process petition.
//!
//! [`ProcessPetition`] runs a command as a separate OS process in its own
//! process group, streams merged stdout/stderr lines back to the owning
//! client and delivers the exit code as the final frame.
//!
//! Running each petition in a dedicated process keeps the orchestrator
//! isolated from worker crashes and makes cancellation a signal-delivery
//! problem: [`ProcessPetition::terminate`] sends the configured signal to
//! the recorded pid, or to the whole process group when
//! `kill_process_group` is set.
//!
//! ## Rules
//! - The child is spawned with `process_group(0)` so group signalling
//!   reaches every descendant.
//! - `ESRCH` (no such process) counts as successful termination — the
//!   worker may already be gone.
//! - `EPERM` is a failure and is reported to the caller.

use std::process::Stdio;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::PetitionError;
use crate::petitions::handle::ActionContext;
use crate::petitions::petition::{
    Counters, Petition, PetitionId, PetitionRef, Priority, WorkerPid,
};

/// Petition that runs an OS command and signals it on cancellation.
pub struct ProcessPetition {
    id: PetitionId,
    priority: Priority,
    program: String,
    args: Vec<String>,
    signal: Signal,
    kill_process_group: bool,
    max_running: Option<usize>,
}

impl ProcessPetition {
    /// Creates a petition running `program` with `args`.
    ///
    /// Defaults: `SIGTERM` on cancellation, single-pid delivery, no
    /// admission limit.
    pub fn new(
        id: impl Into<PetitionId>,
        priority: Priority,
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id: id.into(),
            priority,
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            signal: Signal::SIGTERM,
            kill_process_group: false,
            max_running: None,
        }
    }

    /// Sets the signal delivered on cancellation.
    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = signal;
        self
    }

    /// Delivers the cancellation signal to the whole process group.
    pub fn with_process_group(mut self) -> Self {
        self.kill_process_group = true;
        self
    }

    /// Caps admission: the petition starts only while fewer than `slots`
    /// petitions are running.
    pub fn with_slots(mut self, slots: usize) -> Self {
        self.max_running = Some(slots);
        self
    }

    /// Finishes the builder as a shared [`PetitionRef`].
    pub fn arc(self) -> PetitionRef {
        std::sync::Arc::new(self)
    }
}

#[async_trait]
impl Petition for ProcessPetition {
    fn id(&self) -> &PetitionId {
        &self.id
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn condition(&self, counters: &Counters) -> bool {
        match self.max_running {
            Some(slots) => counters.running < slots,
            None => true,
        }
    }

    async fn execute(&self, ctx: ActionContext) -> Result<(), PetitionError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(PetitionError::Spawn)?;
        if let Some(pid) = child.id() {
            ctx.report_pid(pid as WorkerPid);
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut out_lines = stdout.map(|s| BufReader::new(s).lines());
        let mut err_lines = stderr.map(|s| BufReader::new(s).lines());

        // Drain both pipes until EOF; the child decides interleaving.
        let mut out_done = out_lines.is_none();
        let mut err_done = err_lines.is_none();
        while !(out_done && err_done) {
            tokio::select! {
                line = read_next(&mut out_lines), if !out_done => match line? {
                    Some(l) => ctx.line(l),
                    None => out_done = true,
                },
                line = read_next(&mut err_lines), if !err_done => match line? {
                    Some(l) => ctx.line(l),
                    None => err_done = true,
                },
            }
        }

        let status = child.wait().await?;
        let code = status.code();
        debug!(id = %self.id, ?code, "worker exited");
        ctx.done(code);
        Ok(())
    }

    fn terminate(&self, pid: Option<WorkerPid>) -> bool {
        let Some(pid) = pid.filter(|p| *p > 0) else {
            warn!(id = %self.id, "terminate requested before a pid was recorded");
            return false;
        };

        let target = if self.kill_process_group {
            Pid::from_raw(-pid)
        } else {
            Pid::from_raw(pid)
        };

        match signal::kill(target, self.signal) {
            Ok(()) => true,
            // Already dead is fine; the worker finished on its own.
            Err(Errno::ESRCH) => true,
            Err(err) => {
                warn!(id = %self.id, pid, %err, "failed to signal worker");
                false
            }
        }
    }
}

async fn read_next(
    lines: &mut Option<tokio::io::Lines<BufReader<impl tokio::io::AsyncRead + Unpin>>>,
) -> Result<Option<String>, PetitionError> {
    match lines {
        Some(l) => Ok(l.next_line().await?),
        None => Ok(None),
    }
}
