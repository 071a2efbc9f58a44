//! Subprocess execution for validation commands.

use super::{CommandRun, ProcessRegistry, RunOutcome};
use crate::task::domain::{Task, TaskId, TaskStatus};
use crate::task::ports::{TaskRepository, TaskRepositoryError};
use mockable::Clock;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Shell command line.
    pub command: String,
    /// Working directory.
    pub workdir: PathBuf,
    /// Time limit; the process is killed once it elapses.
    pub timeout: Duration,
}

impl CommandSpec {
    /// Describes one command to run.
    #[must_use]
    pub fn new(command: impl Into<String>, workdir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            workdir: workdir.into(),
            timeout,
        }
    }
}

/// Errors raised while running validation commands.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The process could not be started.
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        /// Command line.
        command: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Waiting on the process failed.
    #[error("failed to wait for `{command}`: {source}")]
    Wait {
        /// Command line.
        command: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The task was abandoned while the command ran; nothing was written.
    #[error("task {0} was abandoned during validation")]
    Abandoned(TaskId),

    /// The PID could not be recorded on the task.
    #[error(transparent)]
    Repository(#[from] TaskRepositoryError),
}

/// Runs validation commands and keeps the live-PID set in step with them.
///
/// The PID is written to the task record right after spawn and removed
/// right after the process ends, so a crash in between leaves a stale PID
/// for recovery to find. Neither write lands on a task that was abandoned
/// in the meantime.
pub struct ValidationRunner<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    registry: ProcessRegistry,
    clock: Arc<C>,
}

impl<R, C> ValidationRunner<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    /// Creates a runner.
    #[must_use]
    pub const fn new(repository: Arc<R>, registry: ProcessRegistry, clock: Arc<C>) -> Self {
        Self {
            repository,
            registry,
            clock,
        }
    }

    /// Returns the registry of live processes.
    #[must_use]
    pub const fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Runs one command to completion, timeout or cancellation.
    ///
    /// A non-zero exit is not an error; inspect the returned
    /// [`CommandRun`].
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the process cannot be started or
    /// awaited, or its PID cannot be persisted. Returns
    /// [`ValidationError::Abandoned`] when the stored task was abandoned
    /// before the PID could be recorded or released.
    pub async fn run(
        &self,
        task: &mut Task,
        spec: &CommandSpec,
        cancel: &CancellationToken,
    ) -> Result<CommandRun, ValidationError> {
        let started_at = self.clock.utc();
        let started = Instant::now();
        let mut child = shell(&spec.command)
            .current_dir(&spec.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ValidationError::Spawn {
                command: spec.command.clone(),
                source,
            })?;

        let pid = child.id();
        if let Some(pid) = pid {
            self.track(task, pid).await.inspect_err(|_| {
                if let Err(err) = child.start_kill() {
                    warn!(pid, %err, "failed to kill untracked validation process");
                }
            })?;
        }
        debug!(task_id = %task.id(), ?pid, command = %spec.command, "validation command started");

        let stdout = capture(child.stdout.take());
        let stderr = capture(child.stderr.take());
        let waited = wait(&mut child, spec.timeout, cancel).await;

        if let Some(pid) = pid {
            self.untrack(task, pid).await?;
        }
        let (exit_code, outcome) = waited.map_err(|source| ValidationError::Wait {
            command: spec.command.clone(),
            source,
        })?;

        let run = CommandRun {
            command: spec.command.clone(),
            pid,
            exit_code,
            outcome,
            started_at,
            completed_at: self.clock.utc(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            stdout: collect(stdout).await,
            stderr: collect(stderr).await,
        };
        info!(
            task_id = %task.id(),
            command = %run.command,
            ?exit_code,
            ?outcome,
            duration_ms = run.duration_ms,
            "validation command finished"
        );
        Ok(run)
    }

    async fn track(&self, task: &mut Task, pid: u32) -> Result<(), ValidationError> {
        self.registry.add(task.id(), pid);
        task.register_validation_pid(pid, &*self.clock);
        self.write_live(task).await
    }

    async fn untrack(&self, task: &mut Task, pid: u32) -> Result<(), ValidationError> {
        self.registry.remove(task.id(), pid);
        task.release_validation_pid(pid, &*self.clock);
        self.write_live(task).await
    }

    /// Writes `task` unless the stored copy has been abandoned.
    async fn write_live(&self, task: &Task) -> Result<(), ValidationError> {
        let stored = self.repository.load(task.id()).await?;
        if stored.status() == TaskStatus::Abandoned {
            warn!(task_id = %task.id(), "task abandoned during validation; not saving");
            return Err(ValidationError::Abandoned(task.id()));
        }
        self.repository.update(task).await?;
        Ok(())
    }
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(not(unix))]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

async fn wait(
    child: &mut Child,
    timeout: Duration,
    cancel: &CancellationToken,
) -> io::Result<(Option<i32>, RunOutcome)> {
    let outcome = tokio::select! {
        status = child.wait() => return status.map(|status| (status.code(), RunOutcome::Exited)),
        () = tokio::time::sleep(timeout) => RunOutcome::TimedOut,
        () = cancel.cancelled() => RunOutcome::Cancelled,
    };
    child.kill().await?;
    Ok((None, outcome))
}

fn capture<S>(stream: Option<S>) -> Option<JoinHandle<Vec<u8>>>
where
    S: AsyncRead + Unpin + Send + 'static,
{
    stream.map(|mut stream| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Err(err) = stream.read_to_end(&mut buf).await {
                debug!(%err, "validation output stream closed early");
            }
            buf
        })
    })
}

/// How long to keep reading output after the process ended. Grandchildren
/// of a killed shell can hold the pipes open indefinitely.
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

async fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    let Some(handle) = handle else {
        return String::new();
    };
    let abort = handle.abort_handle();
    match tokio::time::timeout(OUTPUT_GRACE, handle).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(_)) => String::new(),
        Err(_) => {
            abort.abort();
            String::new()
        }
    }
}
