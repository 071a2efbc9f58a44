//! Runner for git, CI, design and verification steps.

use crate::hook::domain::CheckpointTrigger;
use crate::task::domain::{StepType, TaskId, WorkspaceName};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// One external step attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRequest {
    /// Owning task.
    pub task_id: TaskId,
    /// Owning workspace.
    pub workspace: WorkspaceName,
    /// Step name.
    pub step_name: String,
    /// Step index.
    pub step_index: usize,
    /// Step kind.
    pub step_type: StepType,
    /// Attempt number, starting at one.
    pub attempt: u32,
    /// Working directory.
    pub workdir: PathBuf,
    /// Time limit for the attempt.
    pub timeout: Duration,
    /// Commands configured on the step.
    pub commands: Vec<String>,
}

/// CI verdict reported by CI steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CiVerdict {
    /// CI passed.
    Passed,
    /// CI reported a failure.
    Failed,
    /// CI did not report in time.
    TimedOut,
}

/// Result of an external step attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutcome {
    /// Whether the step succeeded.
    pub success: bool,
    /// Captured output.
    pub output: String,
    /// Failure description.
    pub error: Option<String>,
    /// Files the step changed.
    pub files_changed: Vec<String>,
    /// CI verdict, for CI steps.
    pub ci_verdict: Option<CiVerdict>,
    /// Checkpoint to take after success, e.g. after a commit or push.
    pub checkpoint: Option<CheckpointTrigger>,
}

/// Errors raised when an external step cannot run at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExternalStepError {
    /// No runner handles this step type.
    #[error("no runner for {0} steps")]
    Unsupported(StepType),
    /// The runner failed before producing an outcome.
    #[error("external step failed: {0}")]
    Failed(String),
}

/// Runs steps that are carried out by external tools.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExternalStepRunner: Send + Sync {
    /// Runs one attempt.
    async fn run(
        &self,
        request: StepRequest,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, ExternalStepError>;
}
