//! Record of one finished validation command.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a command run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// The process exited on its own.
    Exited,
    /// The process was killed after its timeout.
    TimedOut,
    /// The process was killed because the run was cancelled.
    Cancelled,
}

/// Raw evidence of a validation command run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRun {
    /// Command line as executed.
    pub command: String,
    /// Process identifier, when the process started.
    pub pid: Option<u32>,
    /// Exit code; `None` when killed by a signal.
    pub exit_code: Option<i32>,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time.
    pub completed_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandRun {
    /// Returns whether the command exited with status zero.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome == RunOutcome::Exited && self.exit_code == Some(0)
    }

    /// Exit code as recorded on receipts, `-1` when there is none.
    #[must_use]
    pub fn receipt_exit_code(&self) -> i32 {
        self.exit_code.unwrap_or(-1)
    }

    /// Summarises the failure for step results, or `None` on success.
    #[must_use]
    pub fn failure_message(&self) -> Option<String> {
        match self.outcome {
            RunOutcome::TimedOut => Some(format!("`{}` timed out", self.command)),
            RunOutcome::Cancelled => Some(format!("`{}` was cancelled", self.command)),
            RunOutcome::Exited if self.succeeded() => None,
            RunOutcome::Exited => Some(format!(
                "`{}` exited with code {}",
                self.command,
                self.receipt_exit_code()
            )),
        }
    }
}
