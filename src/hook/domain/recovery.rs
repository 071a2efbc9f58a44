//! Crash diagnosis records.

use super::{CheckpointId, HookState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the previous run most likely ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashType {
    /// The step outlived its timeout.
    Timeout,
    /// The orchestrator was killed by a signal.
    Signal,
    /// No evidence either way.
    Unknown,
}

/// Recovery action recommended after a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Run the interrupted step again.
    RetryStep,
    /// Mark the interrupted step skipped and move on.
    SkipStep,
    /// Resume from the most recent checkpoint.
    RetryFromCheckpoint,
    /// Leave the decision to a human.
    Manual,
}

impl RecoveryAction {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RetryStep => "retry_step",
            Self::SkipStep => "skip_step",
            Self::RetryFromCheckpoint => "retry_from_checkpoint",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnosis attached to a hook while it is recovering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryContext {
    /// When the crash was detected.
    pub detected_at: DateTime<Utc>,
    /// Likely cause.
    pub crash_type: CrashType,
    /// State the hook was in when the previous run stopped.
    pub last_known_state: HookState,
    /// Whether validation commands may still have been running.
    pub validation_in_flight: bool,
    /// Validation PIDs recorded by the previous run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stale_pids: Vec<u32>,
    /// Recommended action.
    pub recommended_action: RecoveryAction,
    /// Why the action was chosen.
    pub reason: String,
    /// Checkpoint to resume from for [`RecoveryAction::RetryFromCheckpoint`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<CheckpointId>,
}
