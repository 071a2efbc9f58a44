//! Closed task status set and the attention classifier.

use super::ParseTaskStatusError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version of the status enumeration persisted alongside task records.
///
/// Bump whenever a variant is added, removed, or renamed.
pub const STATUS_SCHEMA_VERSION: u32 = 1;

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task has been created but no step has started.
    Pending,
    /// A step is executing.
    Running,
    /// Validation commands are executing.
    Validating,
    /// Validation failed and the retry budget is exhausted.
    ValidationFailed,
    /// Task is waiting for a human decision.
    AwaitingApproval,
    /// Task finished successfully.
    Completed,
    /// Task was rejected by a reviewer.
    Rejected,
    /// Task was abandoned.
    Abandoned,
    /// A GitHub operation (push, PR creation) failed.
    GhFailed,
    /// CI reported a failure.
    CiFailed,
    /// CI did not report within its deadline.
    CiTimeout,
    /// Execution stopped mid-step (cancellation or crash).
    Interrupted,
}

/// Statuses that require human attention.
///
/// This set is closed: outer layers sort and alert on it, so it must never
/// be derived heuristically.
pub const ATTENTION_STATUSES: [TaskStatus; 5] = [
    TaskStatus::ValidationFailed,
    TaskStatus::AwaitingApproval,
    TaskStatus::GhFailed,
    TaskStatus::CiFailed,
    TaskStatus::CiTimeout,
];

impl TaskStatus {
    /// Every status, in declaration order.
    pub const ALL: [Self; 12] = [
        Self::Pending,
        Self::Running,
        Self::Validating,
        Self::ValidationFailed,
        Self::AwaitingApproval,
        Self::Completed,
        Self::Rejected,
        Self::Abandoned,
        Self::GhFailed,
        Self::CiFailed,
        Self::CiTimeout,
        Self::Interrupted,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Validating => "validating",
            Self::ValidationFailed => "validation_failed",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Abandoned => "abandoned",
            Self::GhFailed => "gh_failed",
            Self::CiFailed => "ci_failed",
            Self::CiTimeout => "ci_timeout",
            Self::Interrupted => "interrupted",
        }
    }

    /// Returns whether the status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Abandoned)
    }

    /// Returns whether the status requires human attention.
    #[must_use]
    pub const fn needs_attention(self) -> bool {
        matches!(
            self,
            Self::ValidationFailed
                | Self::AwaitingApproval
                | Self::GhFailed
                | Self::CiFailed
                | Self::CiTimeout
        )
    }

    /// Returns whether transition to `target` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Running | Self::Abandoned)
                | (
                    Self::Running,
                    Self::Validating
                        | Self::ValidationFailed
                        | Self::AwaitingApproval
                        | Self::GhFailed
                        | Self::CiFailed
                        | Self::CiTimeout
                        | Self::Interrupted
                        | Self::Completed
                        | Self::Abandoned
                )
                | (
                    Self::Validating,
                    Self::Running
                        | Self::ValidationFailed
                        | Self::AwaitingApproval
                        | Self::Interrupted
                        | Self::Abandoned
                )
                | (
                    Self::ValidationFailed
                        | Self::GhFailed
                        | Self::CiFailed
                        | Self::CiTimeout
                        | Self::Interrupted,
                    Self::Running | Self::Abandoned
                )
                | (
                    Self::AwaitingApproval,
                    Self::Running | Self::Completed | Self::Rejected | Self::Abandoned
                )
        )
    }
}

/// Returns whether a raw status value requires human attention.
///
/// Unknown and empty values never do.
#[must_use]
pub fn needs_attention(status: &str) -> bool {
    TaskStatus::try_from(status).is_ok_and(TaskStatus::needs_attention)
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = ParseTaskStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| ParseTaskStatusError(value.to_owned()))
    }
}
