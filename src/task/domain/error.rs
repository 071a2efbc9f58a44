//! Error types for task domain validation and parsing.

use super::{TaskId, TaskStatus};
use thiserror::Error;

/// Errors returned while constructing or mutating domain task values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// The workspace name is empty after trimming.
    #[error("workspace name must not be empty")]
    EmptyWorkspaceName,

    /// The workspace name contains characters outside `[a-z0-9_-]`.
    #[error("invalid workspace name '{0}', expected lowercase alphanumerics, '-' or '_'")]
    InvalidWorkspaceName(String),

    /// The template name is empty after trimming.
    #[error("template name must not be empty")]
    EmptyTemplateName,

    /// A task was defined without steps.
    #[error("task must define at least one step")]
    NoSteps,

    /// A step name is empty after trimming.
    #[error("step name must not be empty")]
    EmptyStepName,

    /// The task status is terminal and cannot change without an override.
    #[error("task {task_id} is in terminal status {status}")]
    TerminalStatus {
        /// Task identifier.
        task_id: TaskId,
        /// Current terminal status.
        status: TaskStatus,
    },

    /// The requested status transition is not in the transition table.
    #[error("invalid task status transition for {task_id}: {from} -> {to}")]
    InvalidStateTransition {
        /// Task identifier.
        task_id: TaskId,
        /// Current status.
        from: TaskStatus,
        /// Requested status.
        to: TaskStatus,
    },

    /// A step index does not address a step of the task.
    #[error("step index {index} out of range for task with {len} steps")]
    StepOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of steps.
        len: usize,
    },

    /// The step has used all of its attempts.
    #[error("step '{step}' exhausted its {limit} attempts")]
    RetryLimitExceeded {
        /// Step name.
        step: String,
        /// Attempt limit.
        limit: u32,
    },

    /// The task has no step left to run.
    #[error("task {0} has no remaining steps")]
    NoRemainingSteps(TaskId),
}

/// Error returned while parsing task statuses.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task status: {0}")]
pub struct ParseTaskStatusError(pub String);

/// Error returned while parsing step types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown step type: {0}")]
pub struct ParseStepTypeError(pub String);
