//! Engine error type.

use crate::engine::ports::ArtifactError;
use crate::hook::domain::{HookDomainError, HookState};
use crate::hook::ports::HookRepositoryError;
use crate::hook::services::{CheckpointError, HookServiceError, LedgerError};
use crate::looping::ports::LoopStoreError;
use crate::looping::services::LoopError;
use crate::storage::LockError;
use crate::task::domain::{TaskDomainError, TaskId, TaskStatus};
use crate::task::ports::TaskRepositoryError;
use crate::task::services::TaskLifecycleError;
use crate::validation::ValidationError;
use thiserror::Error;

/// Errors that stop an engine operation.
///
/// Step failures are not errors; they are reported through
/// [`super::StepReport`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The task and hook are not in a state that allows the operation.
    #[error("task {task_id} cannot {operation} while {status} with hook {hook_state}")]
    NotRunnable {
        /// Task identifier.
        task_id: TaskId,
        /// Operation attempted.
        operation: &'static str,
        /// Task status.
        status: TaskStatus,
        /// Hook state.
        hook_state: HookState,
    },

    /// The task was abandoned while this operation was in flight. Nothing
    /// was written over the abandoned records.
    #[error("task {0} was abandoned mid-step")]
    Abandoned(TaskId),

    /// The hook carries no diagnosis to apply.
    #[error("task {0} has no recovery diagnosis")]
    NoDiagnosis(TaskId),

    /// The task state machine rejected a change.
    #[error(transparent)]
    Task(#[from] TaskDomainError),

    /// The hook state machine rejected a change.
    #[error(transparent)]
    Hook(#[from] HookDomainError),

    /// Task creation failed.
    #[error(transparent)]
    Lifecycle(#[from] TaskLifecycleError),

    /// Hook creation failed.
    #[error(transparent)]
    HookService(#[from] HookServiceError),

    /// Task persistence failed.
    #[error(transparent)]
    TaskRepository(#[from] TaskRepositoryError),

    /// Hook persistence failed.
    #[error(transparent)]
    HookRepository(#[from] HookRepositoryError),

    /// Another writer holds the task.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// A validation command could not be run.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A checkpoint could not be taken.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// A receipt could not be issued.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A loop step aborted.
    #[error(transparent)]
    Loop(#[from] LoopError),

    /// Loop state could not be read.
    #[error(transparent)]
    LoopStore(#[from] LoopStoreError),

    /// An artifact could not be stored.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// A prompt template failed to render.
    #[error("failed to render prompt: {0}")]
    Prompt(#[from] minijinja::Error),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
