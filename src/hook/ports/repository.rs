//! Repository port for hook records.

use crate::hook::domain::Hook;
use crate::task::domain::TaskId;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for hook repository operations.
pub type HookRepositoryResult<T> = Result<T, HookRepositoryError>;

/// Hook persistence contract.
///
/// Implementations must make [`HookRepository::save`] durable before
/// returning: callers proceed on the assumption that the record survives a
/// crash.
#[async_trait]
pub trait HookRepository: Send + Sync {
    /// Creates or replaces the hook of its task.
    async fn save(&self, hook: &Hook) -> HookRepositoryResult<()>;

    /// Finds the hook of a task.
    ///
    /// Returns `None` when the task has no hook.
    async fn find(&self, task_id: TaskId) -> HookRepositoryResult<Option<Hook>>;

    /// Returns every stored hook.
    async fn list(&self) -> HookRepositoryResult<Vec<Hook>>;

    /// Loads a hook that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`HookRepositoryError::NotFound`] when the task has no hook.
    async fn load(&self, task_id: TaskId) -> HookRepositoryResult<Hook> {
        self.find(task_id)
            .await?
            .ok_or(HookRepositoryError::NotFound(task_id))
    }
}

/// Errors returned by hook repository implementations.
#[derive(Debug, Clone, Error)]
pub enum HookRepositoryError {
    /// No hook exists for the task.
    #[error("hook not found for task {0}")]
    NotFound(TaskId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl HookRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
