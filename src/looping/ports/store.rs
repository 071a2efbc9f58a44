//! Persistence port for loop state.

use crate::looping::domain::LoopState;
use crate::task::domain::TaskId;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for loop state persistence.
pub type LoopStoreResult<T> = Result<T, LoopStoreError>;

/// Durable storage of [`LoopState`], one record per loop step.
#[async_trait]
pub trait LoopStateStore: Send + Sync {
    /// Creates or replaces the state of `(state.task_id, state.step_index)`.
    async fn save(&self, state: &LoopState) -> LoopStoreResult<()>;

    /// Loads the state of a loop step, if it ever ran.
    async fn load(&self, task_id: TaskId, step_index: usize) -> LoopStoreResult<Option<LoopState>>;
}

/// Errors returned by loop state stores.
#[derive(Debug, Clone, Error)]
pub enum LoopStoreError {
    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl LoopStoreError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
