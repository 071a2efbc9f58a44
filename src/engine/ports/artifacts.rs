//! Artifact blob storage.

use crate::task::domain::{TaskId, WorkspaceName};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by artifact stores.
#[derive(Debug, Clone, Error)]
pub enum ArtifactError {
    /// The file name would escape the task's artifact directory.
    #[error("invalid artifact name '{0}'")]
    InvalidName(String),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl ArtifactError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}

/// Stores files produced by steps.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Saves `bytes` as `filename` for a task and returns where it landed.
    async fn save(
        &self,
        workspace: &WorkspaceName,
        task_id: TaskId,
        filename: &str,
        bytes: &[u8],
    ) -> Result<String, ArtifactError>;

    /// Loads a saved artifact.
    async fn load(&self, task_id: TaskId, filename: &str) -> Result<Option<Vec<u8>>, ArtifactError>;
}

/// Returns whether `filename` is a plain file name.
#[must_use]
pub fn is_valid_artifact_name(filename: &str) -> bool {
    !filename.is_empty()
        && filename != "."
        && filename != ".."
        && !filename.contains(['/', '\\'])
}
