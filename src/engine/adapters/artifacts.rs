//! Artifact stores: in-memory and under `tasks/<id>/artifacts/`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::engine::ports::{ArtifactError, ArtifactStore, is_valid_artifact_name};
use crate::storage::{TaskLayout, WorkspaceDir, run_blocking};
use crate::task::domain::{TaskId, WorkspaceName};

fn checked(filename: &str) -> Result<(), ArtifactError> {
    if is_valid_artifact_name(filename) {
        Ok(())
    } else {
        Err(ArtifactError::InvalidName(filename.to_owned()))
    }
}

/// Thread-safe in-memory artifact store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifactStore {
    blobs: Arc<RwLock<HashMap<(TaskId, String), Vec<u8>>>>,
}

impl InMemoryArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(err: impl ToString) -> ArtifactError {
    ArtifactError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn save(
        &self,
        _workspace: &WorkspaceName,
        task_id: TaskId,
        filename: &str,
        bytes: &[u8],
    ) -> Result<String, ArtifactError> {
        checked(filename)?;
        let mut blobs = self.blobs.write().map_err(poisoned)?;
        blobs.insert((task_id, filename.to_owned()), bytes.to_vec());
        Ok(TaskLayout::new(task_id)
            .artifact_file(filename)
            .display()
            .to_string())
    }

    async fn load(&self, task_id: TaskId, filename: &str) -> Result<Option<Vec<u8>>, ArtifactError> {
        checked(filename)?;
        let blobs = self.blobs.read().map_err(poisoned)?;
        Ok(blobs.get(&(task_id, filename.to_owned())).cloned())
    }
}

/// Artifact store writing atomically under the workspace root.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    workspace: WorkspaceDir,
}

impl FsArtifactStore {
    /// Creates a store rooted at `workspace`.
    #[must_use]
    pub const fn new(workspace: WorkspaceDir) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn save(
        &self,
        workspace: &WorkspaceName,
        task_id: TaskId,
        filename: &str,
        bytes: &[u8],
    ) -> Result<String, ArtifactError> {
        checked(filename)?;
        let path = TaskLayout::new(task_id).artifact_file(filename);
        let dir = self.workspace.clone();
        let target = path.clone();
        let bytes = bytes.to_vec();
        let len = bytes.len();
        run_blocking(move || dir.write_atomic(&target, &bytes))
            .await
            .map_err(ArtifactError::persistence)?;
        debug!(%workspace, %task_id, filename, bytes = len, "artifact saved");
        Ok(path.display().to_string())
    }

    async fn load(&self, task_id: TaskId, filename: &str) -> Result<Option<Vec<u8>>, ArtifactError> {
        checked(filename)?;
        let dir = self.workspace.clone();
        let path = TaskLayout::new(task_id).artifact_file(filename);
        run_blocking(move || dir.read_bytes(&path))
            .await
            .map_err(ArtifactError::persistence)
    }
}
