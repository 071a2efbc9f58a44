//! Checkpoint capture.

use crate::hook::{
    domain::{CheckpointId, CheckpointTrigger, FileSnapshot, Hook, StepCheckpoint},
    ports::{HookRepository, HookRepositoryError, VcsError, VcsInspector},
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Number of hex characters kept from a file's SHA-256.
pub const FINGERPRINT_LEN: usize = 16;

/// Returns the truncated SHA-256 fingerprint of `bytes`.
#[must_use]
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hex = format!("{:x}", Sha256::digest(bytes));
    hex.truncate(FINGERPRINT_LEN);
    hex
}

/// Parameters for one checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointRequest {
    step_name: String,
    step_index: usize,
    description: String,
    trigger: CheckpointTrigger,
    workdir: Option<PathBuf>,
    artifacts: Vec<String>,
    files: Vec<String>,
}

impl CheckpointRequest {
    /// Creates a request without git state, artifacts or files.
    #[must_use]
    pub fn new(
        step_name: impl Into<String>,
        step_index: usize,
        trigger: CheckpointTrigger,
        description: impl Into<String>,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            step_index,
            description: description.into(),
            trigger,
            workdir: None,
            artifacts: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Captures git state and resolves file paths relative to `workdir`.
    #[must_use]
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    /// Records artifact paths.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: impl IntoIterator<Item = String>) -> Self {
        self.artifacts = artifacts.into_iter().collect();
        self
    }

    /// Fingerprints the given files.
    #[must_use]
    pub fn with_files(mut self, files: impl IntoIterator<Item = String>) -> Self {
        self.files = files.into_iter().collect();
        self
    }
}

/// Errors raised while creating checkpoints.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Git state could not be read.
    #[error(transparent)]
    Vcs(#[from] VcsError),

    /// A touched file could not be fingerprinted.
    #[error("failed to fingerprint {path}: {source}")]
    Fingerprint {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The hook could not be saved.
    #[error(transparent)]
    Repository(#[from] HookRepositoryError),
}

/// Captures checkpoints and makes them durable.
#[derive(Clone)]
pub struct CheckpointService<R, V, C>
where
    R: HookRepository,
    V: VcsInspector + ?Sized,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    vcs: Arc<V>,
    clock: Arc<C>,
}

impl<R, V, C> CheckpointService<R, V, C>
where
    R: HookRepository,
    V: VcsInspector + ?Sized,
    C: Clock + Send + Sync,
{
    /// Creates a checkpoint service.
    #[must_use]
    pub const fn new(repository: Arc<R>, vcs: Arc<V>, clock: Arc<C>) -> Self {
        Self {
            repository,
            vcs,
            clock,
        }
    }

    /// Builds a checkpoint without storing it.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] when git state or a file cannot be read.
    pub async fn capture(&self, request: CheckpointRequest) -> Result<StepCheckpoint, CheckpointError> {
        let git = match &request.workdir {
            Some(workdir) => Some(self.vcs.snapshot(workdir).await?),
            None => None,
        };
        let mut files = Vec::with_capacity(request.files.len());
        for path in &request.files {
            files.push(snapshot_file(request.workdir.as_deref(), path).await?);
        }
        Ok(StepCheckpoint {
            checkpoint_id: CheckpointId::new(),
            created_at: self.clock.utc(),
            step_name: request.step_name,
            step_index: request.step_index,
            description: request.description,
            trigger: request.trigger,
            git,
            artifacts: request.artifacts,
            files,
        })
    }

    /// Captures a checkpoint, adds it to `hook` and saves the hook.
    ///
    /// The hook is left unchanged when capture fails.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] when capture or saving fails.
    pub async fn create(
        &self,
        hook: &mut Hook,
        request: CheckpointRequest,
    ) -> Result<CheckpointId, CheckpointError> {
        let checkpoint = self.capture(request).await?;
        let id = checkpoint.checkpoint_id;
        let trigger = checkpoint.trigger;
        hook.add_checkpoint(checkpoint, &*self.clock);
        self.repository.save(hook).await?;
        debug!(task_id = %hook.task_id(), checkpoint_id = %id, ?trigger, "checkpoint created");
        Ok(id)
    }
}

async fn snapshot_file(workdir: Option<&Path>, path: &str) -> Result<FileSnapshot, CheckpointError> {
    let full = workdir.map_or_else(|| PathBuf::from(path), |dir| dir.join(path));
    let bytes = match tokio::fs::read(&full).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(FileSnapshot::missing(path)),
        Err(source) => return Err(CheckpointError::Fingerprint { path: full, source }),
    };
    let mod_time = tokio::fs::metadata(&full)
        .await
        .and_then(|meta| meta.modified())
        .ok()
        .map(DateTime::<Utc>::from);
    Ok(FileSnapshot {
        path: path.to_owned(),
        size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
        mod_time,
        content_hash: fingerprint(&bytes),
        exists: true,
    })
}
