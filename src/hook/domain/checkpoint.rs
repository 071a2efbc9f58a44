//! Step checkpoints and the snapshots they carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(Uuid);

impl CheckpointId {
    /// Creates a new random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for CheckpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Milestone that caused a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointTrigger {
    /// Requested explicitly.
    Manual,
    /// After a commit.
    PostCommit,
    /// After a push.
    PostPush,
    /// After a pull request was opened.
    PostPr,
    /// After validation passed.
    PostValidation,
    /// After a step completed.
    StepComplete,
    /// Periodic, e.g. once per loop iteration.
    Interval,
}

/// Version-control state at checkpoint time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSnapshot {
    /// Checked-out branch.
    pub branch: String,
    /// Head commit.
    pub commit: String,
    /// Whether the working tree had uncommitted changes.
    pub dirty: bool,
}

/// Fingerprint of one touched file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    /// Path relative to the working directory.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mod_time: Option<DateTime<Utc>>,
    /// First 16 hex characters of the SHA-256 of the contents.
    #[serde(default)]
    pub content_hash: String,
    /// Whether the file existed.
    pub exists: bool,
}

impl FileSnapshot {
    /// Records a file that no longer exists.
    #[must_use]
    pub fn missing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: 0,
            mod_time: None,
            content_hash: String::new(),
            exists: false,
        }
    }
}

/// Restorable record of step progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCheckpoint {
    /// Checkpoint identifier.
    pub checkpoint_id: CheckpointId,
    /// When the checkpoint was taken.
    pub created_at: DateTime<Utc>,
    /// Step the checkpoint belongs to.
    pub step_name: String,
    /// Index of that step.
    pub step_index: usize,
    /// Human description.
    pub description: String,
    /// What caused the checkpoint.
    pub trigger: CheckpointTrigger,
    /// Version-control state, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitSnapshot>,
    /// Artifact paths produced up to this point.
    #[serde(default)]
    pub artifacts: Vec<String>,
    /// Touched-file fingerprints.
    #[serde(default)]
    pub files: Vec<FileSnapshot>,
}
