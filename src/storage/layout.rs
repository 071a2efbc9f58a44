//! Per-task directory layout.

use crate::task::domain::TaskId;
use std::path::{Path, PathBuf};

/// Directory under the workspace root holding one directory per task.
pub const TASKS_DIR: &str = "tasks";
/// Task record file name.
pub const TASK_FILE: &str = "task.json";
/// Hook record file name.
pub const HOOK_FILE: &str = "hook.json";
/// Single-writer lock file name.
pub const LOCK_FILE: &str = ".lock";
/// Artifact directory name.
pub const ARTIFACTS_DIR: &str = "artifacts";

/// Relative paths of the records belonging to one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLayout {
    dir: PathBuf,
}

impl TaskLayout {
    /// Creates the layout for `task_id`.
    #[must_use]
    pub fn new(task_id: TaskId) -> Self {
        Self {
            dir: Path::new(TASKS_DIR).join(task_id.to_string()),
        }
    }

    /// Task directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Task record.
    #[must_use]
    pub fn task_file(&self) -> PathBuf {
        self.dir.join(TASK_FILE)
    }

    /// Hook record.
    #[must_use]
    pub fn hook_file(&self) -> PathBuf {
        self.dir.join(HOOK_FILE)
    }

    /// Writer lock.
    #[must_use]
    pub fn lock_file(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    /// Loop state for the loop step at `step_index`.
    #[must_use]
    pub fn loop_state_file(&self, step_index: usize) -> PathBuf {
        self.dir.join(format!("loop-{step_index}.json"))
    }

    /// Named artifact.
    #[must_use]
    pub fn artifact_file(&self, filename: &str) -> PathBuf {
        self.dir.join(ARTIFACTS_DIR).join(filename)
    }
}
