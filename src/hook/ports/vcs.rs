//! Version-control inspection capability.

use crate::hook::domain::GitSnapshot;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors raised while inspecting a working tree.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VcsError {
    /// The inspection command could not be run.
    #[error("failed to run {command}: {message}")]
    Spawn {
        /// Command that failed.
        command: String,
        /// Error text.
        message: String,
    },

    /// The inspection command exited unsuccessfully.
    #[error("{command} exited with {status}: {stderr}")]
    Failed {
        /// Command that failed.
        command: String,
        /// Exit status text.
        status: String,
        /// Captured standard error.
        stderr: String,
    },
}

/// Reads branch, head commit and dirtiness of a working tree.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VcsInspector: Send + Sync {
    /// Captures the current state of the tree at `workdir`.
    async fn snapshot(&self, workdir: &Path) -> Result<GitSnapshot, VcsError>;
}
