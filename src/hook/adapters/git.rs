//! `git` command-line inspector.

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

use crate::hook::{
    domain::GitSnapshot,
    ports::{VcsError, VcsInspector},
};

/// Reads working-tree state by shelling out to `git`.
#[derive(Debug, Clone, Default)]
pub struct GitCliInspector;

impl GitCliInspector {
    /// Creates an inspector using the `git` on `PATH`.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

async fn git(workdir: &Path, args: &[&str]) -> Result<String, VcsError> {
    let command = format!("git {}", args.join(" "));
    let output = Command::new("git")
        .args(args)
        .current_dir(workdir)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|err| VcsError::Spawn {
            command: command.clone(),
            message: err.to_string(),
        })?;
    if !output.status.success() {
        return Err(VcsError::Failed {
            command,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

#[async_trait]
impl VcsInspector for GitCliInspector {
    async fn snapshot(&self, workdir: &Path) -> Result<GitSnapshot, VcsError> {
        let branch = git(workdir, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        let commit = git(workdir, &["rev-parse", "HEAD"]).await?;
        let status = git(workdir, &["status", "--porcelain"]).await?;
        Ok(GitSnapshot {
            branch,
            commit,
            dirty: !status.is_empty(),
        })
    }
}
