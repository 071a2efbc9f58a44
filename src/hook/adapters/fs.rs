//! File-backed hook repository storing `tasks/<id>/hook.json`.

use async_trait::async_trait;
use tracing::debug;

use crate::hook::{
    domain::Hook,
    ports::{HookRepository, HookRepositoryError, HookRepositoryResult},
};
use crate::storage::{TaskLayout, WorkspaceDir, run_blocking};
use crate::task::domain::TaskId;

/// Hook repository writing one durable JSON record per task.
#[derive(Debug, Clone)]
pub struct FsHookRepository {
    workspace: WorkspaceDir,
}

impl FsHookRepository {
    /// Creates a repository rooted at `workspace`.
    #[must_use]
    pub const fn new(workspace: WorkspaceDir) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl HookRepository for FsHookRepository {
    async fn save(&self, hook: &Hook) -> HookRepositoryResult<()> {
        let workspace = self.workspace.clone();
        let hook = hook.clone();
        let task_id = hook.task_id();
        run_blocking(move || workspace.write_json(&TaskLayout::new(task_id).hook_file(), &hook))
            .await
            .map_err(HookRepositoryError::persistence)?;
        debug!(%task_id, "hook saved");
        Ok(())
    }

    async fn find(&self, task_id: TaskId) -> HookRepositoryResult<Option<Hook>> {
        let workspace = self.workspace.clone();
        run_blocking(move || workspace.read_json(&TaskLayout::new(task_id).hook_file()))
            .await
            .map_err(HookRepositoryError::persistence)
    }

    async fn list(&self) -> HookRepositoryResult<Vec<Hook>> {
        let workspace = self.workspace.clone();
        let mut hooks = run_blocking(move || {
            let mut hooks = Vec::new();
            for id in workspace.task_ids()? {
                if let Some(hook) = workspace.read_json::<Hook>(&TaskLayout::new(id).hook_file())? {
                    hooks.push(hook);
                }
            }
            Ok(hooks)
        })
        .await
        .map_err(HookRepositoryError::persistence)?;
        hooks.sort_by_key(|hook| (hook.created_at(), hook.task_id()));
        Ok(hooks)
    }
}
