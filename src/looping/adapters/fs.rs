//! File-backed loop state store writing `tasks/<id>/loop-<index>.json`.

use async_trait::async_trait;
use tracing::debug;

use crate::looping::{
    domain::LoopState,
    ports::{LoopStateStore, LoopStoreError, LoopStoreResult},
};
use crate::storage::{TaskLayout, WorkspaceDir, run_blocking};
use crate::task::domain::TaskId;

/// Loop state store keeping one durable record per loop step.
#[derive(Debug, Clone)]
pub struct FsLoopStateStore {
    workspace: WorkspaceDir,
}

impl FsLoopStateStore {
    /// Creates a store rooted at `workspace`.
    #[must_use]
    pub const fn new(workspace: WorkspaceDir) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl LoopStateStore for FsLoopStateStore {
    async fn save(&self, state: &LoopState) -> LoopStoreResult<()> {
        let workspace = self.workspace.clone();
        let state = state.clone();
        let (task_id, step_index, iteration) =
            (state.task_id, state.step_index, state.current_iteration);
        run_blocking(move || {
            let path = TaskLayout::new(state.task_id).loop_state_file(state.step_index);
            workspace.write_json(&path, &state)
        })
        .await
        .map_err(LoopStoreError::persistence)?;
        debug!(%task_id, step_index, iteration, "loop state saved");
        Ok(())
    }

    async fn load(&self, task_id: TaskId, step_index: usize) -> LoopStoreResult<Option<LoopState>> {
        let workspace = self.workspace.clone();
        run_blocking(move || {
            workspace.read_json(&TaskLayout::new(task_id).loop_state_file(step_index))
        })
        .await
        .map_err(LoopStoreError::persistence)
    }
}
