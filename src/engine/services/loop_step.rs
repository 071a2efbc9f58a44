//! Bridges loop checkpoints onto the task's hook.

use crate::hook::domain::CheckpointTrigger;
use crate::hook::ports::{HookRepository, VcsInspector};
use crate::hook::services::{CheckpointRequest, CheckpointService};
use crate::looping::domain::LoopState;
use crate::looping::ports::{LoopCheckpointError, LoopCheckpointer};
use async_trait::async_trait;
use mockable::Clock;
use std::path::PathBuf;
use std::sync::Arc;

/// Takes an interval checkpoint on the stored hook after each iteration.
pub(crate) struct HookLoopCheckpointer<H, C>
where
    H: HookRepository,
    C: Clock + Send + Sync,
{
    hooks: Arc<H>,
    checkpoints: Arc<CheckpointService<H, dyn VcsInspector, C>>,
    workdir: PathBuf,
}

impl<H, C> HookLoopCheckpointer<H, C>
where
    H: HookRepository,
    C: Clock + Send + Sync,
{
    pub(crate) const fn new(
        hooks: Arc<H>,
        checkpoints: Arc<CheckpointService<H, dyn VcsInspector, C>>,
        workdir: PathBuf,
    ) -> Self {
        Self {
            hooks,
            checkpoints,
            workdir,
        }
    }
}

#[async_trait]
impl<H, C> LoopCheckpointer for HookLoopCheckpointer<H, C>
where
    H: HookRepository,
    C: Clock + Send + Sync,
{
    async fn checkpoint(&self, state: &LoopState) -> Result<(), LoopCheckpointError> {
        let mut hook = self
            .hooks
            .load(state.task_id)
            .await
            .map_err(|err| LoopCheckpointError(err.to_string()))?;
        let files = state
            .last_iteration()
            .map(|iteration| iteration.files_changed.clone())
            .unwrap_or_default();
        let request = CheckpointRequest::new(
            state.step_name.clone(),
            state.step_index,
            CheckpointTrigger::Interval,
            format!("{} iteration {}", state.step_name, state.current_iteration),
        )
        .with_workdir(self.workdir.clone())
        .with_files(files);
        self.checkpoints
            .create(&mut hook, request)
            .await
            .map(|_| ())
            .map_err(|err| LoopCheckpointError(err.to_string()))
    }
}
