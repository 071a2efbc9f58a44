//! Hook creation, transitions and receipt recording.

use crate::hook::{
    domain::{Hook, HookDomainError, HookState, ValidationReceipt},
    ports::{HookRepository, HookRepositoryError},
};
use crate::task::domain::{Task, TaskId};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Service-level errors for hook operations.
#[derive(Debug, Error)]
pub enum HookServiceError {
    /// The state machine rejected the change.
    #[error(transparent)]
    Domain(#[from] HookDomainError),
    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] HookRepositoryError),
}

/// Result type for hook service operations.
pub type HookServiceResult<T> = Result<T, HookServiceError>;

/// Persists every hook change before returning.
#[derive(Clone)]
pub struct HookService<R, C>
where
    R: HookRepository,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    clock: Arc<C>,
}

impl<R, C> HookService<R, C>
where
    R: HookRepository,
    C: Clock + Send + Sync,
{
    /// Creates a hook service.
    #[must_use]
    pub const fn new(repository: Arc<R>, clock: Arc<C>) -> Self {
        Self { repository, clock }
    }

    /// Creates and saves the hook of a new task.
    ///
    /// # Errors
    ///
    /// Returns [`HookServiceError::Repository`] when saving fails.
    pub async fn create_for(&self, task: &Task) -> HookServiceResult<Hook> {
        let hook = Hook::new(task.id(), task.workspace().clone(), &*self.clock);
        self.repository.save(&hook).await?;
        info!(task_id = %task.id(), "hook created");
        Ok(hook)
    }

    /// Loads the hook of a task.
    ///
    /// # Errors
    ///
    /// Returns [`HookRepositoryError::NotFound`] when the task has no hook.
    pub async fn load(&self, task_id: TaskId) -> HookServiceResult<Hook> {
        Ok(self.repository.load(task_id).await?)
    }

    /// Applies a transition and saves the hook.
    ///
    /// # Errors
    ///
    /// Returns [`HookServiceError::Domain`] for rejected transitions, in
    /// which case nothing is saved.
    pub async fn transition(
        &self,
        hook: &mut Hook,
        to: HookState,
        trigger: &str,
    ) -> HookServiceResult<()> {
        let from = hook.state();
        hook.transition(to, trigger, &*self.clock)?;
        self.repository.save(hook).await?;
        info!(task_id = %hook.task_id(), %from, %to, trigger, "hook transition");
        Ok(())
    }

    /// Appends a receipt and saves the hook.
    ///
    /// # Errors
    ///
    /// Returns [`HookServiceError::Repository`] when saving fails.
    pub async fn append_receipt(
        &self,
        hook: &mut Hook,
        receipt: ValidationReceipt,
    ) -> HookServiceResult<()> {
        hook.append_receipt(receipt, &*self.clock);
        self.repository.save(hook).await?;
        Ok(())
    }

    /// Returns hooks that are not in a terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`HookServiceError::Repository`] when listing fails.
    pub async fn live_hooks(&self) -> HookServiceResult<Vec<Hook>> {
        let mut hooks = self.repository.list().await?;
        hooks.retain(|hook| !hook.is_terminal());
        Ok(hooks)
    }
}
