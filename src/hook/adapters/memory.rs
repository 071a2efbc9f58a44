//! In-memory hook repository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::hook::{
    domain::Hook,
    ports::{HookRepository, HookRepositoryError, HookRepositoryResult},
};
use crate::task::domain::TaskId;

/// Thread-safe in-memory hook repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHookRepository {
    hooks: Arc<RwLock<HashMap<TaskId, Hook>>>,
}

impl InMemoryHookRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(err: impl ToString) -> HookRepositoryError {
    HookRepositoryError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl HookRepository for InMemoryHookRepository {
    async fn save(&self, hook: &Hook) -> HookRepositoryResult<()> {
        let mut hooks = self.hooks.write().map_err(poisoned)?;
        hooks.insert(hook.task_id(), hook.clone());
        Ok(())
    }

    async fn find(&self, task_id: TaskId) -> HookRepositoryResult<Option<Hook>> {
        let hooks = self.hooks.read().map_err(poisoned)?;
        Ok(hooks.get(&task_id).cloned())
    }

    async fn list(&self) -> HookRepositoryResult<Vec<Hook>> {
        let hooks = self.hooks.read().map_err(poisoned)?;
        let mut all: Vec<Hook> = hooks.values().cloned().collect();
        all.sort_by_key(|hook| (hook.created_at(), hook.task_id()));
        Ok(all)
    }
}
