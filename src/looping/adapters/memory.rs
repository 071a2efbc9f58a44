//! In-memory loop state store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::looping::{
    domain::LoopState,
    ports::{LoopStateStore, LoopStoreError, LoopStoreResult},
};
use crate::task::domain::TaskId;

/// Thread-safe in-memory loop state store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLoopStateStore {
    states: Arc<RwLock<HashMap<(TaskId, usize), LoopState>>>,
}

impl InMemoryLoopStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(err: impl ToString) -> LoopStoreError {
    LoopStoreError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl LoopStateStore for InMemoryLoopStateStore {
    async fn save(&self, state: &LoopState) -> LoopStoreResult<()> {
        let mut states = self.states.write().map_err(poisoned)?;
        states.insert((state.task_id, state.step_index), state.clone());
        Ok(())
    }

    async fn load(&self, task_id: TaskId, step_index: usize) -> LoopStoreResult<Option<LoopState>> {
        let states = self.states.read().map_err(poisoned)?;
        Ok(states.get(&(task_id, step_index)).cloned())
    }
}
