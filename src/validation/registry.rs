//! Live validation process bookkeeping.

use crate::task::domain::TaskId;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

/// Owned map of running validation PIDs per task.
///
/// The task record keeps a persisted copy of the same set; this registry is
/// the in-process view used for cancellation and abandon.
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<Mutex<HashMap<TaskId, BTreeSet<u32>>>>,
}

impl ProcessRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a started process. Returns `false` if already recorded.
    pub fn add(&self, task_id: TaskId, pid: u32) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entry(task_id).or_default().insert(pid)
    }

    /// Forgets a process. Returns `false` if it was not recorded.
    pub fn remove(&self, task_id: TaskId, pid: u32) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(pids) = inner.get_mut(&task_id) else {
            return false;
        };
        let removed = pids.remove(&pid);
        if pids.is_empty() {
            inner.remove(&task_id);
        }
        removed
    }

    /// Returns the recorded processes of a task.
    #[must_use]
    pub fn pids(&self, task_id: TaskId) -> Vec<u32> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .get(&task_id)
            .map(|pids| pids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Forgets and returns every process of a task.
    pub fn take(&self, task_id: TaskId) -> Vec<u32> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .remove(&task_id)
            .map(|pids| pids.into_iter().collect())
            .unwrap_or_default()
    }
}
