//! Single-writer leases over task records.

#[cfg(unix)]
use super::{TaskLayout, WorkspaceDir};
use super::StorageError;
use crate::task::domain::TaskId;
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

/// Errors raised while acquiring a task lease.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another writer holds the lease.
    #[error("task {0} is locked by another writer")]
    Held(TaskId),

    /// The lock file could not be opened or locked.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Exclusive right to mutate a task's records.
///
/// The lease is released when dropped.
pub struct TaskLease {
    task_id: TaskId,
    _guard: Box<dyn Any + Send + Sync>,
}

impl TaskLease {
    fn new(task_id: TaskId, guard: impl Any + Send + Sync) -> Self {
        Self {
            task_id,
            _guard: Box::new(guard),
        }
    }

    /// Returns the leased task.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }
}

impl fmt::Debug for TaskLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskLease")
            .field("task_id", &self.task_id)
            .finish_non_exhaustive()
    }
}

/// Grants single-writer leases.
pub trait TaskLockProvider: Send + Sync {
    /// Acquires the lease for `task_id` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Held`] when another writer holds the lease.
    fn acquire(&self, task_id: TaskId) -> Result<TaskLease, LockError>;
}

/// Advisory `flock` on `tasks/<id>/.lock`.
///
/// The lock belongs to the open file description, so a second provider in
/// the same process contends just like another process would.
#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct FileLockProvider {
    workspace: WorkspaceDir,
}

#[cfg(unix)]
impl FileLockProvider {
    /// Creates a provider rooted at `workspace`.
    #[must_use]
    pub const fn new(workspace: WorkspaceDir) -> Self {
        Self { workspace }
    }
}

#[cfg(unix)]
impl TaskLockProvider for FileLockProvider {
    fn acquire(&self, task_id: TaskId) -> Result<TaskLease, LockError> {
        use nix::errno::Errno;
        use nix::fcntl::{Flock, FlockArg};

        let path = TaskLayout::new(task_id).lock_file();
        let file = self.workspace.open_lock_file(&path)?;
        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => {
                debug!(%task_id, "task lease acquired");
                Ok(TaskLease::new(task_id, lock))
            }
            Err((_, Errno::EWOULDBLOCK)) => Err(LockError::Held(task_id)),
            Err((_, errno)) => Err(StorageError::io(&path, errno.into()).into()),
        }
    }
}

/// In-process lease registry for tests and single-process embedding.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockProvider {
    held: Arc<Mutex<HashSet<TaskId>>>,
}

impl InMemoryLockProvider {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

struct InMemoryGuard {
    task_id: TaskId,
    held: Arc<Mutex<HashSet<TaskId>>>,
}

impl Drop for InMemoryGuard {
    fn drop(&mut self) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(&self.task_id);
        }
    }
}

impl TaskLockProvider for InMemoryLockProvider {
    fn acquire(&self, task_id: TaskId) -> Result<TaskLease, LockError> {
        let mut held = self.held.lock().map_err(|err| {
            StorageError::Join(format!("lock registry poisoned: {err}"))
        })?;
        if !held.insert(task_id) {
            return Err(LockError::Held(task_id));
        }
        drop(held);
        Ok(TaskLease::new(
            task_id,
            InMemoryGuard {
                task_id,
                held: Arc::clone(&self.held),
            },
        ))
    }
}
