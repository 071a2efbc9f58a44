//! File-backed persistence primitives shared by the store adapters.
//!
//! Every task owns a directory `<workspace_root>/tasks/<task-id>/` holding
//! sibling JSON records. Writes go through [`WorkspaceDir::write_json`],
//! which writes a temporary file, flushes it to stable storage and renames
//! it over the target, so a reader never observes a torn record.

mod error;
mod layout;
mod lock;
mod workspace;

pub(crate) use error::run_blocking;
pub use error::{StorageError, StorageResult};
pub use layout::{ARTIFACTS_DIR, HOOK_FILE, LOCK_FILE, TASK_FILE, TASKS_DIR, TaskLayout};
#[cfg(unix)]
pub use lock::FileLockProvider;
pub use lock::{InMemoryLockProvider, LockError, TaskLease, TaskLockProvider};
pub use workspace::WorkspaceDir;
