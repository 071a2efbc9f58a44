//! File-backed task repository storing `tasks/<id>/task.json`.

use async_trait::async_trait;

use crate::storage::{StorageError, TaskLayout, WorkspaceDir, run_blocking};
use crate::task::{
    domain::{Task, TaskId, WorkspaceName},
    ports::{TaskRepository, TaskRepositoryError, TaskRepositoryResult},
};

/// Task repository persisting one JSON record per task.
#[derive(Debug, Clone)]
pub struct FsTaskRepository {
    workspace: WorkspaceDir,
}

impl FsTaskRepository {
    /// Creates a repository rooted at `workspace`.
    #[must_use]
    pub const fn new(workspace: WorkspaceDir) -> Self {
        Self { workspace }
    }

    async fn read(&self, id: TaskId) -> Result<Option<Task>, StorageError> {
        let workspace = self.workspace.clone();
        run_blocking(move || workspace.read_json(&TaskLayout::new(id).task_file())).await
    }

    async fn write(&self, task: &Task) -> Result<(), StorageError> {
        let workspace = self.workspace.clone();
        let task = task.clone();
        run_blocking(move || workspace.write_json(&TaskLayout::new(task.id()).task_file(), &task))
            .await
    }
}

#[async_trait]
impl TaskRepository for FsTaskRepository {
    async fn store(&self, task: &Task) -> TaskRepositoryResult<()> {
        if self
            .read(task.id())
            .await
            .map_err(TaskRepositoryError::persistence)?
            .is_some()
        {
            return Err(TaskRepositoryError::DuplicateTask(task.id()));
        }
        self.write(task)
            .await
            .map_err(TaskRepositoryError::persistence)
    }

    async fn update(&self, task: &Task) -> TaskRepositoryResult<()> {
        let existing = self
            .read(task.id())
            .await
            .map_err(TaskRepositoryError::persistence)?;
        if existing.is_none() {
            return Err(TaskRepositoryError::NotFound(task.id()));
        }
        self.write(task)
            .await
            .map_err(TaskRepositoryError::persistence)
    }

    async fn find_by_id(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>> {
        self.read(id)
            .await
            .map_err(TaskRepositoryError::persistence)
    }

    async fn list(&self, workspace: Option<&WorkspaceName>) -> TaskRepositoryResult<Vec<Task>> {
        let dir = self.workspace.clone();
        let mut tasks = run_blocking(move || {
            let mut tasks = Vec::new();
            for id in dir.task_ids()? {
                if let Some(task) = dir.read_json::<Task>(&TaskLayout::new(id).task_file())? {
                    tasks.push(task);
                }
            }
            Ok(tasks)
        })
        .await
        .map_err(TaskRepositoryError::persistence)?;

        tasks.retain(|task| workspace.is_none_or(|name| task.workspace() == name));
        tasks.sort_by_key(|task| (task.created_at(), task.id()));
        Ok(tasks)
    }
}
