//! Service layer for task creation, lookup and status changes.

use crate::task::{
    domain::{
        ParseTaskStatusError, StepDefinition, Task, TaskConfig, TaskDomainError, TaskDraft,
        TaskId, TaskStatus, WorkspaceName,
    },
    ports::{TaskRepository, TaskRepositoryError, TaskRepositoryResult},
};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Request payload for creating a task from a resolved template.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTaskRequest {
    workspace: String,
    template: String,
    description: String,
    steps: Vec<StepDefinition>,
    config: Option<TaskConfig>,
}

impl CreateTaskRequest {
    /// Creates a request with required fields and no steps.
    #[must_use]
    pub fn new(
        workspace: impl Into<String>,
        template: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            workspace: workspace.into(),
            template: template.into(),
            description: description.into(),
            steps: Vec::new(),
            config: None,
        }
    }

    /// Appends a step definition.
    #[must_use]
    pub fn with_step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    /// Replaces the step definitions.
    #[must_use]
    pub fn with_steps(mut self, steps: impl IntoIterator<Item = StepDefinition>) -> Self {
        self.steps = steps.into_iter().collect();
        self
    }

    /// Sets the task configuration.
    #[must_use]
    pub fn with_config(mut self, config: TaskConfig) -> Self {
        self.config = Some(config);
        self
    }
}

/// Request payload for changing a task's status.
///
/// The target is accepted in its string form so that callers outside the
/// type system (CLI, configuration) go through the closed-set parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTaskRequest {
    task_id: TaskId,
    target: String,
    reason: String,
}

impl TransitionTaskRequest {
    /// Creates a transition request.
    #[must_use]
    pub fn new(task_id: TaskId, target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            task_id,
            target: target.into(),
            reason: reason.into(),
        }
    }
}

/// Service-level errors for task lifecycle operations.
#[derive(Debug, Error)]
pub enum TaskLifecycleError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),
    /// The requested status is not part of the closed set.
    #[error(transparent)]
    UnknownStatus(#[from] ParseTaskStatusError),
    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] TaskRepositoryError),
}

/// Result type for task lifecycle service operations.
pub type TaskLifecycleResult<T> = Result<T, TaskLifecycleError>;

/// Task lifecycle orchestration service.
#[derive(Clone)]
pub struct TaskLifecycleService<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    clock: Arc<C>,
}

impl<R, C> TaskLifecycleService<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    /// Creates a new task lifecycle service.
    #[must_use]
    pub const fn new(repository: Arc<R>, clock: Arc<C>) -> Self {
        Self { repository, clock }
    }

    /// Creates and stores a pending task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError`] when input validation fails or the
    /// repository rejects persistence.
    pub async fn create(&self, request: CreateTaskRequest) -> TaskLifecycleResult<Task> {
        let draft = TaskDraft {
            workspace: WorkspaceName::new(request.workspace)?,
            template: request.template,
            description: request.description,
            steps: request.steps,
            config: request.config.unwrap_or_default(),
        };
        let task = Task::new(draft, &*self.clock)?;
        self.repository.store(&task).await?;
        info!(task_id = %task.id(), workspace = %task.workspace(), "task created");
        Ok(task)
    }

    /// Retrieves a task by identifier.
    ///
    /// Returns `Ok(None)` when the task does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Repository`] when persistence lookup
    /// fails.
    pub async fn find_by_id(&self, task_id: TaskId) -> TaskLifecycleResult<Option<Task>> {
        let result: TaskRepositoryResult<Option<Task>> =
            self.repository.find_by_id(task_id).await;
        Ok(result?)
    }

    /// Moves a task to the status named in the request.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::UnknownStatus`] for a value outside the
    /// closed set, [`TaskLifecycleError::Domain`] when the transition is not
    /// allowed, and [`TaskLifecycleError::Repository`] when the task is
    /// missing or cannot be saved.
    pub async fn transition_task(
        &self,
        request: TransitionTaskRequest,
    ) -> TaskLifecycleResult<Task> {
        let target = TaskStatus::try_from(request.target.as_str())?;
        let mut task = self.repository.load(request.task_id).await?;
        let from = task.status();
        task.transition_to(target, request.reason, &*self.clock)?;
        self.repository.update(&task).await?;
        info!(task_id = %task.id(), %from, to = %target, "task status changed");
        Ok(task)
    }

    /// Forces a task into `target`, bypassing the transition table.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Repository`] when the task is missing
    /// or cannot be saved.
    pub async fn override_status(
        &self,
        task_id: TaskId,
        target: TaskStatus,
        reason: impl Into<String> + Send,
    ) -> TaskLifecycleResult<Task> {
        let mut task = self.repository.load(task_id).await?;
        let from = task.status();
        task.override_status(target, reason, &*self.clock);
        self.repository.update(&task).await?;
        info!(task_id = %task.id(), %from, to = %target, "task status overridden");
        Ok(task)
    }

    /// Returns tasks whose status requires human attention.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Repository`] when listing fails.
    pub async fn attention_queue(
        &self,
        workspace: Option<&WorkspaceName>,
    ) -> TaskLifecycleResult<Vec<Task>> {
        let mut tasks = self.repository.list(workspace).await?;
        tasks.retain(|task| task.status().needs_attention());
        Ok(tasks)
    }
}
