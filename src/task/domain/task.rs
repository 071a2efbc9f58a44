//! Task aggregate root and related task lifecycle types.

use super::{
    Step, StepDefinition, StepResult, StepStatus, TaskDomainError, TaskId, TaskStatus,
    WorkspaceName,
};
use crate::config::AgentKind;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Current on-disk schema version of task records.
pub const TASK_SCHEMA_VERSION: u32 = 1;

/// Agent, model, timeout and retry knobs for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Agent that runs AI steps.
    pub agent: AgentKind,
    /// Resolved model identifier.
    pub model: String,
    /// Default per-step timeout in seconds.
    pub timeout_secs: u64,
    /// Default attempt limit for steps that do not set their own.
    pub max_retry_attempts: u32,
}

impl TaskConfig {
    /// Creates a configuration, resolving `model` through the agent's alias
    /// table.
    #[must_use]
    pub fn new(agent: AgentKind, model: &str, timeout_secs: u64, max_retry_attempts: u32) -> Self {
        Self {
            agent,
            model: agent.resolve_model(model).to_owned(),
            timeout_secs,
            max_retry_attempts: max_retry_attempts.max(1),
        }
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        let agent = AgentKind::default();
        Self {
            agent,
            model: agent.default_model().to_owned(),
            timeout_secs: 30 * 60,
            max_retry_attempts: 3,
        }
    }
}

/// Audit record of a status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Status before the change.
    pub from: TaskStatus,
    /// Status after the change.
    pub to: TaskStatus,
    /// When the change happened.
    pub timestamp: DateTime<Utc>,
    /// Why the change happened.
    pub reason: String,
    /// Whether an operator forced the change past the transition table.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub operator_override: bool,
}

/// Parameter object for creating a task.
#[derive(Debug, Clone)]
pub struct TaskDraft {
    /// Owning workspace.
    pub workspace: WorkspaceName,
    /// Template the steps came from.
    pub template: String,
    /// Human description of the work.
    pub description: String,
    /// Ordered step definitions.
    pub steps: Vec<StepDefinition>,
    /// Task configuration.
    pub config: TaskConfig,
}

/// Task aggregate root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    workspace: WorkspaceName,
    template: String,
    description: String,
    steps: Vec<Step>,
    current_step: usize,
    status: TaskStatus,
    #[serde(default)]
    transitions: Vec<Transition>,
    #[serde(default)]
    step_results: Vec<StepResult>,
    config: TaskConfig,
    #[serde(default)]
    running_validation_pids: BTreeSet<u32>,
    schema_version: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a pending task from a draft.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyTemplateName`] for a blank template
    /// and [`TaskDomainError::NoSteps`] when the draft has no steps.
    pub fn new(draft: TaskDraft, clock: &impl Clock) -> Result<Self, TaskDomainError> {
        let template = draft.template.trim().to_owned();
        if template.is_empty() {
            return Err(TaskDomainError::EmptyTemplateName);
        }
        if draft.steps.is_empty() {
            return Err(TaskDomainError::NoSteps);
        }

        let timestamp = clock.utc();
        Ok(Self {
            id: TaskId::new(),
            workspace: draft.workspace,
            template,
            description: draft.description,
            steps: draft.steps.into_iter().map(Step::new).collect(),
            current_step: 0,
            status: TaskStatus::Pending,
            transitions: Vec::new(),
            step_results: Vec::new(),
            config: draft.config,
            running_validation_pids: BTreeSet::new(),
            schema_version: TASK_SCHEMA_VERSION,
            created_at: timestamp,
            updated_at: timestamp,
        })
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the owning workspace.
    #[must_use]
    pub const fn workspace(&self) -> &WorkspaceName {
        &self.workspace
    }

    /// Returns the template name.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Returns the task description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the ordered steps.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Returns the index of the next step to run.
    #[must_use]
    pub const fn current_step(&self) -> usize {
        self.current_step
    }

    /// Returns the step at the cursor, or `None` once every step is done.
    #[must_use]
    pub fn current(&self) -> Option<&Step> {
        self.steps.get(self.current_step)
    }

    /// Returns whether every step has been completed or skipped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.current_step >= self.steps.len()
    }

    /// Returns the task status.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the status audit trail.
    #[must_use]
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Returns the recorded step results.
    #[must_use]
    pub fn step_results(&self) -> &[StepResult] {
        &self.step_results
    }

    /// Returns the task configuration.
    #[must_use]
    pub const fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Returns PIDs of validation commands believed to be running.
    #[must_use]
    pub const fn running_validation_pids(&self) -> &BTreeSet<u32> {
        &self.running_validation_pids
    }

    /// Returns the record schema version.
    #[must_use]
    pub const fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest mutation timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Moves the task to `to`, appending a transition record.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::TerminalStatus`] when the task is already
    /// terminal and [`TaskDomainError::InvalidStateTransition`] when the
    /// edge is not in the transition table.
    pub fn transition_to(
        &mut self,
        to: TaskStatus,
        reason: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        if self.status.is_terminal() {
            return Err(TaskDomainError::TerminalStatus {
                task_id: self.id,
                status: self.status,
            });
        }
        if !self.status.can_transition_to(to) {
            return Err(TaskDomainError::InvalidStateTransition {
                task_id: self.id,
                from: self.status,
                to,
            });
        }
        self.apply_status(to, reason.into(), false, clock);
        Ok(())
    }

    /// Forces the task to `to`, bypassing the transition table.
    ///
    /// Overrides are the only way out of a terminal status. They are
    /// recorded like any other transition, flagged as overrides.
    pub fn override_status(&mut self, to: TaskStatus, reason: impl Into<String>, clock: &impl Clock) {
        self.apply_status(to, reason.into(), true, clock);
    }

    /// Starts a new attempt of the current step and returns its number.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::NoRemainingSteps`] once every step is done
    /// and [`TaskDomainError::RetryLimitExceeded`] when the step has no
    /// attempts left.
    pub fn begin_step_attempt(&mut self, clock: &impl Clock) -> Result<u32, TaskDomainError> {
        let now = clock.utc();
        let task_id = self.id;
        let step = self
            .steps
            .get_mut(self.current_step)
            .ok_or(TaskDomainError::NoRemainingSteps(task_id))?;
        let attempt = step.begin_attempt(now)?;
        self.updated_at = now;
        Ok(attempt)
    }

    /// Records a failed attempt of the current step, leaving it retryable.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::NoRemainingSteps`] once every step is done.
    pub fn record_attempt_failure(
        &mut self,
        result: StepResult,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        let step = self.current_step_mut()?;
        step.record_attempt_error(result.error.clone().unwrap_or_default());
        self.push_result(result, clock);
        Ok(())
    }

    /// Completes the current step and advances the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::NoRemainingSteps`] once every step is done.
    pub fn complete_current_step(
        &mut self,
        result: StepResult,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        let now = clock.utc();
        self.current_step_mut()?
            .finish(StepStatus::Completed, None, now);
        self.push_result(result, clock);
        self.advance();
        Ok(())
    }

    /// Marks the current step failed without advancing.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::NoRemainingSteps`] once every step is done.
    pub fn fail_current_step(
        &mut self,
        result: StepResult,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        let now = clock.utc();
        let error = result.error.clone();
        self.current_step_mut()?
            .finish(StepStatus::Failed, error, now);
        self.push_result(result, clock);
        Ok(())
    }

    /// Skips the current step and advances the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::NoRemainingSteps`] once every step is done.
    pub fn skip_current_step(
        &mut self,
        reason: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        let now = clock.utc();
        self.current_step_mut()?
            .finish(StepStatus::Skipped, Some(reason.into()), now);
        self.advance();
        self.updated_at = now;
        Ok(())
    }

    /// Returns the current step to `pending` so it can be attempted again.
    ///
    /// Attempts already made still count toward the limit.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::NoRemainingSteps`] once every step is done.
    pub fn reset_current_step(&mut self, clock: &impl Clock) -> Result<(), TaskDomainError> {
        self.current_step_mut()?.reset();
        self.updated_at = clock.utc();
        Ok(())
    }

    /// Returns the current step to `pending` with a fresh attempt budget.
    ///
    /// Used when an operator retries a step that exhausted its attempts.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::NoRemainingSteps`] once every step is done.
    pub fn rearm_current_step(&mut self, clock: &impl Clock) -> Result<(), TaskDomainError> {
        self.current_step_mut()?.rearm();
        self.updated_at = clock.utc();
        Ok(())
    }

    /// Records a running validation PID. Returns `false` if already present.
    pub fn register_validation_pid(&mut self, pid: u32, clock: &impl Clock) -> bool {
        let inserted = self.running_validation_pids.insert(pid);
        self.updated_at = clock.utc();
        inserted
    }

    /// Forgets a validation PID. Returns `false` if it was not recorded.
    pub fn release_validation_pid(&mut self, pid: u32, clock: &impl Clock) -> bool {
        let removed = self.running_validation_pids.remove(&pid);
        self.updated_at = clock.utc();
        removed
    }

    /// Forgets every recorded validation PID, returning them.
    pub fn drain_validation_pids(&mut self, clock: &impl Clock) -> Vec<u32> {
        let pids = std::mem::take(&mut self.running_validation_pids);
        self.updated_at = clock.utc();
        pids.into_iter().collect()
    }

    fn current_step_mut(&mut self) -> Result<&mut Step, TaskDomainError> {
        let task_id = self.id;
        self.steps
            .get_mut(self.current_step)
            .ok_or(TaskDomainError::NoRemainingSteps(task_id))
    }

    fn advance(&mut self) {
        self.current_step = (self.current_step + 1).min(self.steps.len());
    }

    fn push_result(&mut self, result: StepResult, clock: &impl Clock) {
        self.step_results.push(result);
        self.updated_at = clock.utc();
    }

    fn apply_status(
        &mut self,
        to: TaskStatus,
        reason: String,
        operator_override: bool,
        clock: &impl Clock,
    ) {
        let timestamp = clock.utc();
        self.transitions.push(Transition {
            from: self.status,
            to,
            timestamp,
            reason,
            operator_override,
        });
        self.status = to;
        self.updated_at = timestamp;
    }
}
