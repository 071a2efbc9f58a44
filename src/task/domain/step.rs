//! Step definitions, per-step progress and step outcomes.

use super::{ParseStepTypeError, TaskDomainError, TaskStatus};
use crate::looping::domain::LoopConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of work a step performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Runs an AI coding agent.
    Ai,
    /// Runs validation commands.
    Validation,
    /// Performs version-control actions.
    Git,
    /// Waits for a human decision.
    Human,
    /// Spec-driven design step.
    Sdd,
    /// Waits for CI results.
    Ci,
    /// Runs verification against the produced change.
    Verify,
    /// Repeats an inner pipeline until a limit or signal ends it.
    Loop,
}

impl StepType {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Validation => "validation",
            Self::Git => "git",
            Self::Human => "human",
            Self::Sdd => "sdd",
            Self::Ci => "ci",
            Self::Verify => "verify",
            Self::Loop => "loop",
        }
    }

    /// Returns whether the step blocks on a human.
    #[must_use]
    pub const fn is_human_gated(self) -> bool {
        matches!(self, Self::Human)
    }

    /// Status a task moves to when this step fails for good.
    #[must_use]
    pub const fn failure_status(self) -> TaskStatus {
        match self {
            Self::Git => TaskStatus::GhFailed,
            Self::Ci => TaskStatus::CiFailed,
            Self::Human => TaskStatus::AwaitingApproval,
            Self::Ai | Self::Validation | Self::Sdd | Self::Verify | Self::Loop => {
                TaskStatus::ValidationFailed
            }
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for StepType {
    type Error = ParseStepTypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "ai" => Ok(Self::Ai),
            "validation" => Ok(Self::Validation),
            "git" => Ok(Self::Git),
            "human" => Ok(Self::Human),
            "sdd" => Ok(Self::Sdd),
            "ci" => Ok(Self::Ci),
            "verify" => Ok(Self::Verify),
            "loop" => Ok(Self::Loop),
            _ => Err(ParseStepTypeError(value.to_owned())),
        }
    }
}

/// Progress of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not started.
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Failed after exhausting its attempts.
    Failed,
    /// Skipped by an operator or recovery decision.
    Skipped,
}

/// Template-provided definition of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Step name, unique within a task.
    pub name: String,
    /// Step kind.
    pub step_type: StepType,
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Per-attempt timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Prompt template for AI steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Commands for validation and verify steps.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
    /// Whether the validation commands may be re-run safely.
    #[serde(default)]
    pub idempotent: bool,
    /// Loop configuration for loop steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_config: Option<LoopConfig>,
}

impl StepDefinition {
    /// Creates a definition with one attempt and no extra settings.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyStepName`] when the name is blank.
    pub fn new(name: impl Into<String>, step_type: StepType) -> Result<Self, TaskDomainError> {
        let raw = name.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TaskDomainError::EmptyStepName);
        }
        Ok(Self {
            name: trimmed.to_owned(),
            step_type,
            max_attempts: 1,
            timeout_secs: None,
            prompt: None,
            commands: Vec::new(),
            idempotent: false,
            loop_config: None,
        })
    }

    /// Sets the attempt limit. Values below one are raised to one.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub const fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    /// Sets the AI prompt template.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Sets the commands run by validation and verify steps.
    #[must_use]
    pub fn with_commands(mut self, commands: impl IntoIterator<Item = String>) -> Self {
        self.commands = commands.into_iter().collect();
        self
    }

    /// Marks the commands as safe to re-run.
    #[must_use]
    pub const fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    /// Attaches a loop configuration.
    #[must_use]
    pub fn with_loop_config(mut self, config: LoopConfig) -> Self {
        self.loop_config = Some(config);
        self
    }
}

/// A step and its mutable progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    definition: StepDefinition,
    status: StepStatus,
    attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
}

impl Step {
    /// Creates a pending step from its definition.
    #[must_use]
    pub const fn new(definition: StepDefinition) -> Self {
        Self {
            definition,
            status: StepStatus::Pending,
            attempts: 0,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Returns the step definition.
    #[must_use]
    pub const fn definition(&self) -> &StepDefinition {
        &self.definition
    }

    /// Returns the step name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Returns the step type.
    #[must_use]
    pub const fn step_type(&self) -> StepType {
        self.definition.step_type
    }

    /// Returns the step status.
    #[must_use]
    pub const fn status(&self) -> StepStatus {
        self.status
    }

    /// Returns the number of attempts made so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns the last error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns when the first attempt started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Returns when the step finished.
    #[must_use]
    pub const fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns whether another attempt is allowed.
    #[must_use]
    pub const fn has_attempts_left(&self) -> bool {
        self.attempts < self.definition.max_attempts
    }

    pub(super) fn begin_attempt(&mut self, now: DateTime<Utc>) -> Result<u32, TaskDomainError> {
        if !self.has_attempts_left() {
            return Err(TaskDomainError::RetryLimitExceeded {
                step: self.definition.name.clone(),
                limit: self.definition.max_attempts,
            });
        }
        self.attempts += 1;
        self.status = StepStatus::Running;
        self.error = None;
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        Ok(self.attempts)
    }

    pub(super) fn finish(&mut self, status: StepStatus, error: Option<String>, now: DateTime<Utc>) {
        self.status = status;
        self.error = error;
        self.completed_at = Some(now);
    }

    pub(super) fn record_attempt_error(&mut self, error: String) {
        self.status = StepStatus::Pending;
        self.error = Some(error);
    }

    pub(super) fn reset(&mut self) {
        self.status = StepStatus::Pending;
        self.error = None;
        self.completed_at = None;
    }

    pub(super) fn rearm(&mut self) {
        self.reset();
        self.attempts = 0;
    }
}

/// Outcome of one step attempt, appended to the task's results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Index of the step within the task.
    pub step_index: usize,
    /// Step name.
    pub step_name: String,
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Captured output, possibly truncated by the producer.
    #[serde(default)]
    pub output: String,
    /// Error text for failed attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Files the attempt changed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_changed: Vec<String>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Agent session identifier for AI steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Artifact names saved for the attempt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
    /// When the attempt finished.
    pub completed_at: DateTime<Utc>,
}

impl StepResult {
    /// Creates a successful result with empty output.
    #[must_use]
    pub fn success(step_index: usize, step_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            step_index,
            step_name: step_name.into(),
            success: true,
            output: String::new(),
            error: None,
            files_changed: Vec::new(),
            duration_ms: 0,
            session_id: None,
            artifacts: Vec::new(),
            completed_at: now,
        }
    }

    /// Creates a failed result carrying an error message.
    #[must_use]
    pub fn failure(
        step_index: usize,
        step_name: impl Into<String>,
        error: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::success(step_index, step_name, now)
        }
    }

    /// Sets captured output.
    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    /// Sets changed files.
    #[must_use]
    pub fn with_files_changed(mut self, files: impl IntoIterator<Item = String>) -> Self {
        self.files_changed = files.into_iter().collect();
        self
    }

    /// Sets the duration.
    #[must_use]
    pub const fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Sets the agent session identifier.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Adds an artifact name.
    #[must_use]
    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifacts.push(artifact.into());
        self
    }
}
