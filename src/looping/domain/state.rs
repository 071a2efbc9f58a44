//! Persisted progress of a loop step.

use crate::task::domain::{StepResult, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopExitReason {
    /// The run was cancelled.
    ContextCanceled,
    /// An iteration asked the loop to stop.
    ExitSignal,
    /// The success condition held.
    ConditionMet,
    /// Too many iterations changed no files.
    CircuitBreakerStagnation,
    /// Too many iterations failed in a row.
    CircuitBreakerErrors,
    /// The iteration limit was reached.
    MaxIterationsReached,
}

impl LoopExitReason {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ContextCanceled => "context_canceled",
            Self::ExitSignal => "exit_signal",
            Self::ConditionMet => "condition_met",
            Self::CircuitBreakerStagnation => "circuit_breaker_stagnation",
            Self::CircuitBreakerErrors => "circuit_breaker_errors",
            Self::MaxIterationsReached => "max_iterations_reached",
        }
    }

    /// Returns whether the exit came from a circuit breaker.
    #[must_use]
    pub const fn is_circuit_breaker(self) -> bool {
        matches!(
            self,
            Self::CircuitBreakerStagnation | Self::CircuitBreakerErrors
        )
    }
}

impl fmt::Display for LoopExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one pass over the inner steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationResult {
    /// One-based iteration number.
    pub iteration: u32,
    /// Results of the inner steps that ran.
    #[serde(default)]
    pub step_results: Vec<StepResult>,
    /// Files changed by the iteration.
    #[serde(default)]
    pub files_changed: Vec<String>,
    /// Whether an inner step asked the loop to stop.
    #[serde(default)]
    pub exit_signal: bool,
    /// Error that ended the iteration early.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time.
    pub completed_at: DateTime<Utc>,
}

/// Durable progress of a loop step, saved after every iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopState {
    /// Owning task.
    pub task_id: TaskId,
    /// Index of the loop step within the task.
    pub step_index: usize,
    /// Name of the loop step.
    pub step_name: String,
    /// Number of iterations started.
    pub current_iteration: u32,
    /// Iteration limit; zero means unlimited.
    pub max_iterations: u32,
    /// Inner step the current iteration is on.
    #[serde(default)]
    pub inner_step_index: usize,
    /// Results of finished iterations.
    #[serde(default)]
    pub iterations: Vec<IterationResult>,
    /// Set once the loop has stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_reason: Option<LoopExitReason>,
    /// Consecutive iterations without file changes.
    #[serde(default)]
    pub stagnation_count: u32,
    /// Consecutive iterations that reported an error.
    #[serde(default)]
    pub consecutive_errors: u32,
    /// Consecutive iterations whose checkpoint or save failed.
    #[serde(default)]
    pub consecutive_checkpoint_failures: u32,
    /// When the last checkpoint succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checkpoint_at: Option<DateTime<Utc>>,
    /// When the loop started.
    pub started_at: DateTime<Utc>,
    /// When the state last changed.
    pub updated_at: DateTime<Utc>,
}

impl LoopState {
    /// Creates the state of a loop that has not run yet.
    #[must_use]
    pub fn new(
        task_id: TaskId,
        step_index: usize,
        step_name: impl Into<String>,
        max_iterations: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            step_index,
            step_name: step_name.into(),
            current_iteration: 0,
            max_iterations,
            inner_step_index: 0,
            iterations: Vec::new(),
            exit_reason: None,
            stagnation_count: 0,
            consecutive_errors: 0,
            consecutive_checkpoint_failures: 0,
            last_checkpoint_at: None,
            started_at: now,
            updated_at: now,
        }
    }

    /// Returns whether the loop has stopped.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.exit_reason.is_some()
    }

    /// Folds a finished iteration into the counters.
    pub fn record_iteration(&mut self, result: IterationResult, now: DateTime<Utc>) {
        if result.files_changed.is_empty() {
            self.stagnation_count += 1;
        } else {
            self.stagnation_count = 0;
        }
        if result.error.is_some() {
            self.consecutive_errors += 1;
        } else {
            self.consecutive_errors = 0;
        }
        self.inner_step_index = 0;
        self.iterations.push(result);
        self.updated_at = now;
    }

    /// Returns the newest iteration result.
    #[must_use]
    pub fn last_iteration(&self) -> Option<&IterationResult> {
        self.iterations.last()
    }
}
