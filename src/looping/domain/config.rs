//! Loop step configuration.

use crate::task::domain::{StepDefinition, StepResult};
use serde::{Deserialize, Serialize};

/// Default number of consecutive no-change iterations tolerated.
pub const DEFAULT_STAGNATION_THRESHOLD: u32 = 3;
/// Default number of consecutive failing iterations tolerated.
pub const DEFAULT_ERROR_THRESHOLD: u32 = 5;
/// Default number of consecutive checkpoint failures tolerated.
pub const DEFAULT_CHECKPOINT_FAILURE_THRESHOLD: u32 = 3;

/// Condition that ends a loop successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SuccessCondition {
    /// Every inner step of the iteration succeeded.
    AllStepsSucceeded,
    /// Some inner step's output contains `text`.
    OutputContains {
        /// Text to look for.
        text: String,
    },
}

impl SuccessCondition {
    /// Returns whether an iteration's inner results satisfy the condition.
    #[must_use]
    pub fn is_met(&self, results: &[StepResult]) -> bool {
        match self {
            Self::AllStepsSucceeded => {
                !results.is_empty() && results.iter().all(|result| result.success)
            }
            Self::OutputContains { text } => {
                results.iter().any(|result| result.output.contains(text.as_str()))
            }
        }
    }
}

/// Limits and exit conditions of a loop step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Iteration limit; zero means unlimited.
    pub max_iterations: u32,
    /// Consecutive no-change iterations tolerated before the loop stops.
    pub stagnation_threshold: u32,
    /// Consecutive failing iterations tolerated before the loop stops.
    pub error_threshold: u32,
    /// Consecutive checkpoint failures tolerated before the loop errors.
    pub checkpoint_failure_threshold: u32,
    /// Optional success condition checked after every iteration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_condition: Option<SuccessCondition>,
    /// Steps run by each iteration, in order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepDefinition>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 0,
            stagnation_threshold: DEFAULT_STAGNATION_THRESHOLD,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            checkpoint_failure_threshold: DEFAULT_CHECKPOINT_FAILURE_THRESHOLD,
            success_condition: None,
            steps: Vec::new(),
        }
    }
}

impl LoopConfig {
    /// Returns whether `completed` iterations exhaust the limit.
    #[must_use]
    pub const fn is_exhausted(&self, completed: u32) -> bool {
        self.max_iterations > 0 && completed >= self.max_iterations
    }
}
