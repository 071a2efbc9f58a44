//! AI coding agent capability.

use crate::config::AgentKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// How much the agent may do without asking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    /// Agent asks before every edit.
    #[default]
    Default,
    /// Agent may edit files without asking.
    AcceptEdits,
    /// Agent may do anything.
    BypassPermissions,
    /// Agent plans only.
    Plan,
}

/// One agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiRequest {
    /// Rendered prompt.
    pub prompt: String,
    /// Extra context appended by the agent runner, if any.
    pub context: Option<String>,
    /// Agent to run.
    pub agent: AgentKind,
    /// Resolved model identifier.
    pub model: String,
    /// Time limit for the invocation.
    pub timeout: Duration,
    /// Working directory.
    pub workdir: PathBuf,
    /// Permission mode.
    pub permission_mode: PermissionMode,
}

/// What the agent reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiResult {
    /// Whether the agent considers the work done.
    pub success: bool,
    /// Final agent output.
    pub output: String,
    /// Agent session identifier.
    pub session_id: Option<String>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Conversation turns used.
    pub num_turns: u32,
    /// Reported cost in US dollars.
    pub total_cost_usd: f64,
    /// Files the agent changed.
    pub files_changed: Vec<String>,
}

/// Errors raised by agent runners.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    /// The agent could not be started.
    #[error("failed to start agent: {0}")]
    Spawn(String),
    /// The agent ran past its time limit.
    #[error("agent timed out after {0:?}")]
    Timeout(Duration),
    /// The invocation was cancelled.
    #[error("agent invocation cancelled")]
    Cancelled,
    /// The agent exited abnormally or produced unreadable output.
    #[error("agent failed: {0}")]
    Failed(String),
}

/// Runs AI coding agents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Runs one invocation to completion.
    async fn run(&self, request: AiRequest, cancel: &CancellationToken)
    -> Result<AiResult, AgentError>;
}
