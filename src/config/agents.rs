//! Closed registry of AI agents and their model aliases.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error returned while parsing agent names.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown agent: {0}")]
pub struct ParseAgentKindError(pub String);

/// AI coding agent that runs `ai` steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Anthropic Claude CLI.
    #[default]
    Claude,
    /// Google Gemini CLI.
    Gemini,
    /// OpenAI Codex CLI.
    Codex,
}

impl AgentKind {
    /// Every supported agent.
    pub const ALL: [Self; 3] = [Self::Claude, Self::Gemini, Self::Codex];

    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Gemini => "gemini",
            Self::Codex => "codex",
        }
    }

    /// Model used when a task does not name one.
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Claude => "sonnet",
            Self::Gemini => "gemini-2.5-pro",
            Self::Codex => "gpt-5-codex",
        }
    }

    /// Resolves a model alias to the identifier passed to the agent.
    ///
    /// Blank input and `default` select [`Self::default_model`]; unknown
    /// names pass through unchanged.
    #[must_use]
    pub fn resolve_model(self, model: &str) -> &str {
        match (self, model.trim()) {
            (_, "" | "default") => self.default_model(),
            (Self::Gemini, "pro") => "gemini-2.5-pro",
            (Self::Gemini, "flash") => "gemini-2.5-flash",
            (Self::Codex, "codex") => "gpt-5-codex",
            (Self::Codex, "mini") => "gpt-5-codex-mini",
            (_, other) => other,
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for AgentKind {
    type Error = ParseAgentKindError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|agent| agent.as_str() == normalized)
            .ok_or_else(|| ParseAgentKindError(value.to_owned()))
    }
}
