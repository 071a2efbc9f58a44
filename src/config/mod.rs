//! Orchestrator configuration.
//!
//! Configuration is read from a TOML file. Every section is optional and
//! falls back to its defaults, so an empty file (or no file at all) yields
//! a working configuration.

mod agents;

pub use agents::{AgentKind, ParseAgentKindError};

use crate::looping::domain::LoopConfig;
use crate::task::domain::TaskConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Configuration path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Configuration path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The signing secret environment variable is unset or empty.
    #[error("signing secret variable {0} is not set")]
    MissingSecret(String),
}

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Directory holding `tasks/<id>/` records.
    pub workspace_root: PathBuf,
    /// Agent selection.
    pub agent: AgentSettings,
    /// Step defaults.
    pub steps: StepDefaults,
    /// Crash recovery tuning.
    pub recovery: RecoverySettings,
    /// Defaults applied to loop steps without their own configuration.
    pub loop_defaults: LoopConfig,
    /// Receipt signing.
    pub signing: SigningSettings,
    /// Log filtering.
    pub logging: LoggingSettings,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from(".waymark"),
            agent: AgentSettings::default(),
            steps: StepDefaults::default(),
            recovery: RecoverySettings::default(),
            loop_defaults: LoopConfig::default(),
            signing: SigningSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Agent selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Agent used for AI steps.
    pub default_agent: AgentKind,
    /// Model or alias; the agent's default when unset.
    pub default_model: Option<String>,
}

/// Step defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepDefaults {
    /// Per-attempt timeout in seconds.
    pub timeout_secs: u64,
    /// Attempt limit, including the first attempt.
    pub max_attempts: u32,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            timeout_secs: 30 * 60,
            max_attempts: 3,
        }
    }
}

/// Crash recovery tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    /// How recent a checkpoint must be to resume from it.
    pub checkpoint_window_secs: u64,
}

impl RecoverySettings {
    /// Returns the checkpoint recency window.
    #[must_use]
    pub const fn checkpoint_window(&self) -> Duration {
        Duration::from_secs(self.checkpoint_window_secs)
    }
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            checkpoint_window_secs: 15 * 60,
        }
    }
}

/// Receipt signing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningSettings {
    /// Key identifier recorded on every receipt.
    pub key_id: String,
    /// Environment variable holding the HMAC secret.
    pub secret_env: String,
}

impl SigningSettings {
    /// Reads the signing secret from the configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSecret`] when the variable is unset or
    /// empty.
    pub fn secret(&self) -> Result<Vec<u8>, ConfigError> {
        match std::env::var(&self.secret_env) {
            Ok(value) if !value.is_empty() => Ok(value.into_bytes()),
            _ => Err(ConfigError::MissingSecret(self.secret_env.clone())),
        }
    }
}

impl Default for SigningSettings {
    fn default() -> Self {
        Self {
            key_id: "local".to_owned(),
            secret_env: "WAYMARK_RECEIPT_KEY".to_owned(),
        }
    }
}

/// Log filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "waymark=info".to_owned(),
        }
    }
}

impl OrchestratorConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed input and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from `path`, returning defaults when it is
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed or
    /// validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steps.timeout_secs == 0 {
            return Err(ConfigError::Invalid("steps.timeout_secs must be > 0".to_owned()));
        }
        if self.steps.max_attempts == 0 {
            return Err(ConfigError::Invalid("steps.max_attempts must be > 0".to_owned()));
        }
        if self.signing.key_id.trim().is_empty() {
            return Err(ConfigError::Invalid("signing.key_id must not be empty".to_owned()));
        }
        Ok(())
    }

    /// Builds the per-task configuration for new tasks.
    #[must_use]
    pub fn task_config(&self) -> TaskConfig {
        TaskConfig::new(
            self.agent.default_agent,
            self.agent.default_model.as_deref().unwrap_or_default(),
            self.steps.timeout_secs,
            self.steps.max_attempts,
        )
    }
}
