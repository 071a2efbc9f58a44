//! Diagnostic logging.
//!
//! Services emit `tracing` events; nothing is printed until a subscriber is
//! installed. Binaries and tests embedding the crate call [`init`] once.

use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The fallback filter directive does not parse.
    #[error("invalid log filter '{directive}': {message}")]
    InvalidFilter {
        /// Directive as configured.
        directive: String,
        /// Parser message.
        message: String,
    },

    /// A global subscriber is already installed.
    #[error("tracing subscriber already installed: {0}")]
    AlreadyInstalled(String),
}

/// Installs a compact stderr subscriber.
///
/// `RUST_LOG` wins when set; otherwise `fallback` (usually
/// `logging.filter` from the configuration) selects what is shown.
///
/// # Errors
///
/// Returns [`TelemetryError`] for a malformed fallback directive or when a
/// subscriber is already installed.
pub fn init(fallback: &str) -> Result<(), TelemetryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(fallback)?,
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init()
        .map_err(|err| TelemetryError::AlreadyInstalled(err.to_string()))
}

fn build_filter(directive: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(directive).map_err(|err| TelemetryError::InvalidFilter {
        directive: directive.to_owned(),
        message: err.to_string(),
    })
}
