//! Hook history entries.

use super::HookState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One accepted state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookEvent {
    /// When the change happened.
    pub timestamp: DateTime<Utc>,
    /// State before the change.
    pub from_state: HookState,
    /// State after the change.
    pub to_state: HookState,
    /// What caused the change.
    pub trigger: String,
    /// Step the change concerns, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,
    /// Free-form structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
