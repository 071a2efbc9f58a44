//! Progress of the step a hook is currently tracking.

use crate::task::domain::StepType;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of characters kept in [`StepContext::last_output`].
pub const LAST_OUTPUT_LIMIT: usize = 500;

/// Snapshot of the running step, refreshed as it makes progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepContext {
    /// Step name.
    pub step_name: String,
    /// Index of the step within the task.
    pub step_index: usize,
    /// Step kind.
    pub step_type: StepType,
    /// Attempt number, starting at one.
    pub attempt: u32,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// Attempt timeout in seconds.
    pub timeout_secs: u64,
    /// Short description of the current activity.
    #[serde(default)]
    pub working_on: String,
    /// Tail of the most recent output.
    #[serde(default)]
    pub last_output: String,
    /// Files the attempt has touched so far.
    #[serde(default)]
    pub files_touched: Vec<String>,
    /// Whether validation commands were running at the last update.
    #[serde(default)]
    pub validation_in_flight: bool,
    /// When the context was last refreshed.
    pub last_updated: DateTime<Utc>,
}

impl StepContext {
    /// Creates a context for a freshly started attempt.
    #[must_use]
    pub fn new(
        step_name: impl Into<String>,
        step_index: usize,
        step_type: StepType,
        attempt: u32,
        timeout_secs: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            step_index,
            step_type,
            attempt,
            started_at: now,
            timeout_secs,
            working_on: String::new(),
            last_output: String::new(),
            files_touched: Vec::new(),
            validation_in_flight: false,
            last_updated: now,
        }
    }

    /// Returns when the attempt times out.
    #[must_use]
    pub fn deadline(&self) -> DateTime<Utc> {
        let secs = i64::try_from(self.timeout_secs).unwrap_or(i64::MAX);
        self.started_at
            .checked_add_signed(Duration::seconds(secs))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Records the latest output, keeping only its last
    /// [`LAST_OUTPUT_LIMIT`] characters.
    pub fn record_output(&mut self, output: &str, now: DateTime<Utc>) {
        self.last_output = tail_chars(output, LAST_OUTPUT_LIMIT).to_owned();
        self.last_updated = now;
    }

    /// Sets the activity description.
    pub fn set_working_on(&mut self, working_on: impl Into<String>, now: DateTime<Utc>) {
        self.working_on = working_on.into();
        self.last_updated = now;
    }

    /// Adds files to the touched set, ignoring duplicates.
    pub fn touch_files<I, S>(&mut self, files: I, now: DateTime<Utc>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for file in files {
            let file = file.into();
            if !self.files_touched.contains(&file) {
                self.files_touched.push(file);
            }
        }
        self.last_updated = now;
    }

    /// Flags whether validation commands are running.
    pub fn set_validation_in_flight(&mut self, in_flight: bool, now: DateTime<Utc>) {
        self.validation_in_flight = in_flight;
        self.last_updated = now;
    }
}

fn tail_chars(text: &str, limit: usize) -> &str {
    let count = text.chars().count();
    if count <= limit {
        return text;
    }
    let skip = count - limit;
    text.char_indices()
        .nth(skip)
        .and_then(|(offset, _)| text.get(offset..))
        .unwrap_or(text)
}
