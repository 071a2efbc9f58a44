//! Application services for task execution and crash recovery.

mod engine;
mod error;
mod loop_step;
mod prompt;
mod recovery;

pub use engine::{AbandonReport, EngineCollaborators, EngineSettings, StepReport, TaskEngine};
pub use error::{EngineError, EngineResult};
pub use prompt::PromptRenderer;
pub use recovery::RecoveryService;
