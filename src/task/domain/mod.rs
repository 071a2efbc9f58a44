//! Domain model for task lifecycle management.
//!
//! A task is the ordered step sequence, status and audit trail for one unit
//! of work. The domain owns no durability logic; persistence lives behind
//! the ports in [`crate::task::ports`].

mod error;
mod ids;
mod status;
mod step;
mod task;

pub use error::{ParseStepTypeError, ParseTaskStatusError, TaskDomainError};
pub use ids::{TaskId, WorkspaceName};
pub use status::{ATTENTION_STATUSES, STATUS_SCHEMA_VERSION, TaskStatus, needs_attention};
pub use step::{Step, StepDefinition, StepResult, StepStatus, StepType};
pub use task::{TASK_SCHEMA_VERSION, Task, TaskConfig, TaskDraft, Transition};
