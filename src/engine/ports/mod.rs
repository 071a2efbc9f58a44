//! Collaborator contracts consumed by the task engine.

pub mod agent;
pub mod artifacts;
pub mod ci;
pub mod external;

pub use agent::{AgentError, AgentRunner, AiRequest, AiResult, PermissionMode};
pub use artifacts::{ArtifactError, ArtifactStore, is_valid_artifact_name};
pub use ci::{CiFailureHandling, StaticCiFailureHandling};
pub use external::{CiVerdict, ExternalStepError, ExternalStepRunner, StepOutcome, StepRequest};

#[cfg(test)]
pub use agent::MockAgentRunner;
#[cfg(test)]
pub use external::MockExternalStepRunner;
