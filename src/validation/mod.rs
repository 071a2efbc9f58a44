//! Validation command execution.
//!
//! Commands run as shell subprocesses with a timeout and a cancellation
//! token. While a command runs its PID is held both in the in-process
//! [`ProcessRegistry`] and in the persisted task record.

mod registry;
mod run;
mod runner;
mod signals;

pub use registry::ProcessRegistry;
pub use run::{CommandRun, RunOutcome};
pub use runner::{CommandSpec, ValidationError, ValidationRunner};
pub use signals::{OsProcessSignaller, ProcessSignaller, SignalError};

#[cfg(test)]
pub use signals::MockProcessSignaller;

#[cfg(test)]
mod tests;
