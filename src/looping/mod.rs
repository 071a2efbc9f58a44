//! Loop steps: bounded repetition of an inner pipeline.
//!
//! The controller persists [`domain::LoopState`] after every iteration so a
//! restarted orchestrator resumes at the next iteration. Stagnation, error
//! and checkpoint-failure counters stop loops that no longer make progress.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
