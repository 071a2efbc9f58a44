//! Crash-recovery hook.
//!
//! Every task has exactly one hook: a durable record of where the task is in
//! the recovery state machine, which step it was working on, the checkpoints
//! it can resume from and the signed receipts of every validation command it
//! ran. On restart the hook is what gets diagnosed.
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
