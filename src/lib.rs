//! Waymark: crash-safe task orchestration for AI coding agents.
//!
//! A task is an ordered list of steps (agent runs, validation commands,
//! git and CI actions, human approvals, bounded loops). Every task has a
//! durable hook that records where execution stands, so a process killed at
//! any instant can be diagnosed and resumed on the next start.
//!
//! # Architecture
//!
//! Each bounded context follows the hexagonal layout:
//!
//! - **Domain**: state machines and records with no I/O
//! - **Ports**: traits for persistence and external tools
//! - **Adapters**: in-memory and file-backed implementations
//! - **Services**: orchestration over ports
//!
//! # Modules
//!
//! - [`task`]: steps, statuses and the attention classifier
//! - [`hook`]: the crash-recovery record, checkpoints, receipts and
//!   diagnosis
//! - [`looping`]: bounded iteration with circuit breakers
//! - [`validation`]: validation subprocesses and PID tracking
//! - [`engine`]: step execution and recovery application
//! - [`storage`]: atomic JSON records and single-writer leases
//! - [`config`]: orchestrator configuration and the agent registry
//! - [`telemetry`]: log subscriber setup

pub mod config;
pub mod engine;
pub mod hook;
pub mod looping;
pub mod storage;
pub mod task;
pub mod telemetry;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;
