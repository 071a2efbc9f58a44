//! Task and step lifecycle.
//!
//! A task is an ordered list of steps run against one workspace, with a
//! closed status set, an append-only audit trail of status transitions and
//! the results of every step attempt. The module follows hexagonal
//! architecture:
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
