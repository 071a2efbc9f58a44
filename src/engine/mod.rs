//! Task execution.
//!
//! The engine advances a task one step attempt at a time, moving the hook
//! through its state machine before and after every side effect so that a
//! crash at any point leaves an accurate record. Agents, external tools and
//! artifact storage sit behind the ports in [`ports`].

pub mod adapters;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
