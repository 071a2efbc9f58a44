//! Port contracts for loop steps.

pub mod iteration;
pub mod store;

pub use iteration::{IterationRunner, LoopCheckpointError, LoopCheckpointer};
pub use store::{LoopStateStore, LoopStoreError, LoopStoreResult};

#[cfg(test)]
pub use iteration::{MockIterationRunner, MockLoopCheckpointer};
