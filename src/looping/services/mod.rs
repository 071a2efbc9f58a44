//! Loop controller service.

mod controller;

pub use controller::{LoopController, LoopError, LoopOutcome};
