//! Step definitions for crash recovery scenarios.

pub mod given;
pub mod then;
pub mod when;
pub mod world;
