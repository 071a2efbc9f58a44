//! Task repository adapters.

pub mod fs;
pub mod memory;
