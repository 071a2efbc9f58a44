//! Loop state store implementations.

pub mod fs;
pub mod memory;
