//! Hook repository, signer and version-control adapters.

pub mod fs;
pub mod git;
pub mod memory;
pub mod signer;
