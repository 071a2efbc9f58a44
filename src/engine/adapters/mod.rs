//! Bundled collaborator implementations.

pub mod artifacts;

pub use artifacts::{FsArtifactStore, InMemoryArtifactStore};
