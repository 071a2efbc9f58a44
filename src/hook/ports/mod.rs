//! Port contracts for hook persistence, receipt signing and version-control
//! inspection.

pub mod repository;
pub mod signer;
pub mod vcs;

pub use repository::{HookRepository, HookRepositoryError, HookRepositoryResult};
pub use signer::{ReceiptSigner, ReceiptVerifier, Signature, SigningError};
pub use vcs::{VcsError, VcsInspector};

#[cfg(test)]
pub use signer::MockReceiptSigner;
#[cfg(test)]
pub use vcs::MockVcsInspector;
