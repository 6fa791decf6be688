//! hg2git core library.
//!
//! This crate finds Mercurial repositories in a directory tree and converts
//! each one to Git in place: it bootstraps the operator identity, builds a
//! per-repository author mapping, and drives the external
//! `hg-fast-export.sh` converter through a sequence of external commands.

pub mod authors;
pub mod config;
pub mod converter;
pub mod errors;
pub mod identity;
pub mod process;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod walker;

// Re-exports for convenience.
pub use config::ConvertConfig;
pub use converter::RepositoryConverter;
pub use identity::{IdentityProvider, OperatorIdentity};
pub use process::{CommandRunner, ProcessRunner};
pub use walker::{discover, TreeWalker, WalkSummary};
