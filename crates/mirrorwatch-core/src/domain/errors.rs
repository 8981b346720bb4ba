//! Domain error types
//!
//! Errors raised while validating watch definitions and mapping source paths
//! onto their destination counterparts.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The configured source root is missing or is not a directory
    #[error("Source root does not exist: {0}")]
    SourceRootMissing(PathBuf),

    /// The configured destination root is missing or is not a directory
    #[error("Destination root does not exist: {0}")]
    DestinationRootMissing(PathBuf),

    /// A changed path is not located under the definition's source root
    #[error("Path not within source root: {path} (root: {root})")]
    PathNotInSourceRoot {
        /// The offending path
        path: PathBuf,
        /// The source root it was expected under
        root: PathBuf,
    },

    /// The path has no file component to mirror (e.g. it is the root itself)
    #[error("Invalid path: {0}")]
    InvalidPath(PathBuf),
}
