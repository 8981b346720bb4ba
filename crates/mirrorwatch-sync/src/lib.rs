//! mirrorwatch Sync - Change-driven one-way mirroring engine
//!
//! Provides:
//! - Mapping of raw OS notifications into change events
//! - Sliding-window debouncing per (definition, path)
//! - A copy pipeline with settle delay and bounded retries
//! - Rename handling (delete old counterpart, copy new)
//! - One isolated watch session per configured definition
//!
//! ## Modules
//!
//! - [`watcher`] - `notify` wrapper producing [`watcher::ChangeEvent`] values
//! - [`debouncer`] - Shared, concurrency-safe debounce table
//! - [`filesystem`] - `tokio::fs` adapter for the mirror filesystem port
//! - [`pipeline`] - Copy pipeline and retry policy
//! - [`rename`] - Rename handler built on the pipeline
//! - [`coordinator`] - Watch sessions and per-event dispatch

pub mod coordinator;
pub mod debouncer;
pub mod filesystem;
pub mod pipeline;
pub mod rename;
pub mod watcher;

use std::io;
use std::path::{Path, PathBuf};

use mirrorwatch_core::domain::errors::DomainError;
use thiserror::Error;

pub use coordinator::{EventDispatcher, WatchCoordinator};
pub use debouncer::Debouncer;
pub use filesystem::LocalFileSystemAdapter;
pub use pipeline::{CopyOutcome, CopyPipeline, RetryPolicy};
pub use rename::RenameOutcome;
pub use watcher::{ChangeEvent, FileWatcher};

/// Errors that can occur while mirroring a single file
#[derive(Debug, Error)]
pub enum MirrorError {
    /// An I/O error not covered by a more specific variant
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A file is currently locked by another process
    #[error("File locked: {}", .0.display())]
    FileLocked(PathBuf),

    /// Insufficient filesystem permissions
    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    /// The specified path does not exist (possibly only for a moment)
    #[error("Path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    /// A domain-level error propagated from mirrorwatch-core
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl MirrorError {
    /// Classifies an I/O error raised while operating on `path`.
    pub fn from_io(source: io::Error, path: &Path) -> Self {
        let path = path.to_path_buf();
        if is_sharing_violation(&source) {
            return Self::FileLocked(path);
        }
        match source.kind() {
            io::ErrorKind::NotFound => Self::PathNotFound(path),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            _ => Self::Io { path, source },
        }
    }

    /// Whether retrying the same operation shortly may succeed.
    ///
    /// Locks and vanished paths are transient, as is any I/O kind not known
    /// to be permanent. Permission problems, malformed input and domain
    /// errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::FileLocked(_) | Self::PathNotFound(_) => true,
            Self::PermissionDenied(_) | Self::Domain(_) => false,
            Self::Io { source, .. } => !matches!(
                source.kind(),
                io::ErrorKind::PermissionDenied
                    | io::ErrorKind::InvalidInput
                    | io::ErrorKind::InvalidData
                    | io::ErrorKind::Unsupported
            ),
        }
    }
}

/// ERROR_SHARING_VIOLATION (32) and ERROR_LOCK_VIOLATION (33).
#[cfg(windows)]
fn is_sharing_violation(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(32) | Some(33))
}

#[cfg(not(windows))]
fn is_sharing_violation(_err: &io::Error) -> bool {
    false
}
