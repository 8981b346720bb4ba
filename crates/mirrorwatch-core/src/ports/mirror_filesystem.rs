//! Mirror filesystem port (driven/secondary port)
//!
//! The copy pipeline never touches `std::fs` or `tokio::fs` directly. It goes
//! through [`IMirrorFileSystem`] so that the real adapter can be replaced by a
//! test double that injects locks, permission errors, or panics.
//!
//! ## Design Notes
//!
//! - Uses `std::io::Result` rather than `anyhow::Result`: the pipeline decides
//!   whether to retry from the [`std::io::ErrorKind`], so the kind must survive.
//! - Existence checks return `bool` and never fail; an unreadable path is
//!   reported as absent.

use std::io;
use std::path::Path;

/// Port trait for the filesystem primitives the mirroring engine needs
///
/// All paths are absolute. Implementations must be safe to call concurrently
/// from many event-handling tasks.
#[async_trait::async_trait]
pub trait IMirrorFileSystem: Send + Sync {
    /// Returns true if `path` exists and is a regular file
    async fn is_file(&self, path: &Path) -> bool;

    /// Creates a directory and all missing parents (`mkdir -p`)
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Removes a single file
    ///
    /// # Errors
    /// Returns an error if the file does not exist or cannot be removed
    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Copies `from` to `to`, overwriting `to` if it exists
    ///
    /// # Returns
    /// The number of bytes copied
    async fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64>;
}
