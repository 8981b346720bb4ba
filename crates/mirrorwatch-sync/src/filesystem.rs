//! Local filesystem adapter (secondary/driven adapter)
//!
//! Implements [`IMirrorFileSystem`] using `tokio::fs` for async file operations.
//!
//! ## Design Decisions
//!
//! - **Plain overwrite**: copies go straight onto the destination path. A
//!   reader of the destination tree may briefly see a partially written file.
//! - **No lock probing**: lock contention is discovered by the copy itself
//!   failing, and the pipeline's retry loop handles it.

use std::io;
use std::path::Path;

use mirrorwatch_core::ports::IMirrorFileSystem;
use tracing::{debug, instrument};

// ============================================================================
// LocalFileSystemAdapter struct
// ============================================================================

/// Adapter that bridges the [`IMirrorFileSystem`] port to the real filesystem.
///
/// This is a zero-sized struct because all operations derive their context
/// from their path arguments.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystemAdapter;

impl LocalFileSystemAdapter {
    /// Create a new `LocalFileSystemAdapter`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl IMirrorFileSystem for LocalFileSystemAdapter {
    async fn is_file(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        debug!("creating directory tree");
        tokio::fs::create_dir_all(path).await
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        debug!("removing file");
        tokio::fs::remove_file(path).await
    }

    #[instrument(skip(self), fields(from = %from.display(), to = %to.display()))]
    async fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let bytes = tokio::fs::copy(from, to).await?;
        debug!(bytes, "copy complete");
        Ok(bytes)
    }
}
