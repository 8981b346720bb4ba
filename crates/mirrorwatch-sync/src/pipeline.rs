//! Copy pipeline
//!
//! The [`CopyPipeline`] mirrors one changed source file into its destination
//! tree. It is the only place that writes file content.
//!
//! ## Flow
//!
//! 1. Skip if the source is gone or is not a regular file
//! 2. Apply the definition's extension filter
//! 3. Re-root the path under the destination and create missing parents
//! 4. Up to [`RetryPolicy::max_attempts`] attempts, each one:
//!    optional delete of the stale destination, settle delay (first attempt
//!    only), overwrite copy
//!
//! ## Retry Logic
//!
//! Transient errors (locks, paths that vanish for a moment) are retried after
//! a fixed pause. Anything else stops the loop at once. Nothing is returned
//! as an error: every failure ends as a log line and a [`CopyOutcome`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use mirrorwatch_core::domain::{DebounceKey, WatchDefinition};
use mirrorwatch_core::ports::IMirrorFileSystem;
use tracing::{debug, error, info, warn};

use crate::debouncer::Debouncer;
use crate::MirrorError;

/// Maximum number of copy attempts per accepted event
const MAX_ATTEMPTS: u32 = 5;

/// Pause after a transient failure before the next attempt
const RETRY_PAUSE: Duration = Duration::from_millis(500);

// ============================================================================
// RetryPolicy
// ============================================================================

/// Bounds of the copy retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Fixed pause after each transient failure
    pub pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            pause: RETRY_PAUSE,
        }
    }
}

// ============================================================================
// CopyOutcome
// ============================================================================

/// How a single copy request ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    /// The file now exists at `destination`
    Copied {
        destination: PathBuf,
        bytes: u64,
        attempts: u32,
    },
    /// The source no longer exists or is not a regular file
    SourceUnavailable,
    /// The extension filter rejected the file
    Filtered,
    /// The path is not under the definition's source root
    OutsideSourceRoot,
    /// A non-retryable error stopped the operation
    Aborted { attempts: u32 },
    /// Every attempt failed with a transient error
    Exhausted { attempts: u32 },
}

impl CopyOutcome {
    /// Returns true if the file reached the destination
    pub fn is_copied(&self) -> bool {
        matches!(self, CopyOutcome::Copied { .. })
    }
}

// ============================================================================
// CopyPipeline
// ============================================================================

/// Mirrors changed files into their destination tree
pub struct CopyPipeline {
    fs: Arc<dyn IMirrorFileSystem>,
    debouncer: Arc<Debouncer>,
    retry: RetryPolicy,
}

impl CopyPipeline {
    /// Creates a pipeline with the default retry policy (5 attempts, 500 ms)
    pub fn new(fs: Arc<dyn IMirrorFileSystem>, debouncer: Arc<Debouncer>) -> Self {
        Self {
            fs,
            debouncer,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The debounce table shared with the coordinator
    pub fn debouncer(&self) -> &Arc<Debouncer> {
        &self.debouncer
    }

    pub(crate) fn filesystem(&self) -> &dyn IMirrorFileSystem {
        self.fs.as_ref()
    }

    /// Copies `source` into the destination tree of `definition`
    ///
    /// On success the debounce key for `source` is refreshed so the write
    /// events produced while copying do not trigger another copy.
    pub async fn copy(&self, source: &Path, definition: &WatchDefinition) -> CopyOutcome {
        if !self.fs.is_file(source).await {
            debug!(path = %source.display(), "Source is not a file (anymore), skipping");
            return CopyOutcome::SourceUnavailable;
        }

        if !definition.accepts(source) {
            debug!(path = %source.display(), "Extension filtered out");
            return CopyOutcome::Filtered;
        }

        let destination = match definition.destination_for(source) {
            Ok(destination) => destination,
            Err(err) => {
                warn!(path = %source.display(), error = %err, "Cannot map path to destination");
                return CopyOutcome::OutsideSourceRoot;
            }
        };

        if let Some(parent) = destination.parent() {
            if let Err(err) = self.fs.create_dir_all(parent).await {
                let err = MirrorError::from_io(err, parent);
                error!(
                    destination = %destination.display(),
                    error = %err,
                    "Failed to create destination directory"
                );
                return CopyOutcome::Aborted { attempts: 0 };
            }
        }

        info!(
            path = %source.display(),
            detected_at = %Local::now().format("%H:%M:%S"),
            "Change detected"
        );

        let max_attempts = self.retry.max_attempts;
        let mut settled = false;

        for attempt in 1..=max_attempts {
            match self
                .attempt(source, &destination, definition, &mut settled)
                .await
            {
                Ok(bytes) => {
                    self.debouncer
                        .record(&DebounceKey::new(definition, source), Utc::now());
                    info!(
                        destination = %destination.display(),
                        bytes,
                        attempt,
                        "Copied"
                    );
                    return CopyOutcome::Copied {
                        destination,
                        bytes,
                        attempts: attempt,
                    };
                }
                Err(err) if err.is_transient() => {
                    warn!(
                        path = %source.display(),
                        attempt,
                        max_attempts,
                        error = %err,
                        "IO error while copying"
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry.pause).await;
                    }
                }
                Err(err) => {
                    error!(
                        path = %source.display(),
                        attempt,
                        error = %err,
                        "Error copying file, not retrying"
                    );
                    error!(path = %source.display(), attempts = attempt, "Failed to copy");
                    return CopyOutcome::Aborted { attempts: attempt };
                }
            }
        }

        error!(
            path = %source.display(),
            attempts = max_attempts,
            "Failed to copy after exhausting all attempts"
        );
        CopyOutcome::Exhausted {
            attempts: max_attempts,
        }
    }

    /// One pass of the retry loop
    ///
    /// The stale-destination delete runs on every attempt; the settle delay
    /// only runs until `settled` is set.
    async fn attempt(
        &self,
        source: &Path,
        destination: &Path,
        definition: &WatchDefinition,
        settled: &mut bool,
    ) -> Result<u64, MirrorError> {
        if definition.remove_before_copy && self.fs.is_file(destination).await {
            self.fs
                .remove_file(destination)
                .await
                .map_err(|e| MirrorError::from_io(e, destination))?;
            debug!(path = %destination.display(), "Removed stale destination file");
        }

        if !*settled {
            *settled = true;
            let delay = definition.settle_delay();
            if !delay.is_zero() {
                debug!(delay_secs = delay.as_secs(), "Waiting for writer to release the file");
                tokio::time::sleep(delay).await;
            }
        }

        self.fs
            .copy_file(source, destination)
            .await
            .map_err(|e| MirrorError::from_io(e, source))
    }
}

impl std::fmt::Debug for CopyPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyPipeline")
            .field("retry", &self.retry)
            .field("debounce_entries", &self.debouncer.len())
            .finish()
    }
}
