//! Watch definitions and debounce keys
//!
//! A [`WatchDefinition`] is one configured mirroring rule: a source tree, the
//! destination tree it is mirrored into, and the knobs that control how each
//! copy is performed. Definitions are immutable once loaded.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Settle delay applied when a definition does not specify one.
pub const DEFAULT_SETTLE_DELAY_SECONDS: u64 = 1;

fn default_settle_delay_seconds() -> u64 {
    DEFAULT_SETTLE_DELAY_SECONDS
}

// ============================================================================
// WatchDefinition
// ============================================================================

/// One source → destination mirroring rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchDefinition {
    /// Directory tree whose changes are mirrored.
    pub source_root: PathBuf,
    /// Directory tree receiving the copies.
    pub destination_root: PathBuf,
    /// Case-insensitive extensions (with leading dot) to mirror. `None` or an
    /// empty list lets every file through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,
    /// Delete an existing destination file before copying over it.
    #[serde(default)]
    pub remove_before_copy: bool,
    /// Seconds to wait before the first copy attempt so the writer can
    /// release its lock.
    #[serde(default = "default_settle_delay_seconds")]
    pub settle_delay_seconds: u64,
}

impl WatchDefinition {
    /// Create a definition with no filter, no pre-copy removal and the
    /// default settle delay.
    pub fn new(source_root: impl Into<PathBuf>, destination_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            destination_root: destination_root.into(),
            extensions: None,
            remove_before_copy: false,
            settle_delay_seconds: DEFAULT_SETTLE_DELAY_SECONDS,
        }
    }

    /// Restrict mirroring to the given extensions.
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = Some(extensions.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_remove_before_copy(mut self, remove: bool) -> Self {
        self.remove_before_copy = remove;
        self
    }

    #[must_use]
    pub fn with_settle_delay_seconds(mut self, seconds: u64) -> Self {
        self.settle_delay_seconds = seconds;
        self
    }

    /// The settle delay as a [`Duration`].
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_seconds)
    }

    /// Returns true if the extension filter is active.
    pub fn has_extension_filter(&self) -> bool {
        self.extensions.as_ref().is_some_and(|exts| !exts.is_empty())
    }

    /// Whether `path` passes the extension filter.
    ///
    /// Comparison is case-insensitive. Configured entries may omit the
    /// leading dot. A file without an extension only passes when no filter
    /// is configured.
    pub fn accepts(&self, path: &Path) -> bool {
        if !self.has_extension_filter() {
            return true;
        }

        let Some(ext) = path.extension() else {
            return false;
        };
        let ext = format!(".{}", ext.to_string_lossy().to_lowercase());

        self.extensions
            .iter()
            .flatten()
            .any(|candidate| normalize_extension(candidate) == ext)
    }

    /// Path of `path` relative to the source root.
    ///
    /// # Errors
    /// Returns [`DomainError::PathNotInSourceRoot`] when `path` lies outside
    /// the source tree, and [`DomainError::InvalidPath`] when it is the root.
    pub fn relative_path<'a>(&self, path: &'a Path) -> Result<&'a Path, DomainError> {
        let relative =
            path.strip_prefix(&self.source_root)
                .map_err(|_| DomainError::PathNotInSourceRoot {
                    path: path.to_path_buf(),
                    root: self.source_root.clone(),
                })?;

        if relative.as_os_str().is_empty() {
            return Err(DomainError::InvalidPath(path.to_path_buf()));
        }

        Ok(relative)
    }

    /// Re-roots `path` from the source tree into the destination tree,
    /// preserving its subdirectory structure.
    pub fn destination_for(&self, path: &Path) -> Result<PathBuf, DomainError> {
        Ok(self.destination_root.join(self.relative_path(path)?))
    }

    /// Checks that both roots exist and are directories.
    pub fn validate_roots(&self) -> Result<(), DomainError> {
        if !self.source_root.is_dir() {
            return Err(DomainError::SourceRootMissing(self.source_root.clone()));
        }
        if !self.destination_root.is_dir() {
            return Err(DomainError::DestinationRootMissing(
                self.destination_root.clone(),
            ));
        }
        Ok(())
    }
}

/// Lower-cases an extension and makes sure it starts with a dot.
fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

// ============================================================================
// DebounceKey
// ============================================================================

/// Identifies a (definition, path) pair in the debounce table.
///
/// Two definitions watching overlapping trees debounce independently because
/// the source root is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DebounceKey {
    source_root: PathBuf,
    path: PathBuf,
}

impl DebounceKey {
    pub fn new(definition: &WatchDefinition, path: &Path) -> Self {
        Self {
            source_root: definition.source_root.clone(),
            path: path.to_path_buf(),
        }
    }
}

impl Display for DebounceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.source_root.display(), self.path.display())
    }
}
