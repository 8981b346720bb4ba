//! Rename handling
//!
//! A rename inside a watched tree is mirrored as "delete the old counterpart,
//! then copy the new path". The two steps are not atomic: if the process dies
//! in between, the destination holds neither name until the next event.

use std::path::Path;

use mirrorwatch_core::domain::WatchDefinition;
use tracing::{debug, error, info, warn};

use crate::pipeline::{CopyOutcome, CopyPipeline};
use crate::MirrorError;

/// Result of mirroring one rename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameOutcome {
    /// Whether the old destination counterpart was deleted
    pub removed_old: bool,
    /// What happened when the new path was copied
    pub copy: CopyOutcome,
}

impl CopyPipeline {
    /// Mirrors a rename from `old` to `new`
    ///
    /// Failures while deleting the old counterpart are logged and swallowed;
    /// the copy of `new` always runs.
    pub async fn rename(&self, old: &Path, new: &Path, definition: &WatchDefinition) -> RenameOutcome {
        let removed_old = self.remove_counterpart(old, definition).await;
        let copy = self.copy(new, definition).await;
        RenameOutcome { removed_old, copy }
    }

    async fn remove_counterpart(&self, old: &Path, definition: &WatchDefinition) -> bool {
        let destination = match definition.destination_for(old) {
            Ok(destination) => destination,
            Err(err) => {
                warn!(path = %old.display(), error = %err, "Cannot map renamed path to destination");
                return false;
            }
        };

        if !self.filesystem().is_file(&destination).await {
            debug!(path = %destination.display(), "No destination counterpart for old name");
            return false;
        }

        match self.filesystem().remove_file(&destination).await {
            Ok(()) => {
                info!(path = %destination.display(), "Deleted old renamed file");
                true
            }
            Err(err) => {
                let err = MirrorError::from_io(err, &destination);
                error!(path = %destination.display(), error = %err, "Error deleting old file");
                false
            }
        }
    }
}
