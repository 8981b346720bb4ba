//! File watching
//!
//! Provides a [`FileWatcher`] that wraps the `notify` crate to monitor a source
//! tree for changes, converting raw OS events into [`ChangeEvent`] values.
//!
//! ## Architecture
//!
//! ```text
//! inotify / FSEvents / ReadDirectoryChangesW
//!       │
//!       ▼
//!  FileWatcher  ──→  mpsc::channel  ──→  EventDispatcher  ──→  CopyPipeline
//! ```
//!
//! One `FileWatcher` exists per watch session, so events from different
//! definitions never share a channel.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Capacity of the channel between the OS callback thread and the session task.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ============================================================================
// ChangeEvent enum
// ============================================================================

/// Represents a filesystem change reported for a watched tree
///
/// These events are the internal representation used by the coordinator,
/// decoupled from the `notify` crate's raw event types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A new file or directory appeared at the given path
    Created(PathBuf),
    /// An existing file was written to or had its metadata changed
    Changed(PathBuf),
    /// A file or directory was renamed within the watched tree
    Renamed {
        /// The original path before the rename
        old: PathBuf,
        /// The new path after the rename
        new: PathBuf,
    },
    /// The notification source itself reported a problem
    Error(String),
}

// ============================================================================
// FileWatcher struct
// ============================================================================

/// Watches a directory tree for changes using the OS-native mechanism
///
/// The watcher converts raw OS events into [`ChangeEvent`] values and sends
/// them through an mpsc channel. Dropping the watcher stops all watches.
///
/// ## Usage
///
/// ```ignore
/// let (mut watcher, rx) = FileWatcher::new()?;
/// watcher.watch(Path::new("/srv/build/out"))?;
/// // rx.recv().await to get events
/// drop(watcher); // stops watching
/// ```
pub struct FileWatcher {
    /// The underlying notify watcher instance
    watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Creates a new `FileWatcher`
    ///
    /// Returns the watcher and a receiver channel for consuming change events.
    ///
    /// # Errors
    /// Returns an error if the underlying OS watcher cannot be created
    pub fn new() -> Result<(Self, mpsc::Receiver<ChangeEvent>)> {
        let (event_tx, event_rx) = mpsc::channel::<ChangeEvent>(EVENT_CHANNEL_CAPACITY);

        // The callback runs on notify's own thread, outside the tokio runtime,
        // so blocking_send is allowed here.
        let mut mapper = EventMapper::default();
        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| {
                let change = match res {
                    Ok(event) => mapper.map(&event),
                    Err(err) => Some(ChangeEvent::Error(err.to_string())),
                };
                if let Some(change) = change {
                    if let Err(e) = event_tx.blocking_send(change) {
                        warn!(error = %e, "Failed to send change event (receiver dropped)");
                    }
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create file watcher")?;

        Ok((Self { watcher }, event_rx))
    }

    /// Starts watching a directory recursively for filesystem changes
    ///
    /// # Errors
    /// Returns an error if the path cannot be watched (e.g., does not exist,
    /// insufficient permissions, or inotify watch limit reached)
    pub fn watch(&mut self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "Starting recursive watch");

        self.watcher
            .watch(path, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch path: {}", path.display()))
    }
}

// ============================================================================
// Event mapping - notify::Event → ChangeEvent
// ============================================================================

/// Pairs the two halves of a rename before it reaches the dispatcher
///
/// Backends report a rename differently: inotify sends `From`, `To` and then
/// `Both` sharing one tracker (the inotify cookie); ReadDirectoryChangesW
/// sends an untracked `From` immediately followed by `To`. A `To` that
/// completes the pending `From` becomes `ChangeEvent::Renamed` right away,
/// and the trailing `Both` for the same tracker is dropped.
///
/// A `To` with no matching `From` is a move into the tree.
#[derive(Debug, Default)]
struct EventMapper {
    /// Last unmatched `From` half: its tracker and path
    pending_from: Option<(Option<usize>, PathBuf)>,
    /// Tracker of the last rename already emitted from its halves
    paired_tracker: Option<usize>,
}

impl EventMapper {
    fn map(&mut self, event: &notify::Event) -> Option<ChangeEvent> {
        if event.need_rescan() {
            self.pending_from = None;
            self.paired_tracker = None;
            return map_notify_event(event);
        }

        let tracker = event.attrs.tracker();

        match &event.kind {
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                if let Some(old) = event.paths.first() {
                    self.pending_from = Some((tracker, old.clone()));
                }
                map_notify_event(event)
            }

            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                match (self.pending_from.take(), event.paths.first()) {
                    (Some((from_tracker, old)), Some(new)) if from_tracker == tracker => {
                        self.paired_tracker = tracker;
                        debug!(
                            old = %old.display(),
                            new = %new.display(),
                            "Paired rename halves"
                        );
                        Some(ChangeEvent::Renamed {
                            old,
                            new: new.clone(),
                        })
                    }
                    _ => map_notify_event(event),
                }
            }

            EventKind::Modify(ModifyKind::Name(RenameMode::Both))
                if tracker.is_some() && tracker == self.paired_tracker =>
            {
                self.paired_tracker = None;
                debug!(paths = ?event.paths, "Rename already emitted from its halves");
                None
            }

            _ => {
                self.pending_from = None;
                map_notify_event(event)
            }
        }
    }
}

/// Converts a `notify::Event` into our internal `ChangeEvent`
///
/// Maps the notify event kinds as follows:
/// - any event flagged for rescan -> `ChangeEvent::Error` (events were dropped)
/// - `Create(*)` -> `ChangeEvent::Created`
/// - `Modify(Name(Both))` with 2 paths -> `ChangeEvent::Renamed`
/// - `Modify(Name(To))` -> `ChangeEvent::Created` (moved into the tree)
/// - `Modify(Name(From))` -> ignored (moved away; deletions are not mirrored)
///
/// Paired rename halves are handled by [`EventMapper`] before this runs.
/// - Other `Modify(*)` -> `ChangeEvent::Changed`
///
/// Returns `None` for events that have no associated paths or that should
/// be ignored (access and remove events).
fn map_notify_event(event: &notify::Event) -> Option<ChangeEvent> {
    if event.need_rescan() {
        return Some(ChangeEvent::Error(
            "event queue overflowed; some changes may have been missed".to_string(),
        ));
    }

    let paths = &event.paths;

    match &event.kind {
        EventKind::Create(_) => {
            let path = paths.first()?;
            debug!(path = %path.display(), "Mapped Create event");
            Some(ChangeEvent::Created(path.clone()))
        }

        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if paths.len() >= 2 {
                let old = paths[0].clone();
                let new = paths[1].clone();
                debug!(
                    old = %old.display(),
                    new = %new.display(),
                    "Mapped Rename event"
                );
                Some(ChangeEvent::Renamed { old, new })
            } else {
                // Fallback: treat as a change of the only known path
                let path = paths.first()?;
                debug!(path = %path.display(), "Rename with single path, treating as Changed");
                Some(ChangeEvent::Changed(path.clone()))
            }
        }

        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            let path = paths.first()?;
            debug!(path = %path.display(), "Mapped rename target as Create");
            Some(ChangeEvent::Created(path.clone()))
        }

        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            debug!(paths = ?paths, "Ignoring rename source half");
            None
        }

        EventKind::Modify(_) => {
            let path = paths.first()?;
            debug!(path = %path.display(), kind = ?event.kind, "Mapped Modify event");
            Some(ChangeEvent::Changed(path.clone()))
        }

        _ => {
            debug!(kind = ?event.kind, "Ignoring event kind");
            None
        }
    }
}
