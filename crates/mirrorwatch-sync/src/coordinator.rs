//! Watch coordinator - one isolated session per watch definition
//!
//! The [`WatchCoordinator`] validates each [`WatchDefinition`], starts a
//! [`WatchSession`] for the valid ones, and keeps them alive until shutdown.
//!
//! ## Flow
//!
//! ```text
//! FileWatcher ──→ mpsc::Receiver ──→ session task ──→ EventDispatcher
//!                                                         │
//!                                          Debouncer gate │
//!                                                         ▼
//!                                   tokio::spawn(copy / rename) per event
//! ```
//!
//! Sessions share nothing but the [`Debouncer`] inside the pipeline. Each
//! accepted event runs on its own task, so a slow copy (settle delay, retry
//! pauses) only holds up that event, and a panic is contained to it.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use mirrorwatch_core::domain::{DebounceKey, WatchDefinition};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::debouncer::Debouncer;
use crate::pipeline::CopyPipeline;
use crate::watcher::{ChangeEvent, FileWatcher};

/// How often stale debounce entries are swept
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// ============================================================================
// EventDispatcher
// ============================================================================

/// Routes the events of one definition to the pipeline
///
/// Cheap to clone; every spawned handler carries its own clone.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    definition: Arc<WatchDefinition>,
    pipeline: Arc<CopyPipeline>,
}

impl EventDispatcher {
    pub fn new(definition: Arc<WatchDefinition>, pipeline: Arc<CopyPipeline>) -> Self {
        Self {
            definition,
            pipeline,
        }
    }

    pub fn definition(&self) -> &WatchDefinition {
        &self.definition
    }

    /// Handles one event from the notification source
    ///
    /// Returns the handle of the task spawned for the event, or `None` when
    /// the event was debounced or only logged. Must be called from within a
    /// tokio runtime.
    pub fn dispatch(&self, event: ChangeEvent) -> Option<JoinHandle<()>> {
        match event {
            ChangeEvent::Error(message) => {
                error!(
                    source_root = %self.definition.source_root.display(),
                    error = %message,
                    "File watcher error"
                );
                None
            }

            ChangeEvent::Created(path) | ChangeEvent::Changed(path) => {
                if self.is_debounced(&path) {
                    return None;
                }
                let this = self.clone();
                let handler_path = path.clone();
                Some(self.spawn_isolated(path, async move {
                    this.pipeline.copy(&handler_path, &this.definition).await;
                }))
            }

            ChangeEvent::Renamed { old, new } => {
                if self.is_debounced(&new) {
                    return None;
                }
                let this = self.clone();
                let handler_path = new.clone();
                Some(self.spawn_isolated(new, async move {
                    this.pipeline
                        .rename(&old, &handler_path, &this.definition)
                        .await;
                }))
            }
        }
    }

    fn is_debounced(&self, path: &Path) -> bool {
        let key = DebounceKey::new(&self.definition, path);
        let suppressed = self
            .pipeline
            .debouncer()
            .should_suppress(&key, Utc::now());
        if suppressed {
            trace!(path = %path.display(), "Debounced duplicate event");
        }
        suppressed
    }

    /// Runs `handler` on its own task and logs it if it panics
    ///
    /// The returned handle resolves once the handler has finished, whatever
    /// the way it finished.
    fn spawn_isolated<F>(&self, path: PathBuf, handler: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let source_root = self.definition.source_root.clone();
        let inner = tokio::spawn(handler);

        tokio::spawn(async move {
            if let Err(err) = inner.await {
                if err.is_panic() {
                    error!(
                        source_root = %source_root.display(),
                        path = %path.display(),
                        "Event handler panicked; event dropped"
                    );
                } else {
                    debug!(path = %path.display(), "Event handler cancelled");
                }
            }
        })
    }
}

// ============================================================================
// WatchSession
// ============================================================================

/// An active watch on one definition's source tree
///
/// Dropping the session stops the OS watch and its dispatch task.
pub struct WatchSession {
    definition: Arc<WatchDefinition>,
    _watcher: FileWatcher,
    task: JoinHandle<()>,
}

impl WatchSession {
    /// Starts watching `definition.source_root` recursively
    ///
    /// # Errors
    /// Returns an error if the OS watcher cannot be created or the root
    /// cannot be watched
    pub fn start(definition: Arc<WatchDefinition>, pipeline: Arc<CopyPipeline>) -> Result<Self> {
        let (mut watcher, mut events) = FileWatcher::new()?;
        watcher.watch(&definition.source_root)?;

        let dispatcher = EventDispatcher::new(Arc::clone(&definition), pipeline);
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                dispatcher.dispatch(event);
            }
            debug!(
                source_root = %dispatcher.definition().source_root.display(),
                "Watch session event channel closed"
            );
        });

        Ok(Self {
            definition,
            _watcher: watcher,
            task,
        })
    }

    pub fn definition(&self) -> &WatchDefinition {
        &self.definition
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSession")
            .field("source_root", &self.definition.source_root)
            .field("destination_root", &self.definition.destination_root)
            .finish()
    }
}

// ============================================================================
// WatchCoordinator
// ============================================================================

/// Owns every watch session for the lifetime of the process
#[derive(Debug)]
pub struct WatchCoordinator {
    sessions: Vec<WatchSession>,
    sweeper: JoinHandle<()>,
}

impl WatchCoordinator {
    /// Validates each definition and starts a session for the valid ones
    ///
    /// Definitions whose roots are missing, or whose source cannot be
    /// watched, are logged and skipped; the rest are unaffected. Must be
    /// called from within a tokio runtime.
    pub fn start<I>(definitions: I, pipeline: Arc<CopyPipeline>) -> Self
    where
        I: IntoIterator<Item = WatchDefinition>,
    {
        let mut sessions = Vec::new();

        for definition in definitions {
            if let Err(err) = definition.validate_roots() {
                warn!(
                    source_root = %definition.source_root.display(),
                    destination_root = %definition.destination_root.display(),
                    error = %err,
                    "Invalid paths in config, skipping"
                );
                continue;
            }

            let definition = Arc::new(definition);
            match WatchSession::start(Arc::clone(&definition), Arc::clone(&pipeline)) {
                Ok(session) => {
                    info!(
                        source_root = %definition.source_root.display(),
                        destination_root = %definition.destination_root.display(),
                        "Watching folder"
                    );
                    sessions.push(session);
                }
                Err(err) => {
                    error!(
                        source_root = %definition.source_root.display(),
                        error = %format!("{err:#}"),
                        "Failed to start watch, skipping"
                    );
                }
            }
        }

        let sweeper = spawn_sweeper(Arc::clone(pipeline.debouncer()));

        Self { sessions, sweeper }
    }

    /// Number of active sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Source roots of the active sessions, in configuration order
    pub fn watched_roots(&self) -> impl Iterator<Item = &Path> {
        self.sessions
            .iter()
            .map(|session| session.definition().source_root.as_path())
    }

    /// Stops every session and the debounce sweeper
    ///
    /// Copies already in flight run to completion on their own tasks.
    pub fn shutdown(self) {
        let count = self.sessions.len();
        drop(self);
        info!(sessions = count, "Stopped all watch sessions");
    }
}

impl Drop for WatchCoordinator {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

/// Periodically drops debounce entries that can no longer suppress anything
fn spawn_sweeper(debouncer: Arc<Debouncer>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            debouncer.evict_stale(Utc::now());
        }
    })
}
