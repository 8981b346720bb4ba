//! Sliding-window debouncing of change events
//!
//! Editors and build tools rarely write a file in one go: a single save can
//! produce a create, several data writes and a metadata change. The
//! [`Debouncer`] collapses such a burst into one logical action per
//! (definition, path) pair.
//!
//! ## Semantics
//!
//! Every evaluation refreshes the last-seen timestamp, including evaluations
//! that end in suppression. A burst that keeps arriving faster than the
//! interval therefore stays suppressed until it pauses for at least one full
//! interval.
//!
//! The table is shared by every watch session, so it lives in a [`DashMap`]
//! whose entry API gives an atomic read-modify-write per key.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mirrorwatch_core::domain::DebounceKey;
use tracing::{debug, trace};

/// Quiet period required between two accepted events for the same key.
pub const DEBOUNCE_INTERVAL: Duration = Duration::from_millis(500);

/// Concurrency-safe table of last-seen timestamps.
#[derive(Debug)]
pub struct Debouncer {
    last_seen: DashMap<DebounceKey, DateTime<Utc>>,
    interval: Duration,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEBOUNCE_INTERVAL)
    }
}

impl Debouncer {
    /// Creates an empty debouncer with the given interval
    pub fn new(interval: Duration) -> Self {
        Self {
            last_seen: DashMap::new(),
            interval,
        }
    }

    /// The configured quiet period
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Decides whether an event for `key` observed at `now` is a duplicate
    ///
    /// Returns `true` when the previous evaluation for `key` happened less
    /// than one interval before `now`. In every case `now` becomes the new
    /// last-seen time.
    pub fn should_suppress(&self, key: &DebounceKey, now: DateTime<Utc>) -> bool {
        match self.last_seen.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let previous = entry.insert(now);
                let suppress = self.within_window(previous, now);
                trace!(key = %key, suppress, "Debounce check");
                suppress
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                trace!(key = %key, "First sighting");
                false
            }
        }
    }

    /// Unconditionally records `now` as the last-seen time for `key`
    pub fn record(&self, key: &DebounceKey, now: DateTime<Utc>) {
        self.last_seen.insert(key.clone(), now);
    }

    /// Last-seen time for `key`, if any
    pub fn last_seen(&self, key: &DebounceKey) -> Option<DateTime<Utc>> {
        self.last_seen.get(key).map(|entry| *entry.value())
    }

    /// Removes entries that can no longer suppress anything
    ///
    /// An entry at least one interval old would let the next event through
    /// anyway, so dropping it does not change any decision.
    ///
    /// # Returns
    /// The number of entries removed
    pub fn evict_stale(&self, now: DateTime<Utc>) -> usize {
        let before = self.last_seen.len();
        self.last_seen
            .retain(|_, last| self.within_window(*last, now));
        let removed = before.saturating_sub(self.last_seen.len());
        if removed > 0 {
            debug!(removed, remaining = self.last_seen.len(), "Evicted stale debounce entries");
        }
        removed
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    /// Returns true if no keys are tracked
    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }

    /// A timestamp later than `now` (clock stepped backwards) counts as
    /// inside the window.
    fn within_window(&self, last: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match (now - last).to_std() {
            Ok(elapsed) => elapsed < self.interval,
            Err(_) => true,
        }
    }
}
