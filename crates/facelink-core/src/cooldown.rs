//! Per-person announcement cooldown.
//!
//! Suppresses repeated "X is here" announcements while the same visitor
//! keeps being sighted. Every sighting refreshes the window, so the
//! cooldown measures time since the most recent detection, not since the
//! last announcement — a continuous visit stays silent until the visitor
//! has been out of frame for a full window.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Default suppression window between announced sightings.
pub const DEFAULT_COOLDOWN_MINUTES: i64 = 5;

/// Keyed last-seen store with per-person locking.
///
/// The outer map is read-locked on the hot path; each person's timestamp
/// sits behind its own mutex so concurrent sightings of the same person
/// serialize their read-modify-write without blocking other people.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    entries: RwLock<HashMap<String, Arc<Mutex<DateTime<Utc>>>>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tracker pre-populated with persisted last-seen times.
    pub fn preloaded(entries: impl IntoIterator<Item = (String, DateTime<Utc>)>) -> Self {
        let map = entries
            .into_iter()
            .map(|(k, t)| (k, Arc::new(Mutex::new(t))))
            .collect();
        Self {
            entries: RwLock::new(map),
        }
    }

    /// Record a sighting of `person_id` at `now` and decide whether to
    /// announce it.
    ///
    /// First-ever sightings always announce. A sighting within `window`
    /// of the previous one is suppressed. Either way the last-seen time
    /// advances to `now`. Negative elapsed time (clock skew) counts as
    /// within the window so a stepped-back clock cannot re-announce.
    pub fn observe(&self, person_id: &str, now: DateTime<Utc>, window: Duration) -> bool {
        let slot = self.slot(person_id);

        let Some(slot) = slot else {
            // First sighting: insert under the write lock. Another request
            // may have raced us here, so re-check before inserting.
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            if let Some(existing) = entries.get(person_id) {
                let existing = Arc::clone(existing);
                drop(entries);
                return Self::advance(&existing, now, window);
            }
            entries.insert(person_id.to_string(), Arc::new(Mutex::new(now)));
            return true;
        };

        Self::advance(&slot, now, window)
    }

    /// Most recent sighting for a person, if any.
    pub fn last_seen(&self, person_id: &str) -> Option<DateTime<Utc>> {
        self.slot(person_id)
            .map(|s| *s.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Drop a person's cooldown state (person removed).
    pub fn forget(&self, person_id: &str) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(person_id);
    }

    fn slot(&self, person_id: &str) -> Option<Arc<Mutex<DateTime<Utc>>>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(person_id)
            .map(Arc::clone)
    }

    fn advance(slot: &Mutex<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) -> bool {
        let mut last = slot.lock().unwrap_or_else(|e| e.into_inner());
        let announce = now.signed_duration_since(*last) >= window;
        *last = now;
        announce
    }
}
