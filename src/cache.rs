//! Short-lived result cache keyed by a caller-chosen frame id.
//!
//! Per id: absent -> fresh -> stale -> evicted. Lookups treat stale entries as
//! misses and drop them on the spot; `sweep_expired` clears every stale entry
//! at once. At most one entry exists per id and `store` is last-write-wins.
//!
//! The cache keeps its own copy of the processed frame. Callers receive clones,
//! so nothing they do to a returned frame can alter a cached one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::detect::Detection;
use crate::frame::Frame;

pub const DEFAULT_TTL: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_ENTRIES: usize = 30;

struct CacheEntry {
    frame: Arc<Frame>,
    detections: Arc<[Detection]>,
    created_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) < ttl
    }
}

/// Thread-safe bounded TTL map from frame id to `(processed frame, detections)`.
pub struct TemporalCache {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl TemporalCache {
    /// `max_entries` below 1 is treated as 1.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Fresh entry for `frame_id`, if any.
    pub fn lookup(&self, frame_id: &str) -> Option<(Frame, Vec<Detection>)> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(frame_id) {
            Some(entry) if entry.is_fresh(now, self.ttl) => {
                Some((Frame::clone(&entry.frame), entry.detections.to_vec()))
            }
            Some(_) => {
                entries.remove(frame_id);
                None
            }
            None => None,
        }
    }

    /// Insert or overwrite the entry for `frame_id`.
    ///
    /// A new id arriving at capacity first triggers a sweep of stale entries,
    /// then evicts the oldest entry if still full.
    pub fn store(&self, frame_id: &str, frame: &Frame, detections: &[Detection]) {
        let now = Instant::now();
        let mut entries = self.lock();
        if !entries.contains_key(frame_id) && entries.len() >= self.max_entries {
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.is_fresh(now, ttl));
            if entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.created_at)
                    .map(|(id, _)| id.clone());
                if let Some(id) = oldest {
                    log::debug!("cache full, evicting '{}'", id);
                    entries.remove(&id);
                }
            }
        }
        entries.insert(
            frame_id.to_string(),
            CacheEntry {
                frame: Arc::new(frame.clone()),
                detections: detections.into(),
                created_at: now,
            },
        );
    }

    /// Drop every stale entry. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now, ttl));
        before - entries.len()
    }

    /// Entries currently held, stale ones included until swept.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        // Entries are replaced whole under the lock, so a panicking holder
        // cannot leave a half-written one behind.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for TemporalCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}
