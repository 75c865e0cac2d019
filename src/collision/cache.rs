//! TTL cache of probe results.
//!
//! Keys are `(owner, sorted unique names)`, so the same set of names asked
//! in any order hits the same entry. Expiry is checked lazily on read and
//! on `stats`; a capacity cap bounds memory in long-running processes by
//! dropping expired entries first and then the oldest one.

use super::types::CollisionMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    owner_id: String,
    names: Vec<String>,
}

impl CacheKey {
    fn new(owner_id: &str, names: &[String]) -> Self {
        let mut names = names.to_vec();
        names.sort_unstable();
        names.dedup();
        Self {
            owner_id: owner_id.to_string(),
            names,
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    result: CollisionMap,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub ttl_seconds: u64,
}

/// Thread-safe probe result cache.
#[derive(Debug)]
pub struct CollisionCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl CollisionCache {
    /// Creates a cache whose entries default to `ttl`, holding at most
    /// `max_entries` results.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Default TTL for entries.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached result for exactly this owner and name set, if still fresh.
    pub fn get(&self, owner_id: &str, names: &[String]) -> Option<CollisionMap> {
        let key = CacheKey::new(owner_id, names);
        let mut entries = self.entries.lock();
        let expired = entries.get(&key)?.is_expired(Instant::now());
        if expired {
            entries.remove(&key);
            return None;
        }
        entries.get(&key).map(|e| e.result.clone())
    }

    /// Stores a result for this owner and name set.
    pub fn put(&self, owner_id: &str, names: &[String], result: CollisionMap, ttl: Duration) {
        let key = CacheKey::new(owner_id, names);
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            entries.retain(|_, e| !e.is_expired(now));
            if entries.len() >= self.max_entries
                && let Some(oldest) = entries
                    .iter()
                    .min_by_key(|(_, e)| e.inserted_at)
                    .map(|(k, _)| k.clone())
            {
                debug!(owner = %oldest.owner_id, "Evicting oldest collision cache entry");
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            CacheEntry {
                result,
                inserted_at: now,
                ttl,
            },
        );
    }

    /// Drops every entry for `owner_id`. Returns how many were removed.
    pub fn invalidate_owner(&self, owner_id: &str) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| key.owner_id != owner_id);
        before - entries.len()
    }

    /// Drops every entry. Returns how many were removed.
    pub fn invalidate_all(&self) -> usize {
        let mut entries = self.entries.lock();
        let removed = entries.len();
        entries.clear();
        removed
    }

    /// Drops expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        before - entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.entries.lock();
        let expired_entries = entries.values().filter(|e| e.is_expired(now)).count();
        CacheStats {
            total_entries: entries.len(),
            valid_entries: entries.len() - expired_entries,
            expired_entries,
            ttl_seconds: self.ttl.as_secs(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
