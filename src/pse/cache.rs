use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;

/// A single cached response payload.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Value,
    pub stored_at: Instant,
    pub max_age: Duration,
}

impl CacheEntry {
    /// An entry is expired iff it has been stored for longer than its
    /// max age (or the given override).
    pub fn is_expired(&self, override_max_age: Option<Duration>) -> bool {
        let max_age = override_max_age.unwrap_or(self.max_age);
        self.stored_at.elapsed() > max_age
    }
}

/// Time-boxed in-memory cache for raw API response envelopes.
///
/// Expired entries are never returned by [`get`], but remain available via
/// [`get_stale`] as a degraded fallback after a failed live fetch. When the
/// entry count exceeds `max_size`, expired entries are swept; if nothing is
/// expired the cache keeps growing (known limitation, matching the upstream
/// refresh pattern where entries are replaced in place).
///
/// [`get`]: ResponseCache::get
/// [`get_stale`]: ResponseCache::get_stale
pub struct ResponseCache {
    max_size: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the payload for `key` if present and still fresh.
    pub fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.lock().expect("cache lock poisoned");
        entries
            .get(key)
            .filter(|e| !e.is_expired(None))
            .map(|e| e.payload.clone())
    }

    /// Return the payload for `key` regardless of age.
    ///
    /// Only used as a last resort when the live fetch has already failed.
    pub fn get_stale(&self, key: &str) -> Option<Value> {
        let entries = self.entries.lock().expect("cache lock poisoned");
        entries.get(key).map(|e| e.payload.clone())
    }

    pub fn put(&self, key: &str, payload: Value, max_age: Duration) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.insert(
            key.to_string(),
            CacheEntry {
                payload,
                stored_at: Instant::now(),
                max_age,
            },
        );

        if entries.len() > self.max_size {
            entries.retain(|_, e| !e.is_expired(None));
            tracing::debug!(remaining = entries.len(), "cache sweep");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
