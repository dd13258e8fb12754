//! Last-known-good upstream responses with fresh and stale reads.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde_json::Value;

use crate::cache::clock::Clock;
use crate::observability::metrics;

/// Upstream cache validators, forwarded opaquely to clients.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// A cached upstream response body and its validators.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPayload {
    pub body: Value,
    pub validators: Validators,
}

impl CachedPayload {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            validators: Validators::default(),
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    payload: CachedPayload,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.stored_at)
    }
}

/// Bounded LRU store keyed by canonical upstream URL.
///
/// Entries are ordered oldest-use first; every read moves the entry to the
/// back and an insert past capacity evicts the front.
pub struct ResponseCache {
    entries: Mutex<IndexMap<String, CacheEntry>>,
    max_entries: usize,
    stale_horizon: Duration,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub fn new(max_entries: usize, stale_horizon: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            max_entries: max_entries.max(1),
            stale_horizon,
            clock,
        }
    }

    /// Payload for `key` if it is within its own TTL.
    pub fn get_fresh(&self, key: &str) -> Option<CachedPayload> {
        self.lookup(key, |entry| entry.ttl)
    }

    /// Payload for `key` if it is within the stale horizon, regardless of TTL.
    pub fn get_stale(&self, key: &str) -> Option<CachedPayload> {
        let horizon = self.stale_horizon;
        self.lookup(key, |_| horizon)
    }

    /// Store `payload` under `key`, replacing any previous entry and resetting its age.
    pub fn set(&self, key: impl Into<String>, payload: CachedPayload, ttl: Duration) {
        let key = key.into();
        let entry = CacheEntry {
            payload,
            stored_at: self.clock.now(),
            ttl,
        };

        let mut entries = self.entries.lock().expect("response cache mutex poisoned");
        if entries.contains_key(&key) {
            // Replace and move to the most-recently-used end.
            entries.shift_remove(&key);
        } else {
            while entries.len() >= self.max_entries {
                if let Some((evicted, _)) = entries.shift_remove_index(0) {
                    tracing::debug!(key = %evicted, "Evicted least recently used cache entry");
                }
            }
        }
        entries.insert(key, entry);
        metrics::record_cache_size(entries.len());
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("response cache mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    pub fn stale_horizon(&self) -> Duration {
        self.stale_horizon
    }

    fn lookup<F>(&self, key: &str, window: F) -> Option<CachedPayload>
    where
        F: Fn(&CacheEntry) -> Duration,
    {
        let now = self.clock.now();
        let mut entries = self.entries.lock().expect("response cache mutex poisoned");
        let index = entries.get_index_of(key)?;
        let last = entries.len() - 1;
        entries.move_index(index, last);

        let (_, entry) = entries.get_index(last)?;
        if entry.age(now) <= window(entry) {
            Some(entry.payload.clone())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(60);

    fn cache(max: usize) -> (ResponseCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = ResponseCache::new(max, Duration::from_secs(3600), clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_fresh_within_ttl() {
        let (cache, clock) = cache(10);
        cache.set("k", CachedPayload::new(json!({"a": 1})), TTL);

        clock.advance(Duration::from_secs(60));
        assert_eq!(cache.get_fresh("k").unwrap().body, json!({"a": 1}));

        clock.advance(Duration::from_secs(1));
        assert!(cache.get_fresh("k").is_none());
    }

    #[test]
    fn test_stale_outlives_ttl() {
        let (cache, clock) = cache(10);
        cache.set("k", CachedPayload::new(json!(1)), TTL);

        clock.advance(Duration::from_secs(600));
        assert!(cache.get_fresh("k").is_none());
        assert_eq!(cache.get_stale("k").unwrap().body, json!(1));

        clock.advance(Duration::from_secs(3001));
        assert!(cache.get_stale("k").is_none());
        // Expired entries are not deleted on read.
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_set_replaces_and_resets_age() {
        let (cache, clock) = cache(10);
        cache.set("k", CachedPayload::new(json!("old")), TTL);
        clock.advance(Duration::from_secs(120));
        cache.set("k", CachedPayload::new(json!("new")), TTL);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_fresh("k").unwrap().body, json!("new"));
    }

    #[test]
    fn test_lru_eviction_respects_reads() {
        let (cache, _clock) = cache(2);
        cache.set("a", CachedPayload::new(json!("a")), TTL);
        cache.set("b", CachedPayload::new(json!("b")), TTL);

        // Touch "a" so "b" becomes least recently used.
        assert!(cache.get_fresh("a").is_some());
        cache.set("c", CachedPayload::new(json!("c")), TTL);

        assert_eq!(cache.len(), 2);
        assert!(cache.get_stale("a").is_some());
        assert!(cache.get_stale("b").is_none());
        assert!(cache.get_stale("c").is_some());
    }

    #[test]
    fn test_validators_round_trip() {
        let (cache, _clock) = cache(4);
        let payload = CachedPayload {
            body: json!({}),
            validators: Validators {
                etag: Some("\"v1\"".into()),
                last_modified: None,
            },
        };
        cache.set("k", payload.clone(), TTL);
        assert_eq!(cache.get_fresh("k"), Some(payload));
    }
}
