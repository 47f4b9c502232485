//! Bounded in-memory cache with per-entry TTL and LRU eviction.
//!
//! The cache is a plain value owned by whoever constructs it (the
//! [`IssueFetcher`](crate::github::IssueFetcher) in practice). It does no
//! locking of its own; callers that share it wrap it in a mutex.
//!
//! Time comes from `tokio::time::Instant`, so tests can pause and advance
//! the clock instead of sleeping.

use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;

/// Default capacity: enough for every recent filter combination in a session.
pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Key/value store bounded by entry count, with expiry per entry.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: LruCache<String, Entry<V>>,
    default_ttl: Duration,
    allow_stale: bool,
}

impl<V: Clone> TtlCache<V> {
    /// A zero `capacity` is treated as one.
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            default_ttl,
            allow_stale: false,
        }
    }

    /// Serve an expired value once (then drop it) instead of missing.
    pub fn with_allow_stale(mut self, allow_stale: bool) -> Self {
        self.allow_stale = allow_stale;
        self
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up `key`. Expired entries are removed; in allow-stale mode the
    /// expired value is still returned for that one lookup.
    ///
    /// A hit refreshes LRU recency but never extends the entry's TTL.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.expires_at > Instant::now() {
            return Some(entry.value.clone());
        }

        let entry = self.entries.pop(key)?;
        self.allow_stale.then_some(entry.value)
    }

    /// Insert with the default TTL.
    pub fn set(&mut self, key: impl Into<String>, value: V) {
        let ttl = self.default_ttl;
        self.set_with_ttl(key, value, ttl);
    }

    /// Insert with an explicit TTL, evicting the least recently used entry
    /// when a new key would exceed capacity.
    pub fn set_with_ttl(&mut self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let replacing = self.entries.contains(&key);
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };

        if let Some((evicted, _)) = self.entries.push(key, entry)
            && !replacing
        {
            tracing::debug!(key = %evicted, "evicting least recently used cache entry");
        }
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.pop(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
