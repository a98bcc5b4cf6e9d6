//! Bounded render result cache
//!
//! Exact least-recently-used eviction over task fingerprints. Reads promote
//! an entry; inserting into a full cache evicts the entry that was used
//! longest ago. Entries never expire on their own.

use crate::fingerprint::Fingerprint;
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default number of cached artifacts
pub const DEFAULT_CACHE_CAPACITY: usize = 24;

/// A cached render artifact
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Key the artifact was stored under
    pub fingerprint: Fingerprint,
    /// The artifact
    pub artifact: Arc<Value>,
    /// Insertion time
    pub enqueued_at: DateTime<Utc>,
}

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries in cache
    pub entry_count: usize,
    /// Maximum number of entries
    pub capacity: usize,
    /// Lookups that found an entry
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Entries dropped to make room
    pub evictions: u64,
}

/// LRU cache of render artifacts keyed by task fingerprint
///
/// A capacity of zero disables caching.
#[derive(Debug)]
pub struct RenderCache {
    capacity: usize,
    inner: Mutex<LruCache<Fingerprint, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl RenderCache {
    /// Create cache holding at most `capacity` artifacts
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let bound = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            capacity,
            inner: Mutex::new(LruCache::new(bound)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up an artifact, marking it most recently used
    #[must_use]
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        let found = self.inner.lock().get(fingerprint).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Insert or replace an artifact, evicting the least recently used entry
    /// when full
    pub fn put(&self, fingerprint: Fingerprint, artifact: Arc<Value>) {
        if self.capacity == 0 {
            return;
        }
        let entry = CacheEntry {
            fingerprint,
            artifact,
            enqueued_at: Utc::now(),
        };
        let displaced = self.inner.lock().push(fingerprint, entry);
        if let Some((evicted, _)) = displaced {
            if evicted != fingerprint {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(fingerprint = %evicted.short(), "evicted render artifact");
            }
        }
    }

    /// True if an artifact is cached, without promoting it
    #[must_use]
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.inner.lock().contains(fingerprint)
    }

    /// Number of cached artifacts
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True when nothing is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached artifacts
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Get cache statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskDescriptor;
    use serde_json::json;

    fn key(n: u64) -> Fingerprint {
        Fingerprint::of(&TaskDescriptor::new("code", json!({ "n": n })))
    }

    fn artifact(n: u64) -> Arc<Value> {
        Arc::new(json!({ "html": n }))
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = RenderCache::new(2);
        cache.put(key(1), artifact(1));
        cache.put(key(2), artifact(2));

        // Touch 1 so 2 becomes the eviction candidate
        assert!(cache.get(&key(1)).is_some());
        cache.put(key(3), artifact(3));

        assert!(cache.contains(&key(1)));
        assert!(!cache.contains(&key(2)));
        assert!(cache.contains(&key(3)));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn contains_does_not_promote() {
        let cache = RenderCache::new(2);
        cache.put(key(1), artifact(1));
        cache.put(key(2), artifact(2));
        assert!(cache.contains(&key(1)));
        cache.put(key(3), artifact(3));
        assert!(!cache.contains(&key(1)));
    }

    #[test]
    fn replace_keeps_size() {
        let cache = RenderCache::new(2);
        cache.put(key(1), artifact(1));
        cache.put(key(1), artifact(10));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key(1)).unwrap().artifact, artifact(10));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn never_exceeds_capacity() {
        let cache = RenderCache::new(DEFAULT_CACHE_CAPACITY);
        for n in 0..100 {
            cache.put(key(n), artifact(n));
            assert!(cache.len() <= DEFAULT_CACHE_CAPACITY);
        }
        assert_eq!(cache.len(), DEFAULT_CACHE_CAPACITY);
        assert!(cache.contains(&key(99)));
        assert!(!cache.contains(&key(0)));
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let cache = RenderCache::new(0);
        cache.put(key(1), artifact(1));
        assert!(cache.is_empty());
    }

    #[test]
    fn hit_and_miss_counters() {
        let cache = RenderCache::default();
        cache.put(key(1), artifact(1));
        let _ = cache.get(&key(1));
        let _ = cache.get(&key(2));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        cache.clear();
        assert!(cache.is_empty());
    }
}
