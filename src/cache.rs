//! Bounded LRU cache of derived key sets
//!
//! Key derivation is deterministic, so the cache only ever saves work: a hit
//! returns exactly what [`keys::derive`](crate::keys::derive) would have
//! produced. Derivation runs outside the lock; only map mutation is serialized.

use crate::keys::{self, DerivedKeySet};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Hit/miss counters for a [`KeyDerivationCache`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Entry {
    keys: Arc<DerivedKeySet>,
    last_used: u64,
}

struct Inner {
    entries: HashMap<Vec<u8>, Entry>,
    tick: u64,
    stats: CacheStats,
}

impl Inner {
    fn touch(&mut self, uid: &[u8]) -> Option<Arc<DerivedKeySet>> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(uid).map(|entry| {
            entry.last_used = tick;
            Arc::clone(&entry.keys)
        })
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(uid, _)| uid.clone());
        if let Some(uid) = oldest {
            self.entries.remove(&uid);
            self.stats.evictions += 1;
            trace!(uid = %hex::encode_upper(&uid), "evicted key set");
        }
    }
}

/// Thread-safe memo of [`keys::derive`] keyed by tag UID
pub struct KeyDerivationCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl KeyDerivationCache {
    /// Create a cache holding at most `capacity` key sets (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(capacity),
                tick: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    /// Return the key set for `uid`, deriving and storing it on a miss
    ///
    /// UIDs too short to derive from produce an empty set that is not cached.
    pub fn get_or_derive(&self, uid: &[u8]) -> Arc<DerivedKeySet> {
        {
            let mut inner = self.inner.lock();
            if let Some(hit) = inner.touch(uid) {
                inner.stats.hits += 1;
                return hit;
            }
            inner.stats.misses += 1;
        }

        let derived = keys::derive(uid);
        if derived.is_empty() {
            debug!(uid_len = uid.len(), "UID too short, key set not cached");
            return Arc::new(derived);
        }
        let derived = Arc::new(derived);

        let mut inner = self.inner.lock();
        // A concurrent caller may have stored the same UID while we derived.
        if let Some(existing) = inner.touch(uid) {
            return existing;
        }
        if inner.entries.len() >= self.capacity {
            inner.evict_lru();
        }
        let tick = inner.tick;
        inner.entries.insert(
            uid.to_vec(),
            Entry {
                keys: Arc::clone(&derived),
                last_used: tick,
            },
        );
        debug!(uid = %hex::encode_upper(uid), size = inner.entries.len(), "cached derived keys");
        derived
    }

    /// Whether `uid` is currently cached; does not affect recency
    pub fn contains(&self, uid: &[u8]) -> bool {
        self.inner.lock().entries.contains_key(uid)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }

    /// Drop every cached entry; statistics are kept
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }
}

impl Default for KeyDerivationCache {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CACHE_CAPACITY)
    }
}

impl std::fmt::Debug for KeyDerivationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyDerivationCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn uid(n: u8) -> [u8; 4] {
        [0x04, 0x10, 0x20, n]
    }

    #[test]
    fn test_hit_returns_same_value_as_derive() {
        let cache = KeyDerivationCache::new(4);
        let first = cache.get_or_derive(&uid(1));
        let second = cache.get_or_derive(&uid(1));
        assert_eq!(*first, keys::derive(&uid(1)));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                evictions: 0
            }
        );
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let cache = KeyDerivationCache::new(2);
        cache.get_or_derive(&uid(1));
        cache.get_or_derive(&uid(2));
        // refresh 1 so that 2 becomes the eviction candidate
        cache.get_or_derive(&uid(1));
        cache.get_or_derive(&uid(3));

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&uid(1)));
        assert!(!cache.contains(&uid(2)));
        assert!(cache.contains(&uid(3)));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_evicted_entry_is_recomputed_identically() {
        let cache = KeyDerivationCache::new(1);
        let before = cache.get_or_derive(&uid(1));
        cache.get_or_derive(&uid(2));
        let after = cache.get_or_derive(&uid(1));
        assert_eq!(*before, *after);
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_invalid_uid_not_cached() {
        let cache = KeyDerivationCache::new(2);
        assert!(cache.get_or_derive(&[1, 2]).is_empty());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = KeyDerivationCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.get_or_derive(&uid(9));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear() {
        let cache = KeyDerivationCache::new(4);
        cache.get_or_derive(&uid(1));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_access_is_consistent() {
        let cache = Arc::new(KeyDerivationCache::new(3));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..50u8 {
                        let id = uid((t + i) % 6);
                        let got = cache.get_or_derive(&id);
                        assert_eq!(*got, keys::derive(&id));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 3);
    }
}
