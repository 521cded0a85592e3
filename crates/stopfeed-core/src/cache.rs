//! Bounded caches holding the publish baselines.
//!
//! Two independent instances back the pipeline, one for predictions and one
//! for events. Capacity is enforced synchronously inside `put`; eviction
//! follows least-recently-updated order, so `put` and `refresh_seen` promote
//! an entry while `get` is a pure lookup.

use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// A cached record plus the poll cycle it was last seen in.
///
/// The cycle stamp is what the staleness sweep looks at; entries that stop
/// showing up in polls age out even when the cache never fills.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<R> {
    /// The comparison baseline
    pub record: R,
    /// Poll cycle of the last observation
    pub last_seen_cycle: u64,
}

/// Fixed-capacity cache keyed by record identity.
#[derive(Debug)]
pub struct BoundedCache<K: Hash + Eq, R> {
    inner: LruCache<K, CacheEntry<R>>,
}

impl<K: Hash + Eq + Clone, R> BoundedCache<K, R> {
    /// Create an empty cache with the given capacity.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: LruCache::new(capacity),
        }
    }

    /// Look up an entry without touching its recency.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&CacheEntry<R>> {
        self.inner.peek(key)
    }

    /// Insert or overwrite an entry.
    ///
    /// When the cache is at capacity and the key is new, exactly one
    /// least-recently-updated entry is evicted and its key returned so the
    /// caller can signal the removal downstream.
    pub fn put(&mut self, key: K, record: R, cycle: u64) -> Option<K> {
        let entry = CacheEntry {
            record,
            last_seen_cycle: cycle,
        };
        match self.inner.push(key.clone(), entry) {
            Some((displaced, _)) if displaced != key => Some(displaced),
            _ => None,
        }
    }

    /// Bump the last-seen stamp without replacing the baseline record.
    ///
    /// Returns false if the key is not cached.
    pub fn refresh_seen(&mut self, key: &K, cycle: u64) -> bool {
        match self.inner.get_mut(key) {
            Some(entry) => {
                entry.last_seen_cycle = cycle;
                true
            }
            None => false,
        }
    }

    /// Drop entries not observed for more than `max_age` cycles.
    ///
    /// Returns the removed keys.
    pub fn remove_stale(&mut self, current_cycle: u64, max_age: u64) -> Vec<K> {
        let stale: Vec<K> = self
            .inner
            .iter()
            .filter(|(_, entry)| current_cycle.saturating_sub(entry.last_seen_cycle) > max_age)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            self.inner.pop(key);
        }
        stale
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize) -> BoundedCache<&'static str, u32> {
        BoundedCache::new(NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let mut cache = cache(2);

        cache.put("a", 1, 1);
        cache.put("b", 2, 1);
        cache.put("c", 3, 1);
        cache.put("d", 4, 1);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.capacity(), 2);
    }

    #[test]
    fn put_evicts_least_recently_updated() {
        let mut cache = cache(2);

        cache.put("a", 1, 1);
        cache.put("b", 2, 1);

        let evicted = cache.put("c", 3, 1);
        assert_eq!(evicted, Some("a"));
        assert!(cache.get(&"a").is_none());
        assert!(cache.get(&"b").is_some());
        assert!(cache.get(&"c").is_some());
    }

    #[test]
    fn overwriting_a_key_is_not_an_eviction() {
        let mut cache = cache(2);

        cache.put("a", 1, 1);
        cache.put("b", 2, 1);

        assert_eq!(cache.put("a", 10, 2), None);
        assert_eq!(cache.get(&"a").unwrap().record, 10);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn get_does_not_promote() {
        let mut cache = cache(2);

        cache.put("a", 1, 1);
        cache.put("b", 2, 1);
        let _ = cache.get(&"a");

        // "a" stays least recently updated despite the lookup.
        assert_eq!(cache.put("c", 3, 1), Some("a"));
    }

    #[test]
    fn refresh_promotes_and_keeps_record() {
        let mut cache = cache(2);

        cache.put("a", 1, 1);
        cache.put("b", 2, 1);
        assert!(cache.refresh_seen(&"a", 5));

        assert_eq!(cache.put("c", 3, 5), Some("b"));
        let entry = cache.get(&"a").unwrap();
        assert_eq!(entry.record, 1);
        assert_eq!(entry.last_seen_cycle, 5);
    }

    #[test]
    fn refresh_of_unknown_key_reports_miss() {
        let mut cache = cache(2);
        assert!(!cache.refresh_seen(&"a", 1));
    }

    #[test]
    fn stale_entries_are_swept() {
        let mut cache = cache(10);

        cache.put("old", 1, 1);
        cache.put("kept", 2, 4);

        let removed = cache.remove_stale(5, 3);
        assert_eq!(removed, vec!["old"]);
        assert!(cache.get(&"old").is_none());
        assert!(cache.get(&"kept").is_some());
    }

    #[test]
    fn entry_seen_this_cycle_is_never_stale() {
        let mut cache = cache(10);

        cache.put("fresh", 1, 7);
        assert!(cache.remove_stale(7, 0).is_empty());
    }
}
