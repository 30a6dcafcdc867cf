//! LRU cache with per-entry TTL

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Cache hit/miss/eviction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

struct CacheInner<K, V> {
    map: HashMap<K, Entry<V>>,
    /// Recency order; front is least recently used
    order: VecDeque<K>,
    stats: CacheStats,
}

/// Bounded cache: LRU eviction at capacity, expired entries count as misses
pub struct TtlCache<K, V> {
    capacity: usize,
    default_ttl: Option<Duration>,
    inner: Mutex<CacheInner<K, V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a cache holding at most `capacity` entries
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            default_ttl: None,
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Apply `ttl` to entries inserted without an explicit TTL
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Fetch a value; expired entries are removed and count as misses
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        match inner.map.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                let value = entry.value.clone();
                inner.stats.hits += 1;
                touch(&mut inner.order, key);
                Some(value)
            }
            Some(_) => {
                inner.map.remove(key);
                inner.order.retain(|k| k != key);
                inner.stats.misses += 1;
                None
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Insert with the default TTL (no expiry if none is set)
    pub fn set(&self, key: K, value: V) {
        self.insert(key, value, self.default_ttl);
    }

    /// Insert with an explicit TTL; existing entries update in place
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.insert(key, value, Some(ttl));
    }

    fn insert(&self, key: K, value: V, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if inner.map.contains_key(&key) {
            inner.map.insert(key.clone(), Entry { value, expires_at });
            touch(&mut inner.order, &key);
            return;
        }

        if inner.map.len() >= self.capacity {
            if let Some(lru) = inner.order.pop_front() {
                inner.map.remove(&lru);
                inner.stats.evictions += 1;
            }
        }

        inner.map.insert(key.clone(), Entry { value, expires_at });
        inner.order.push_back(key);
    }

    /// Remove a key; returns whether it was present
    pub fn remove(&self, key: &K) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let removed = inner.map.remove(key).is_some();
        if removed {
            inner.order.retain(|k| k != key);
        }
        removed
    }

    /// Sweep out every expired entry; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let expired: Vec<K> = inner
            .map
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.map.remove(key);
            inner.order.retain(|k| k != key);
        }
        expired.len()
    }

    /// Number of entries, including not-yet-purged expired ones
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.map.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counter snapshot
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.stats
    }
}

/// Move `key` to the most-recently-used end
fn touch<K: PartialEq>(order: &mut VecDeque<K>, key: &K) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        if let Some(entry) = order.remove(pos) {
            order.push_back(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get() {
        let cache = TtlCache::new(4);
        cache.set_with_ttl("k", 42, Duration::from_secs(60));
        assert_eq!(cache.get(&"k"), Some(42));
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = TtlCache::new(4);
        cache.set_with_ttl("k", 42, Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(cache.get(&"k"), None);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_update_in_place_keeps_len() {
        let cache = TtlCache::new(4);
        cache.set_with_ttl("k", 1, Duration::from_secs(60));
        cache.set_with_ttl("k", 2, Duration::from_secs(60));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"k"), Some(2));
    }

    #[test]
    fn test_eviction_removes_exactly_the_lru() {
        let cache = TtlCache::new(2);
        cache.set_with_ttl("a", 1, Duration::from_secs(60));
        cache.set_with_ttl("b", 2, Duration::from_secs(60));

        // Touch "a" so "b" becomes least recently used.
        assert_eq!(cache.get(&"a"), Some(1));

        cache.set_with_ttl("c", 3, Duration::from_secs(60));
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"c"), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_purge_expired() {
        let cache = TtlCache::new(8);
        cache.set_with_ttl("old", 1, Duration::from_millis(1));
        cache.set_with_ttl("fresh", 2, Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_default_ttl_applies() {
        let cache = TtlCache::new(4).with_default_ttl(Duration::from_millis(1));
        cache.set("k", 1);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.get(&"k"), None);
    }
}
