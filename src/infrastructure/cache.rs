use lru::LruCache;
use std::num::NonZeroUsize;

/// Versioned LRU cache. An entry is only replaced by a value carrying a newer version, so
/// post-images written back out of commit order cannot overwrite fresher data. A deleted key keeps
/// a tombstone at its last version so a read that raced the delete cannot bring it back.
pub struct Cache<K, V> {
    inner: LruCache<K, (u64, Option<V>)>,
}

impl<K: std::hash::Hash + Eq, V: Clone> Cache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Cache {
            inner: LruCache::new(capacity),
        }
    }

    /// Tombstones read as misses.
    pub fn get(&mut self, key: &K) -> Option<V> {
        self.inner.get(key).and_then(|(_, value)| value.clone())
    }

    pub fn insert(&mut self, key: K, version: u64, value: V) {
        match self.inner.get(&key) {
            Some((cached, _)) if *cached >= version => {}
            _ => {
                self.inner.put(key, (version, Some(value)));
            }
        }
    }

    /// Store `value` regardless of what is cached, for a freshly created document.
    pub fn replace(&mut self, key: K, version: u64, value: V) {
        self.inner.put(key, (version, Some(value)));
    }

    /// Drop the value and block writes of any version up to `version`.
    pub fn invalidate(&mut self, key: K, version: u64) {
        match self.inner.get(&key) {
            Some((cached, _)) if *cached > version => {}
            _ => {
                self.inner.put(key, (version, None));
            }
        }
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_older_version_does_not_replace_newer() {
        let mut cache = Cache::new(4);
        cache.insert("a", 2, "fresh");
        cache.insert("a", 1, "stale");
        assert_eq!(cache.get(&"a"), Some("fresh"));

        cache.insert("a", 3, "newer");
        assert_eq!(cache.get(&"a"), Some("newer"));
    }

    #[test]
    fn test_eviction_and_zero_capacity() {
        let mut cache = Cache::new(0);
        cache.insert(1, 1, "one");
        cache.insert(2, 1, "two");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some("two"));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_tombstone_blocks_stale_write_back() {
        let mut cache = Cache::new(4);
        cache.insert("a", 3, "live");
        cache.invalidate("a", 3);
        assert_eq!(cache.get(&"a"), None);

        cache.insert("a", 3, "deleted");
        cache.insert("a", 2, "older");
        assert_eq!(cache.get(&"a"), None);

        cache.replace("a", 1, "recreated");
        assert_eq!(cache.get(&"a"), Some("recreated"));
    }
}
