use std::collections::BTreeMap;
use std::fmt::Debug;
use std::rc::Rc;

/// Keyed cache of shared values with least-recently-used eviction.
///
/// Two maps back the cache: key to entry (with its use sequence and byte
/// hint), and sequence to key. A touch reinserts the entry under a fresh
/// sequence; eviction removes the lowest one. Evicting only drops the
/// cache's reference, shared handles held by callers stay valid.
pub struct LruCache<T: ?Sized, K: Ord + Clone + Debug = String> {
    seq: u64,
    bytes: usize,
    entries: BTreeMap<K, Info<T>>,
    lru: BTreeMap<u64, K>,
}

struct Info<T: ?Sized> {
    ptr: Rc<T>,
    pos: u64,
    size: usize,
}

impl<T: ?Sized, K: Ord + Clone + Debug> Default for LruCache<T, K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized, K: Ord + Clone + Debug> LruCache<T, K> {
    pub fn new() -> Self {
        LruCache {
            seq: 0,
            bytes: 0,
            entries: BTreeMap::new(),
            lru: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total of the byte hints of all entries.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Insert or replace. Replacement touches the entry and keeps prior
    /// holders of the old value valid.
    pub fn insert(&mut self, key: K, ptr: Rc<T>, size: usize) {
        match self.entries.get_mut(&key) {
            None => {
                self.seq += 1;
                let pos = self.seq;
                self.lru.insert(pos, key.clone());
                self.entries.insert(key, Info { ptr, pos, size });
            }
            Some(info) => {
                info.ptr = ptr;
                let prev = info.pos;
                self.seq += 1;
                info.pos = self.seq;
                let k = match self.lru.remove(&prev) {
                    Some(k) => k,
                    None => panic!("cache is inconsistent"),
                };
                self.lru.insert(info.pos, k);
                self.bytes = self.bytes.saturating_sub(info.size);
                info.size = size;
            }
        }
        self.bytes += size;
    }

    /// Membership test; not counted as a use.
    pub fn exists(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Fetch and touch.
    pub fn lookup(&mut self, key: &K) -> Option<Rc<T>> {
        let info = self.entries.get_mut(key)?;
        let prev = info.pos;
        self.seq += 1;
        info.pos = self.seq;
        let k = match self.lru.remove(&prev) {
            Some(k) => k,
            None => panic!("cache is inconsistent"),
        };
        self.lru.insert(info.pos, k);
        Some(Rc::clone(&info.ptr))
    }

    /// Drop one entry; absent keys are ignored.
    pub fn erase(&mut self, key: &K) {
        if let Some(info) = self.entries.remove(key) {
            self.bytes = self.bytes.saturating_sub(info.size);
            self.lru.remove(&info.pos);
        }
    }

    fn evict_one(&mut self) -> bool {
        let pos = match self.lru.keys().next() {
            Some(pos) => *pos,
            None => return false,
        };
        let key = match self.lru.remove(&pos) {
            Some(key) => key,
            None => return false,
        };
        if let Some(info) = self.entries.remove(&key) {
            self.bytes = self.bytes.saturating_sub(info.size);
            tracing::debug!(key = ?key, "evicted least recently used entry");
        }
        true
    }

    /// Evict oldest-touched entries until at most `n` remain; returns the
    /// resulting count.
    pub fn reduce_count(&mut self, n: usize) -> usize {
        while self.lru.len() > n {
            if !self.evict_one() {
                break;
            }
        }
        self.lru.len()
    }

    /// Evict oldest-touched entries until the byte total drops to `n`;
    /// returns the resulting total.
    pub fn reduce_bytes(&mut self, n: usize) -> usize {
        while self.bytes > n {
            if !self.evict_one() {
                break;
            }
        }
        self.bytes
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lru_eviction_order() {
        let mut cache: LruCache<str> = LruCache::new();
        cache.insert("one".to_string(), Rc::from("1"), 0);
        cache.insert("two".to_string(), Rc::from("2"), 0);
        cache.insert("three".to_string(), Rc::from("3"), 0);

        // Touch the oldest entry, making "two" the eviction candidate.
        assert!(cache.lookup(&"one".to_string()).is_some());
        assert_eq!(cache.reduce_count(2), 2);
        assert!(cache.exists(&"one".to_string()));
        assert!(!cache.exists(&"two".to_string()));
        assert!(cache.exists(&"three".to_string()));
    }

    #[test]
    fn test_exists_is_not_a_touch() {
        let mut cache: LruCache<str> = LruCache::new();
        cache.insert("a".to_string(), Rc::from("1"), 0);
        cache.insert("b".to_string(), Rc::from("2"), 0);
        assert!(cache.exists(&"a".to_string()));
        assert_eq!(cache.reduce_count(1), 1);
        // "a" was inserted first and never touched, so it goes.
        assert!(!cache.exists(&"a".to_string()));
        assert!(cache.exists(&"b".to_string()));
    }

    #[test]
    fn test_replacement_keeps_prior_holders() {
        let mut cache: LruCache<str> = LruCache::new();
        cache.insert("a".to_string(), Rc::from("old"), 0);
        let held = cache.lookup(&"a".to_string()).unwrap();
        cache.insert("a".to_string(), Rc::from("new"), 0);
        assert_eq!(&*held, "old");
        assert_eq!(&*cache.lookup(&"a".to_string()).unwrap(), "new");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_reduce_bytes() {
        let mut cache: LruCache<str> = LruCache::new();
        cache.insert("a".to_string(), Rc::from("1"), 100);
        cache.insert("b".to_string(), Rc::from("2"), 50);
        assert_eq!(cache.bytes(), 150);
        assert_eq!(cache.reduce_bytes(60), 50);
        assert!(!cache.exists(&"a".to_string()));
        assert_eq!(cache.reduce_bytes(0), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_erase() {
        let mut cache: LruCache<str> = LruCache::new();
        cache.insert("a".to_string(), Rc::from("1"), 10);
        cache.erase(&"a".to_string());
        cache.erase(&"missing".to_string());
        assert!(cache.is_empty());
        assert_eq!(cache.bytes(), 0);
    }
}
