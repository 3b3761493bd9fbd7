use std::rc::Rc;

use record::Record;

use crate::LruCache;

/// Cache of immutable record snapshots keyed by canonical identifier
/// (`escape(type):escape(key1):…`), evicted least-recently-used.
///
/// Records must declare at least one key element; save and load derive
/// the identifier from the key projection.
pub struct ObjCache {
    cache: LruCache<Record>,
}

impl Default for ObjCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjCache {
    pub fn new() -> ObjCache {
        ObjCache {
            cache: LruCache::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Deep-copy `rec` into a snapshot stored under its identifier,
    /// replacing any current entry.
    pub fn save(&mut self, rec: &Record) -> Result<(), record::Error> {
        let key = rec.identifier()?;
        let size = rec.size_hint();
        self.cache.insert(key, Rc::new(rec.clone()), size);
        Ok(())
    }

    /// Store the caller's snapshot by move. Holders of a previously
    /// stored snapshot under the same identifier stay valid.
    pub fn save_shared(&mut self, rec: Rc<Record>) -> Result<Rc<Record>, record::Error> {
        let key = rec.identifier()?;
        let size = rec.size_hint();
        self.cache.insert(key, Rc::clone(&rec), size);
        Ok(rec)
    }

    /// Copy the snapshot matching `rec`'s key over `rec`. Touches the
    /// entry; returns false on a miss.
    pub fn load(&mut self, rec: &mut Record) -> Result<bool, record::Error> {
        let key = rec.identifier()?;
        let snapshot = match self.cache.lookup(&key) {
            Some(s) => s,
            None => return Ok(false),
        };
        rec.do_copy(&snapshot)?;
        Ok(true)
    }

    /// Key-only membership test; not counted as a use.
    pub fn exists(&self, rec: &Record) -> Result<bool, record::Error> {
        Ok(self.cache.exists(&rec.identifier()?))
    }

    /// Direct lookup by full identifier; touches on a hit. No type check
    /// happens here, callers match on the snapshot's type name.
    pub fn search(&mut self, identifier: &str) -> Option<Rc<Record>> {
        self.cache.lookup(&identifier.to_string())
    }

    /// Evict down to `n` entries; returns the resulting count.
    pub fn reduce_count(&mut self, n: usize) -> usize {
        self.cache.reduce_count(n)
    }

    /// Evict down to `n` hinted bytes; returns the resulting total.
    pub fn reduce_bytes(&mut self, n: usize) -> usize {
        self.cache.reduce_bytes(n)
    }

    /// Escape a raw key piece for use inside an identifier.
    pub fn escape_key(key: &str) -> String {
        Record::escape_key(key)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use record::{Kind, SchemaFlag};

    fn person(nr: i64, name: &str, first: &str) -> Record {
        let mut p = Record::build("Person")
            .leaf("number", Kind::Int, &[SchemaFlag::key(1)])
            .leaf("name", Kind::Str, &[])
            .leaf("first", Kind::Str, &[])
            .finish();
        p.set_str("number", &nr.to_string()).unwrap();
        p.set_str("name", name).unwrap();
        p.set_str("first", first).unwrap();
        p
    }

    fn car(plate: &str, maker: &str, model: &str) -> Record {
        let mut c = Record::build("Car")
            .leaf("plate", Kind::Str, &[SchemaFlag::key(1)])
            .leaf("maker", Kind::Str, &[])
            .leaf("model", Kind::Str, &[])
            .finish();
        c.set_str("plate", plate).unwrap();
        c.set_str("maker", maker).unwrap();
        c.set_str("model", model).unwrap();
        c
    }

    #[test]
    fn test_save_load_exists() {
        let mut cache = ObjCache::new();
        cache.save(&person(333, "Müller", "Peter")).unwrap();
        cache.save(&person(444, "Huber", "Anneliese")).unwrap();
        cache.save(&car("X-12345", "VW", "Käfer")).unwrap();

        let mut probe = person(222, "", "");
        assert!(!cache.exists(&probe).unwrap());
        probe.set_str("number", "333").unwrap();
        assert!(cache.exists(&probe).unwrap());
        assert!(cache.load(&mut probe).unwrap());
        assert_eq!(probe.get_str("first", false), Some("Peter".into()));

        probe.set_str("number", "444").unwrap();
        assert!(cache.load(&mut probe).unwrap());
        assert_eq!(probe.get_str("first", false), Some("Anneliese".into()));

        let mut wheels = car("X-12345", "", "");
        assert!(cache.load(&mut wheels).unwrap());
        assert_eq!(wheels.get_str("model", false), Some("Käfer".into()));

        assert_eq!(cache.reduce_count(usize::MAX), 3);
    }

    #[test]
    fn test_search_and_shared_save() {
        let mut cache = ObjCache::new();
        cache.save(&car("X-12345", "VW", "Käfer")).unwrap();

        let shared = cache
            .save_shared(Rc::new(car("A-345", "Ford", "Model T")))
            .unwrap();
        assert_eq!(shared.get_str("maker", false), Some("Ford".into()));

        let found = cache.search("Car:A-345").expect("identifier must hit");
        assert_eq!(found.type_name(), "Car");
        assert_eq!(found.get_str("maker", false), Some("Ford".into()));

        let escaped = format!("Car:{}", ObjCache::escape_key("X-12345"));
        assert!(cache.search(&escaped).is_some());
        assert!(cache.search("Car:nope").is_none());
    }

    #[test]
    fn test_lru_discipline() {
        let mut cache = ObjCache::new();
        cache.save(&person(1, "a", "a")).unwrap();
        cache.save(&person(2, "b", "b")).unwrap();
        cache.save(&person(3, "c", "c")).unwrap();

        // Touch person 1, leaving person 2 the oldest.
        let mut probe = person(1, "", "");
        assert!(cache.load(&mut probe).unwrap());
        assert_eq!(cache.reduce_count(2), 2);
        assert!(cache.exists(&person(1, "", "")).unwrap());
        assert!(!cache.exists(&person(2, "", "")).unwrap());
        assert!(cache.exists(&person(3, "", "")).unwrap());

        assert_eq!(cache.reduce_count(0), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_snapshot_survives_replacement() {
        let mut cache = ObjCache::new();
        let first = cache
            .save_shared(Rc::new(car("K-1", "Opel", "Rekord")))
            .unwrap();
        cache.save(&car("K-1", "Opel", "Kadett")).unwrap();
        // The old snapshot is untouched, the cache serves the new one.
        assert_eq!(first.get_str("model", false), Some("Rekord".into()));
        let current = cache.search("Car:K-1").unwrap();
        assert_eq!(current.get_str("model", false), Some("Kadett".into()));
    }

    #[test]
    fn test_load_type_mismatch() {
        let mut cache = ObjCache::new();
        cache.save(&car("X", "VW", "Golf")).unwrap();
        // Same identifier shape, different type name: the lookup misses
        // because the type name is part of the identifier.
        let mut probe = Record::build("Truck")
            .leaf("plate", Kind::Str, &[SchemaFlag::key(1)])
            .finish();
        probe.set_str("plate", "X").unwrap();
        assert!(!cache.load(&mut probe).unwrap());
    }

    #[test]
    fn test_keyless_record_is_an_error() {
        let mut cache = ObjCache::new();
        let plain = Record::build("Plain").leaf("a", Kind::Int, &[]).finish();
        assert!(cache.save(&plain).is_err());
    }
}
