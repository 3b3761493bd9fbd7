use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use thiserror::Error;

/// A pooled value plus the liveness flag observers use to notice its
/// replacement behind a long-lived handle.
pub struct Named<T> {
    destroyed: Cell<bool>,
    value: RefCell<T>,
}

impl<T> Named<T> {
    pub fn new(value: T) -> Rc<Named<T>> {
        Rc::new(Named {
            destroyed: Cell::new(false),
            value: RefCell::new(value),
        })
    }

    /// True once the pool dropped or replaced this entry.
    pub fn destroyed(&self) -> bool {
        self.destroyed.get()
    }

    fn mark_destroyed(&self) {
        self.destroyed.set(true);
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.value.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.value.borrow_mut()
    }
}

/// Name-keyed pool of shared objects. Lookups hand out weak references;
/// the ordered backing supports prefix scans.
pub struct NamedObjPool<T> {
    entries: RefCell<BTreeMap<String, Rc<Named<T>>>>,
}

impl<T> NamedObjPool<T> {
    pub fn new() -> Rc<NamedObjPool<T>> {
        Rc::new(NamedObjPool {
            entries: RefCell::new(BTreeMap::new()),
        })
    }

    /// Insert or replace; a replaced entry is flagged destroyed so that
    /// outside observers notice.
    pub fn assign(&self, name: &str, obj: Rc<Named<T>>) {
        let mut entries = self.entries.borrow_mut();
        if let Some(old) = entries.insert(name.to_string(), obj) {
            old.mark_destroyed();
            tracing::debug!(name, "pool entry replaced");
        }
    }

    /// Drop one entry, flagging it destroyed.
    pub fn remove(&self, name: &str) {
        if let Some(old) = self.entries.borrow_mut().remove(name) {
            old.mark_destroyed();
        }
    }

    /// Weak handle to the named entry, or `None` when absent.
    pub fn lookup(&self, name: &str) -> Option<Weak<Named<T>>> {
        self.entries.borrow().get(name).map(Rc::downgrade)
    }

    /// Ordered scan of every entry whose name starts with `prefix`.
    pub fn search(&self, prefix: &str) -> Vec<(String, Weak<Named<T>>)> {
        self.entries
            .borrow()
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, entry)| (name.clone(), Rc::downgrade(entry)))
            .collect()
    }

    /// Drop every entry the pool solely owns, flagging each destroyed.
    pub fn clear_unlocked(&self) {
        self.entries.borrow_mut().retain(|name, entry| {
            if Rc::strong_count(entry) <= 1 {
                entry.mark_destroyed();
                tracing::debug!(name = %name, "unlocked pool entry dropped");
                false
            } else {
                true
            }
        });
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("named object {0}: no target")]
    Absent(String),
}

/// A by-name reference into a pool.
///
/// The weak handle is cached and refreshed from the pool once it expires
/// or its target is flagged destroyed, so a long-lived reference follows
/// replacements transparently.
pub struct NamedRef<T> {
    pool: Rc<NamedObjPool<T>>,
    name: String,
    cached: RefCell<Weak<Named<T>>>,
}

impl<T> NamedRef<T> {
    pub fn new(pool: Rc<NamedObjPool<T>>, name: &str) -> NamedRef<T> {
        let cached = pool.lookup(name).unwrap_or_default();
        NamedRef {
            pool,
            name: name.to_string(),
            cached: RefCell::new(cached),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool(&self) -> &Rc<NamedObjPool<T>> {
        &self.pool
    }

    /// Create (or replace) the pooled object with the given value.
    pub fn create_with(&self, value: T) -> Rc<Named<T>> {
        let obj = Named::new(value);
        self.pool.assign(&self.name, Rc::clone(&obj));
        *self.cached.borrow_mut() = Rc::downgrade(&obj);
        obj
    }

    /// Create (or replace) the pooled object with a default value.
    pub fn create(&self) -> Rc<Named<T>>
    where
        T: Default,
    {
        self.create_with(T::default())
    }

    /// Resolve the current target, refreshing a stale handle.
    pub fn lock(&self) -> Option<Rc<Named<T>>> {
        let mut cached = self.cached.borrow_mut();
        if let Some(hit) = cached.upgrade() {
            if !hit.destroyed() {
                return Some(hit);
            }
        }
        match self.pool.lookup(&self.name) {
            Some(fresh) => {
                let hit = fresh.upgrade();
                *cached = fresh;
                hit.filter(|h| !h.destroyed())
            }
            None => {
                *cached = Weak::new();
                None
            }
        }
    }

    pub fn exists(&self) -> bool {
        self.lock().is_some()
    }

    /// Like `lock`, but absence is an error.
    pub fn get(&self) -> Result<Rc<Named<T>>, PoolError> {
        self.lock()
            .ok_or_else(|| PoolError::Absent(self.name.clone()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_assign_lookup_and_replace() {
        let pool: Rc<NamedObjPool<i32>> = NamedObjPool::new();
        pool.assign("one", Named::new(1));
        let handle = pool.lookup("one").unwrap().upgrade().unwrap();
        assert_eq!(*handle.borrow(), 1);
        assert!(!handle.destroyed());

        pool.assign("one", Named::new(11));
        assert!(handle.destroyed());
        let fresh = pool.lookup("one").unwrap().upgrade().unwrap();
        assert_eq!(*fresh.borrow(), 11);
    }

    #[test]
    fn test_named_ref_follows_replacement() {
        let pool: Rc<NamedObjPool<String>> = NamedObjPool::new();
        let reference = NamedRef::new(Rc::clone(&pool), "greeting");
        assert!(!reference.exists());
        assert!(matches!(reference.get(), Err(PoolError::Absent(_))));

        reference.create_with("hello".to_string());
        assert_eq!(*reference.get().unwrap().borrow(), "hello");

        // Replacement through the pool: the cached handle refreshes.
        pool.assign("greeting", Named::new("moin".to_string()));
        assert_eq!(*reference.get().unwrap().borrow(), "moin");

        pool.remove("greeting");
        assert!(!reference.exists());
    }

    #[test]
    fn test_two_refs_share_one_object() {
        let pool: Rc<NamedObjPool<Vec<i32>>> = NamedObjPool::new();
        let a = NamedRef::new(Rc::clone(&pool), "1");
        let b = NamedRef::new(Rc::clone(&pool), "1");
        a.create();
        a.get().unwrap().borrow_mut().push(7);
        assert_eq!(*b.get().unwrap().borrow(), vec![7]);
    }

    #[test]
    fn test_search_prefix_scan() {
        let pool: Rc<NamedObjPool<i32>> = NamedObjPool::new();
        pool.assign("car.1", Named::new(1));
        pool.assign("car.2", Named::new(2));
        pool.assign("truck.1", Named::new(3));
        let hits = pool.search("car.");
        let names: Vec<_> = hits.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["car.1", "car.2"]);
        assert!(pool.search("bike.").is_empty());
    }

    #[test]
    fn test_clear_unlocked() {
        let pool: Rc<NamedObjPool<i32>> = NamedObjPool::new();
        pool.assign("held", Named::new(1));
        pool.assign("loose", Named::new(2));
        let held = pool.lookup("held").unwrap().upgrade().unwrap();
        let loose_weak = pool.lookup("loose").unwrap();

        pool.clear_unlocked();
        assert_eq!(pool.len(), 1);
        assert!(!held.destroyed());
        assert!(loose_weak.upgrade().is_none());
    }
}
