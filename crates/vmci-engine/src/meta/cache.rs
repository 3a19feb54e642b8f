//! Weak per-pointer memoization of metadata wrappers

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Maps native metadata pointers to their live wrappers.
///
/// Entries hold `Weak` references, so the cache never keeps a wrapper alive.
/// A wrapper calls [`remove_dead`](Self::remove_dead) from its `Drop` to
/// evict its own entry.
pub struct MetaspaceCache<T> {
    entries: DashMap<u64, Weak<T>>,
    populate: Mutex<()>,
}

impl<T> MetaspaceCache<T> {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            populate: Mutex::new(()),
        }
    }

    /// Live wrapper for `pointer`, if any
    pub fn get(&self, pointer: u64) -> Option<Arc<T>> {
        self.entries.get(&pointer).and_then(|entry| entry.upgrade())
    }

    /// Live wrapper for `pointer`, creating it with `create` if absent.
    ///
    /// Creation is serialized so two threads racing on the same pointer get
    /// the same wrapper.
    pub fn get_or_try_insert_with<E>(
        &self,
        pointer: u64,
        create: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        if let Some(existing) = self.get(pointer) {
            return Ok(existing);
        }
        let _populating = self.populate.lock();
        if let Some(existing) = self.get(pointer) {
            return Ok(existing);
        }
        let created = Arc::new(create()?);
        self.entries.insert(pointer, Arc::downgrade(&created));
        Ok(created)
    }

    /// Evict the entry for `pointer` if its wrapper is gone
    pub fn remove_dead(&self, pointer: u64) {
        self.entries
            .remove_if(&pointer, |_, entry| entry.strong_count() == 0);
    }

    /// Number of entries, live or not yet evicted
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for MetaspaceCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
