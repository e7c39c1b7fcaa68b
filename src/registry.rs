//! Identity-keyed set of every live entry

use crate::entry::PooledEntry;
use dashmap::DashMap;
use std::sync::Arc;

/// Identity of a pooled object: the address of its shared allocation
fn identity<T>(object: &Arc<T>) -> usize {
    Arc::as_ptr(object) as usize
}

pub(crate) struct Registry<T> {
    entries: DashMap<usize, Arc<PooledEntry<T>>>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn insert(&self, entry: Arc<PooledEntry<T>>) {
        self.entries.insert(identity(entry.shared()), entry);
    }

    pub fn lookup(&self, object: &Arc<T>) -> Option<Arc<PooledEntry<T>>> {
        self.entries
            .get(&identity(object))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Removes the entry if it is still registered. A no-op otherwise.
    pub fn remove(&self, entry: &PooledEntry<T>) -> bool {
        self.entries.remove(&identity(entry.shared())).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Point-in-time copy, so callers never hold shard locks while
    /// touching entry locks or the factory.
    pub fn snapshot(&self) -> Vec<Arc<PooledEntry<T>>> {
        self.entries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}
