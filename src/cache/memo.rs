//! Process-local tier.

use std::collections::HashMap;
use std::sync::RwLock;

use super::entry::CachedValue;
use super::keys::{CacheKey, Namespace};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::memo";

#[derive(Debug, Default)]
struct Scope {
    values: HashMap<String, CachedValue>,
    /// Write generation per key. Survives `clear_namespace`.
    epochs: HashMap<String, u64>,
}

/// In-process map of resolved values, partitioned by namespace.
///
/// Every operation holds the lock for a single map access; callers must not hold a
/// guard across I/O, and the API never hands one out.
///
/// Each key also carries a write epoch. A reader captures it with [`MemoCache::epoch`]
/// before going to a slower tier and publishes with [`MemoCache::set_if_unchanged`],
/// which refuses the value if a write invalidated the key in between.
#[derive(Debug, Default)]
pub struct MemoCache {
    entries: RwLock<HashMap<Namespace, Scope>>,
}

impl MemoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        let entries = rw_read(&self.entries, SOURCE, "get");
        entries
            .get(key.namespace())
            .and_then(|scope| scope.values.get(key.raw()))
            .cloned()
    }

    pub fn forget(&self, key: &CacheKey) {
        let mut entries = rw_write(&self.entries, SOURCE, "forget");
        if let Some(scope) = entries.get_mut(key.namespace()) {
            scope.values.remove(key.raw());
        }
    }

    /// Current write epoch of `key`; `0` until the key is first invalidated.
    pub fn epoch(&self, key: &CacheKey) -> u64 {
        rw_read(&self.entries, SOURCE, "epoch")
            .get(key.namespace())
            .and_then(|scope| scope.epochs.get(key.raw()))
            .copied()
            .unwrap_or(0)
    }

    /// Drops the cached value and advances the write epoch. Called once a write has
    /// committed, before its value is published to any tier.
    pub fn invalidate(&self, key: &CacheKey) {
        let mut entries = rw_write(&self.entries, SOURCE, "invalidate");
        let scope = entries.entry(key.namespace().clone()).or_default();
        scope.values.remove(key.raw());
        *scope.epochs.entry(key.raw().to_string()).or_insert(0) += 1;
    }

    /// Stores a committed value and advances the write epoch again, so a reader that
    /// started between [`MemoCache::invalidate`] and this call cannot publish over it.
    pub fn publish(&self, key: &CacheKey, value: CachedValue) {
        let mut entries = rw_write(&self.entries, SOURCE, "publish");
        let scope = entries.entry(key.namespace().clone()).or_default();
        scope.values.insert(key.raw().to_string(), value);
        *scope.epochs.entry(key.raw().to_string()).or_insert(0) += 1;
    }

    /// Stores `value` only if no invalidation happened since `epoch` was read.
    pub fn set_if_unchanged(&self, key: &CacheKey, value: CachedValue, epoch: u64) -> bool {
        let mut entries = rw_write(&self.entries, SOURCE, "set_if_unchanged");
        let scope = entries.entry(key.namespace().clone()).or_default();
        if scope.epochs.get(key.raw()).copied().unwrap_or(0) != epoch {
            return false;
        }
        scope.values.insert(key.raw().to_string(), value);
        true
    }

    /// Evicts every entry of `namespace`. Other namespaces are untouched.
    pub fn clear_namespace(&self, namespace: &Namespace) {
        let mut entries = rw_write(&self.entries, SOURCE, "clear_namespace");
        if let Some(scope) = entries.get_mut(namespace) {
            scope.values.clear();
        }
    }

    pub fn len(&self, namespace: &Namespace) -> usize {
        rw_read(&self.entries, SOURCE, "len")
            .get(namespace)
            .map_or(0, |scope| scope.values.len())
    }

    pub fn is_empty(&self, namespace: &Namespace) -> bool {
        self.len(namespace) == 0
    }
}
