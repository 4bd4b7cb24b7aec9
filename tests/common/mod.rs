//! Instrumented fakes shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tierset::{
    application::{
        repos::{Projection, RepoError, SettingsRepo},
        settings::SettingsStore,
    },
    cache::{CacheConfig, CachedValue, SharedCache, SharedCacheError},
    domain::entities::{NewSetting, SettingRecord},
    infra::{memory::MemoryRepositories, shared::LocalSharedCache},
};

/// In-process backing store that counts calls and can be switched into failure.
pub struct CountingRepo {
    pub inner: MemoryRepositories,
    calls: AtomicUsize,
    failing: AtomicBool,
    ready: AtomicBool,
    broken_keys: Mutex<HashSet<String>>,
    find_delay_ms: AtomicU64,
}

impl CountingRepo {
    pub fn new(identity: &str) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryRepositories::new(identity),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            ready: AtomicBool::new(true),
            broken_keys: Mutex::new(HashSet::new()),
            find_delay_ms: AtomicU64::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Holds every `find` result for `delay` before returning it, so writes can land
    /// while a read is in flight.
    pub fn set_find_delay(&self, delay: Duration) {
        self.find_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Makes lookups of `key` fail while every other call keeps working.
    pub fn break_key(&self, key: &str) {
        self.broken_keys
            .lock()
            .expect("broken keys lock")
            .insert(key.to_string());
    }

    fn enter(&self) -> Result<(), RepoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("connection reset".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsRepo for CountingRepo {
    fn identity(&self) -> &str {
        self.inner.identity()
    }

    async fn find(&self, key: &str) -> Result<Option<SettingRecord>, RepoError> {
        self.enter()?;
        if self.broken_keys.lock().expect("broken keys lock").contains(key) {
            return Err(RepoError::Timeout);
        }
        let found = self.inner.find(key).await;
        let delay = self.find_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        found
    }

    async fn upsert(&self, entry: &NewSetting) -> Result<SettingRecord, RepoError> {
        self.enter()?;
        self.inner.upsert(entry).await
    }

    async fn delete(&self, key: &str) -> Result<bool, RepoError> {
        self.enter()?;
        self.inner.delete(key).await
    }

    async fn bulk_upsert(&self, entries: &[NewSetting]) -> Result<Vec<SettingRecord>, RepoError> {
        self.enter()?;
        self.inner.bulk_upsert(entries).await
    }

    async fn list_all(&self, projection: Projection) -> Result<Vec<SettingRecord>, RepoError> {
        self.enter()?;
        self.inner.list_all(projection).await
    }

    async fn search(&self, pattern: &str) -> Result<Vec<SettingRecord>, RepoError> {
        self.enter()?;
        self.inner.search(pattern).await
    }

    async fn is_ready(&self) -> Result<bool, RepoError> {
        self.enter()?;
        Ok(self.ready.load(Ordering::SeqCst))
    }
}

/// Shared tier that counts calls and can be switched into failure.
#[derive(Default)]
pub struct CountingShared {
    pub inner: LocalSharedCache,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl CountingShared {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn enter(&self) -> Result<(), SharedCacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SharedCacheError::unavailable("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl SharedCache for CountingShared {
    fn backend(&self) -> &'static str {
        "counting"
    }

    async fn get(&self, key: &str) -> Result<Option<CachedValue>, SharedCacheError> {
        self.enter()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &CachedValue) -> Result<(), SharedCacheError> {
        self.enter()?;
        self.inner.set(key, value).await
    }

    async fn has(&self, key: &str) -> Result<bool, SharedCacheError> {
        self.enter()?;
        self.inner.has(key).await
    }

    async fn forget(&self, key: &str) -> Result<(), SharedCacheError> {
        self.enter()?;
        self.inner.forget(key).await
    }
}

pub fn store_over(repo: &Arc<CountingRepo>, shared: &Arc<CountingShared>) -> SettingsStore {
    SettingsStore::new(repo.clone(), shared.clone(), CacheConfig::default())
        .expect("store should build")
}
