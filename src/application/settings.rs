//! Coherent read-through / write-through access to one settings table.
//!
//! Reads try the memo tier, then the shared tier, then the backing store, populating
//! every tier they missed. Writes commit to the backing store first and only then
//! overwrite both cache tiers, so a failed write never leaves a cached value behind.
//!
//! Every write advances the key's epoch in the memo tier. A read that went to the
//! backing store only publishes its result if the epoch is unchanged afterwards;
//! otherwise it forgets what it wrote to the shared tier and returns uncached.
//!
//! Known limitations:
//! - There is no per-key write lock. Two concurrent `set` calls on one key commit in
//!   some order, and the cache write-through may land in the other order. The next
//!   `clear_memory_cache` plus a shared-tier refresh reconciles them.
//! - A memo tier in another process is not invalidated by writes made here. It stays
//!   stale until that process calls `clear_memory_cache` or restarts.
//! - Epochs are per memo tier. A read in one process racing a write in another can
//!   still leave the older value in the shared tier until the next write or
//!   `forget_cached` for that key.

use std::{future::Future, sync::Arc};

use metrics::counter;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::{
    application::{
        error::StoreError,
        repos::{Projection, RepoError, SettingsRepo},
        report::{ErrorReporter, Incident, Tier, TracingReporter},
    },
    cache::{CacheConfig, CacheKey, CachedValue, MemoCache, Namespace, SharedCache, SharedCacheError},
    domain::entities::{NewSetting, SettingRecord},
};

const METRIC_MEMO_HIT: &str = "tierset_memo_hit_total";
const METRIC_MEMO_MISS: &str = "tierset_memo_miss_total";
const METRIC_SHARED_HIT: &str = "tierset_shared_hit_total";
const METRIC_SHARED_MISS: &str = "tierset_shared_miss_total";
const METRIC_BACKING_LOAD: &str = "tierset_backing_load_total";

#[derive(Clone)]
pub struct SettingsStore {
    repo: Arc<dyn SettingsRepo>,
    shared: Arc<dyn SharedCache>,
    memo: Arc<MemoCache>,
    reporter: Arc<dyn ErrorReporter>,
    namespace: Namespace,
    config: CacheConfig,
}

impl SettingsStore {
    /// Binds a backing store and a shared tier under the namespace derived from
    /// `config.prefix` and the store identity.
    ///
    /// Fails with [`StoreError::Configuration`] when the namespace cannot be derived.
    pub fn new(
        repo: Arc<dyn SettingsRepo>,
        shared: Arc<dyn SharedCache>,
        config: CacheConfig,
    ) -> Result<Self, StoreError> {
        let namespace = Namespace::derive(&config.prefix, repo.identity())?;
        Ok(Self {
            repo,
            shared,
            memo: Arc::new(MemoCache::new()),
            reporter: Arc::new(TracingReporter),
            namespace,
            config,
        })
    }

    /// Shares a memo tier with other stores. Entries stay partitioned by namespace.
    pub fn with_memo(mut self, memo: Arc<MemoCache>) -> Self {
        self.memo = memo;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn cache_key(&self, key: &str) -> CacheKey {
        self.namespace.key(key)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Value stored under `key`, or `None` when there is no row, the row holds `null`,
    /// or the backing store failed. Failures go to the reporter.
    pub async fn get(&self, key: &str) -> Option<Value> {
        match self.resolve_with("get", key).await {
            Ok(resolved) => resolved.into_value(),
            Err(err) => {
                self.report("get", key, Some(Tier::Backing), &err);
                None
            }
        }
    }

    pub async fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).await.unwrap_or(default)
    }

    /// Decodes the stored value into `T`. A value of the wrong shape is reported and
    /// reads as `None`.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                let err = StoreError::Decode {
                    key: key.to_string(),
                    message: err.to_string(),
                };
                self.report("get_as", key, None, &err);
                None
            }
        }
    }

    /// `true` when a row exists for `key`, including one whose value is `null`.
    ///
    /// A cached answer from either tier short-circuits; a backing-store failure is
    /// reported and reads as `false`.
    pub async fn has(&self, key: &str) -> bool {
        match self.resolve_with("has", key).await {
            Ok(resolved) => resolved.is_present(),
            Err(err) => {
                self.report("has", key, Some(Tier::Backing), &err);
                false
            }
        }
    }

    /// Read-through lookup with the backing-store error surfaced.
    ///
    /// Shared-tier failures are still absorbed and treated as a miss.
    pub async fn resolve(&self, key: &str) -> Result<CachedValue, StoreError> {
        self.resolve_with("resolve", key).await
    }

    async fn resolve_with(
        &self,
        operation: &'static str,
        key: &str,
    ) -> Result<CachedValue, StoreError> {
        let cache_key = self.namespace.key(key);

        if let Some(hit) = self.memo.get(&cache_key) {
            counter!(METRIC_MEMO_HIT).increment(1);
            return Ok(hit);
        }
        counter!(METRIC_MEMO_MISS).increment(1);

        let epoch = self.memo.epoch(&cache_key);
        let rendered = cache_key.render();
        match self.shared_call(self.shared.get(&rendered)).await {
            Ok(Some(hit)) => {
                counter!(METRIC_SHARED_HIT).increment(1);
                self.memo.set_if_unchanged(&cache_key, hit.clone(), epoch);
                return Ok(hit);
            }
            Ok(None) => {
                counter!(METRIC_SHARED_MISS).increment(1);
            }
            Err(err) => self.report(operation, key, Some(Tier::Shared), &err),
        }

        let record = self.backing_call(self.repo.find(key)).await?;
        counter!(METRIC_BACKING_LOAD).increment(1);
        let resolved = CachedValue::from_record_value(record.map(|record| record.value));

        if let Err(err) = self
            .shared_call(self.shared.set(&rendered, &resolved))
            .await
        {
            self.report(operation, key, Some(Tier::Shared), &err);
        }
        if !self.memo.set_if_unchanged(&cache_key, resolved.clone(), epoch) {
            // a write committed mid-read; the shared entry may predate it
            if let Err(err) = self.shared_call(self.shared.forget(&rendered)).await {
                self.report(operation, key, Some(Tier::Shared), &err);
            }
            debug!(
                target = "tierset::settings",
                key,
                "read raced a write; result not cached"
            );
            return Ok(resolved);
        }

        debug!(
            target = "tierset::settings",
            key,
            present = resolved.is_present(),
            "populated cache tiers from backing store"
        );
        Ok(resolved)
    }

    /// Upserts one setting, then overwrites both cache tiers with the committed value.
    ///
    /// A backing-store failure is returned and no tier is touched. A `None` description
    /// keeps the one already stored.
    pub async fn set(
        &self,
        key: &str,
        value: Value,
        description: Option<&str>,
    ) -> Result<SettingRecord, StoreError> {
        let entry = NewSetting::new(key, value).with_description(description);
        let record = self.backing_call(self.repo.upsert(&entry)).await?;
        self.write_through("set", &record).await;
        Ok(record)
    }

    /// Upserts every entry in one backing-store transaction.
    ///
    /// Cache tiers are written only after the transaction commits, in the order given.
    /// If any entry fails, nothing is applied and no tier is touched.
    pub async fn set_many<I, K>(
        &self,
        entries: I,
        description: Option<&str>,
    ) -> Result<Vec<SettingRecord>, StoreError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let entries: Vec<NewSetting> = entries
            .into_iter()
            .map(|(key, value)| NewSetting::new(key, value).with_description(description))
            .collect();
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let records = self.backing_call(self.repo.bulk_upsert(&entries)).await?;
        for record in &records {
            self.write_through("set_many", record).await;
        }
        Ok(records)
    }

    /// Deletes `key` and forgets it from both tiers whether or not a row existed.
    pub async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let removed = self.backing_call(self.repo.delete(key)).await?;

        let cache_key = self.namespace.key(key);
        self.memo.invalidate(&cache_key);
        if let Err(err) = self
            .shared_call(self.shared.forget(&cache_key.render()))
            .await
        {
            self.report("remove", key, Some(Tier::Shared), &err);
        }
        self.memo.invalidate(&cache_key);

        Ok(removed)
    }

    /// Every row, straight from the backing store.
    pub async fn all(&self) -> Result<Vec<SettingRecord>, StoreError> {
        Ok(self.backing_call(self.repo.list_all(Projection::Full)).await?)
    }

    /// Rows whose key matches the SQL `LIKE` pattern, straight from the backing store.
    pub async fn search(&self, pattern: &str) -> Result<Vec<SettingRecord>, StoreError> {
        Ok(self.backing_call(self.repo.search(pattern)).await?)
    }

    /// Drops this store's memo entries. The shared tier and other namespaces are kept.
    pub fn clear_memory_cache(&self) {
        self.memo.clear_namespace(&self.namespace);
    }

    pub fn is_memo_cached(&self, key: &str) -> bool {
        self.memo.get(&self.namespace.key(key)).is_some()
    }

    pub async fn is_shared_cached(&self, key: &str) -> Result<bool, StoreError> {
        let rendered = self.namespace.key(key).render();
        Ok(self.shared_call(self.shared.has(&rendered)).await?)
    }

    /// Forgets one key from both tiers without touching the backing store.
    pub async fn forget_cached(&self, key: &str) -> Result<(), StoreError> {
        let cache_key = self.namespace.key(key);
        self.memo.forget(&cache_key);
        self.shared_call(self.shared.forget(&cache_key.render()))
            .await?;
        Ok(())
    }

    /// Forgets every stored key from the shared tier and clears this namespace's memo.
    ///
    /// Keeps going past shared-tier failures and returns the first one after the memo
    /// is cleared. On success returns the number of keys forgotten.
    pub async fn flush_cache(&self) -> Result<usize, StoreError> {
        let rows = self
            .backing_call(self.repo.list_all(Projection::KeysOnly))
            .await?;

        let mut first_error: Option<SharedCacheError> = None;
        for row in &rows {
            let rendered = self.namespace.key(&row.key).render();
            if let Err(err) = self.shared_call(self.shared.forget(&rendered)).await {
                self.report("flush_cache", &row.key, Some(Tier::Shared), &err);
                first_error.get_or_insert(err);
            }
        }
        self.clear_memory_cache();

        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(rows.len()),
        }
    }

    pub async fn is_ready(&self) -> Result<bool, StoreError> {
        Ok(self.backing_call(self.repo.is_ready()).await?)
    }

    /// Overwrites both tiers with a committed record.
    ///
    /// If the shared tier rejects the value, the entry is forgotten so it cannot keep
    /// serving the previous one. The write itself already succeeded.
    async fn write_through(&self, operation: &'static str, record: &SettingRecord) {
        let cache_key = self.namespace.key(&record.key);
        let cached = CachedValue::Present(record.value.clone());
        let rendered = cache_key.render();

        self.memo.invalidate(&cache_key);
        if let Err(err) = self.shared_call(self.shared.set(&rendered, &cached)).await {
            self.report(operation, &record.key, Some(Tier::Shared), &err);
            if let Err(err) = self.shared_call(self.shared.forget(&rendered)).await {
                self.report(operation, &record.key, Some(Tier::Shared), &err);
            }
        }
        self.memo.publish(&cache_key, cached);
    }

    async fn backing_call<T>(
        &self,
        call: impl Future<Output = Result<T, RepoError>>,
    ) -> Result<T, RepoError> {
        tokio::time::timeout(self.config.backing_timeout(), call)
            .await
            .map_err(|_| RepoError::Timeout)?
    }

    async fn shared_call<T>(
        &self,
        call: impl Future<Output = Result<T, SharedCacheError>>,
    ) -> Result<T, SharedCacheError> {
        let limit = self.config.shared_timeout();
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| SharedCacheError::Timeout(limit.as_millis() as u64))?
    }

    fn report(
        &self,
        operation: &'static str,
        key: &str,
        tier: Option<Tier>,
        error: &(dyn std::error::Error + Send + Sync),
    ) {
        self.reporter.report(Incident {
            operation,
            key,
            tier,
            error,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::infra::{memory::MemoryRepositories, shared::LocalSharedCache};

    #[derive(Default)]
    struct RecordingReporter {
        incidents: Mutex<Vec<(&'static str, String, Option<Tier>)>>,
    }

    impl ErrorReporter for RecordingReporter {
        fn report(&self, incident: Incident<'_>) {
            self.incidents.lock().unwrap().push((
                incident.operation,
                incident.key.to_string(),
                incident.tier,
            ));
        }
    }

    /// Shared tier that rejects writes but tracks forgets.
    #[derive(Default)]
    struct RejectingSharedCache {
        forgets: AtomicUsize,
    }

    #[async_trait]
    impl SharedCache for RejectingSharedCache {
        fn backend(&self) -> &'static str {
            "rejecting"
        }

        async fn get(&self, _key: &str) -> Result<Option<CachedValue>, SharedCacheError> {
            Err(SharedCacheError::unavailable("connection refused"))
        }

        async fn set(&self, _key: &str, _value: &CachedValue) -> Result<(), SharedCacheError> {
            Err(SharedCacheError::unavailable("connection refused"))
        }

        async fn has(&self, _key: &str) -> Result<bool, SharedCacheError> {
            Err(SharedCacheError::unavailable("connection refused"))
        }

        async fn forget(&self, _key: &str) -> Result<(), SharedCacheError> {
            self.forgets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct SlowRepo;

    #[async_trait]
    impl SettingsRepo for SlowRepo {
        fn identity(&self) -> &str {
            "slow"
        }

        async fn find(&self, _key: &str) -> Result<Option<SettingRecord>, RepoError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(None)
        }

        async fn upsert(&self, _entry: &NewSetting) -> Result<SettingRecord, RepoError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Err(RepoError::Persistence("unreachable".into()))
        }

        async fn delete(&self, _key: &str) -> Result<bool, RepoError> {
            Ok(false)
        }

        async fn bulk_upsert(
            &self,
            _entries: &[NewSetting],
        ) -> Result<Vec<SettingRecord>, RepoError> {
            Ok(Vec::new())
        }

        async fn list_all(&self, _projection: Projection) -> Result<Vec<SettingRecord>, RepoError> {
            Ok(Vec::new())
        }

        async fn search(&self, _pattern: &str) -> Result<Vec<SettingRecord>, RepoError> {
            Ok(Vec::new())
        }

        async fn is_ready(&self) -> Result<bool, RepoError> {
            Ok(true)
        }
    }

    fn memory_store() -> SettingsStore {
        SettingsStore::new(
            Arc::new(MemoryRepositories::new("memory")),
            Arc::new(LocalSharedCache::new()),
            CacheConfig::default(),
        )
        .expect("store")
    }

    #[test]
    fn construction_rejects_invalid_prefix() {
        let result = SettingsStore::new(
            Arc::new(MemoryRepositories::new("memory")),
            Arc::new(LocalSharedCache::new()),
            CacheConfig::default().with_prefix("bad:"),
        );
        assert!(matches!(result, Err(StoreError::Configuration { .. })));
    }

    #[tokio::test]
    async fn stored_null_exists_but_reads_as_default() {
        let store = memory_store();
        store.set("nothing", Value::Null, None).await.expect("set");

        assert!(store.has("nothing").await);
        assert_eq!(store.get("nothing").await, None);
        assert_eq!(store.get_or("nothing", json!("D")).await, json!("D"));
    }

    #[tokio::test]
    async fn get_as_reports_shape_mismatch() {
        let reporter = Arc::new(RecordingReporter::default());
        let store = memory_store().with_reporter(reporter.clone());
        store.set("limit", json!("ten"), None).await.expect("set");

        assert_eq!(store.get_as::<u32>("limit").await, None);
        assert_eq!(store.get_as::<String>("limit").await.as_deref(), Some("ten"));

        let incidents = reporter.incidents.lock().unwrap();
        assert_eq!(incidents.as_slice(), &[("get_as", "limit".to_string(), None)]);
    }

    #[tokio::test]
    async fn failed_shared_write_through_is_forgotten_and_reported() {
        let reporter = Arc::new(RecordingReporter::default());
        let shared = Arc::new(RejectingSharedCache::default());
        let store = SettingsStore::new(
            Arc::new(MemoryRepositories::new("memory")),
            shared.clone(),
            CacheConfig::default(),
        )
        .expect("store")
        .with_reporter(reporter.clone());

        let record = store
            .set("theme", json!("dark"), Some("UI theme"))
            .await
            .expect("durable write succeeds");
        assert_eq!(record.value, json!("dark"));
        assert_eq!(shared.forgets.load(Ordering::SeqCst), 1);
        assert_eq!(store.get("theme").await, Some(json!("dark")));

        let incidents = reporter.incidents.lock().unwrap();
        assert_eq!(
            incidents.first(),
            Some(&("set", "theme".to_string(), Some(Tier::Shared)))
        );
    }

    #[tokio::test]
    async fn unreachable_shared_tier_falls_through_to_backing_store() {
        let repo = Arc::new(MemoryRepositories::new("memory"));
        repo.upsert(&NewSetting::new("theme", json!("light")))
            .await
            .expect("seed");
        let store = SettingsStore::new(
            repo,
            Arc::new(RejectingSharedCache::default()),
            CacheConfig::default(),
        )
        .expect("store")
        .with_reporter(Arc::new(RecordingReporter::default()));

        assert_eq!(store.get("theme").await, Some(json!("light")));
    }

    #[tokio::test]
    async fn slow_backing_store_times_out() {
        let reporter = Arc::new(RecordingReporter::default());
        let config = CacheConfig {
            backing_timeout_ms: 10,
            ..CacheConfig::default()
        };
        let store = SettingsStore::new(Arc::new(SlowRepo), Arc::new(LocalSharedCache::new()), config)
            .expect("store")
            .with_reporter(reporter.clone());

        assert_eq!(store.get_or("k", json!("D")).await, json!("D"));
        assert!(!store.is_memo_cached("k"));

        let err = store.set("k", json!(1), None).await.expect_err("timeout");
        assert!(matches!(err, StoreError::Storage(RepoError::Timeout)));
        assert!(!store.is_memo_cached("k"));

        let incidents = reporter.incidents.lock().unwrap();
        assert_eq!(
            incidents.as_slice(),
            &[("get", "k".to_string(), Some(Tier::Backing))]
        );
    }

    #[tokio::test]
    async fn flush_cache_forgets_every_stored_key() {
        let store = memory_store();
        store
            .set_many([("a", json!(1)), ("b", json!(2))], None)
            .await
            .expect("set_many");
        assert!(store.is_shared_cached("a").await.expect("has"));

        let flushed = store.flush_cache().await.expect("flush");

        assert_eq!(flushed, 2);
        assert!(!store.is_memo_cached("a"));
        assert!(!store.is_shared_cached("a").await.expect("has"));
        assert!(!store.is_shared_cached("b").await.expect("has"));
        assert_eq!(store.get("b").await, Some(json!(2)));
    }

    #[tokio::test]
    async fn forget_cached_leaves_the_row() {
        let store = memory_store();
        store.set("a", json!(1), None).await.expect("set");

        store.forget_cached("a").await.expect("forget");

        assert!(!store.is_memo_cached("a"));
        assert!(!store.is_shared_cached("a").await.expect("has"));
        assert_eq!(store.get("a").await, Some(json!(1)));
    }

    #[tokio::test]
    async fn set_many_with_repeated_key_keeps_the_last_value() {
        let store = memory_store();
        store
            .set_many([("a", json!(1)), ("a", json!(2))], Some("batch"))
            .await
            .expect("set_many");

        assert_eq!(store.get("a").await, Some(json!(2)));
        store.clear_memory_cache();
        assert_eq!(store.get("a").await, Some(json!(2)));
    }
}
