use async_trait::async_trait;
use dashmap::DashMap;

use crate::cache::{CachedValue, SharedCache, SharedCacheError};

/// Process-wide shared tier. Outlives any single store that points at it, which makes
/// it the cross-request tier for a single-process deployment.
#[derive(Debug, Default)]
pub struct LocalSharedCache {
    entries: DashMap<String, CachedValue>,
}

impl LocalSharedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SharedCache for LocalSharedCache {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn get(&self, key: &str) -> Result<Option<CachedValue>, SharedCacheError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: &CachedValue) -> Result<(), SharedCacheError> {
        self.entries.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool, SharedCacheError> {
        Ok(self.entries.contains_key(key))
    }

    async fn forget(&self, key: &str) -> Result<(), SharedCacheError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn entries_live_until_forgotten() {
        let cache = LocalSharedCache::new();
        cache
            .set("ns:a", &CachedValue::Present(json!(1)))
            .await
            .expect("set");
        cache.set("ns:b", &CachedValue::Absent).await.expect("set");

        assert!(cache.has("ns:b").await.expect("has"));
        assert_eq!(cache.get("ns:b").await.expect("get"), Some(CachedValue::Absent));
        assert_eq!(cache.len(), 2);

        cache.forget("ns:a").await.expect("forget");
        assert_eq!(cache.get("ns:a").await.expect("get"), None);
        assert!(!cache.has("ns:a").await.expect("has"));
    }
}
