use async_trait::async_trait;

use crate::cache::{CachedValue, SharedCache, SharedCacheError};

/// A shared tier that stores nothing. Every read falls through to the backing store
/// unless the memo tier already holds the key.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledSharedCache;

#[async_trait]
impl SharedCache for DisabledSharedCache {
    fn backend(&self) -> &'static str {
        "disabled"
    }

    async fn get(&self, _key: &str) -> Result<Option<CachedValue>, SharedCacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &CachedValue) -> Result<(), SharedCacheError> {
        Ok(())
    }

    async fn has(&self, _key: &str) -> Result<bool, SharedCacheError> {
        Ok(false)
    }

    async fn forget(&self, _key: &str) -> Result<(), SharedCacheError> {
        Ok(())
    }
}
