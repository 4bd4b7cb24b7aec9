//! Contract of the out-of-process tier.

use async_trait::async_trait;
use thiserror::Error;

use super::entry::CachedValue;

#[derive(Debug, Error)]
pub enum SharedCacheError {
    #[error("shared cache unavailable: {0}")]
    Unavailable(String),
    #[error("shared cache timed out after {0} ms")]
    Timeout(u64),
    #[error("shared cache entry could not be encoded or decoded: {0}")]
    Encoding(String),
}

impl SharedCacheError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Cache keyed by an opaque string, holding entries until `forget` is called.
///
/// Implementations must surface connectivity failures as errors rather than panicking;
/// the caller decides whether a failed lookup is treated as a miss.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Short label for logs.
    fn backend(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<CachedValue>, SharedCacheError>;

    /// Stores `value` with no expiry.
    async fn set(&self, key: &str, value: &CachedValue) -> Result<(), SharedCacheError>;

    async fn has(&self, key: &str) -> Result<bool, SharedCacheError>;

    async fn forget(&self, key: &str) -> Result<(), SharedCacheError>;
}
