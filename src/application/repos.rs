//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{
    entities::{NewSetting, SettingRecord},
    error::DomainError,
};

/// Failure of the durable tier. Never swallowed by an adapter.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<DomainError> for RepoError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation { message } => Self::InvalidInput { message },
        }
    }
}

/// Columns returned by [`SettingsRepo::list_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    Full,
    /// Only `key` and the timestamps; `value` is `Null` and `description` is `None`.
    KeysOnly,
}

/// Durable key/value table with a unique key.
///
/// `search` follows SQL `LIKE`: `%` matches any run (including empty), `_` matches one
/// character, `\` escapes either. Case sensitivity is whatever the store's collation does;
/// both bundled stores compare case-sensitively.
#[async_trait]
pub trait SettingsRepo: Send + Sync {
    /// Stable name of the concrete table, used to derive the cache namespace.
    fn identity(&self) -> &str;

    async fn find(&self, key: &str) -> Result<Option<SettingRecord>, RepoError>;

    /// Insert or update one row. Repeating the same input is a no-op apart from `updated_at`.
    async fn upsert(&self, entry: &NewSetting) -> Result<SettingRecord, RepoError>;

    /// Returns `true` iff a row existed and was removed.
    async fn delete(&self, key: &str) -> Result<bool, RepoError>;

    /// Upsert every entry in one transaction: all rows apply or none do.
    async fn bulk_upsert(&self, entries: &[NewSetting]) -> Result<Vec<SettingRecord>, RepoError>;

    async fn list_all(&self, projection: Projection) -> Result<Vec<SettingRecord>, RepoError>;

    async fn search(&self, pattern: &str) -> Result<Vec<SettingRecord>, RepoError>;

    /// Whether the table exists and can serve queries.
    async fn is_ready(&self) -> Result<bool, RepoError>;
}
