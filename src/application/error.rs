use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    application::repos::RepoError,
    cache::{NamespaceError, SharedCacheError},
    domain::error::DomainError,
    infra::error::InfraError,
};

/// Errors raised by [`crate::application::settings::SettingsStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backing store failed: {0}")]
    Storage(#[from] RepoError),
    #[error(transparent)]
    SharedCache(#[from] SharedCacheError),
    #[error("store is misconfigured: {message}")]
    Configuration { message: String },
    #[error("value for `{key}` could not be decoded: {message}")]
    Decode { key: String, message: String },
}

impl StoreError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl From<NamespaceError> for StoreError {
    fn from(err: NamespaceError) -> Self {
        Self::configuration(err.to_string())
    }
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        Self::Storage(RepoError::from(err))
    }
}

/// Flattened error chain, outermost first.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_errors_become_configuration_errors() {
        let err = StoreError::from(NamespaceError::EmptyIdentity);
        assert!(matches!(err, StoreError::Configuration { .. }));
    }

    #[test]
    fn report_walks_the_source_chain() {
        let err = AppError::Store(StoreError::Storage(RepoError::Timeout));
        let report = ErrorReport::from_error("test", &err);
        assert_eq!(report.messages[0], "backing store failed: database timeout");
        assert_eq!(report.messages.last().map(String::as_str), Some("database timeout"));
    }
}
