//! Namespace derivation and namespaced cache keys.
//!
//! A namespace is `"{prefix}|{identity}"` and a cache key is `"{namespace}:{raw}"`.
//! The prefix may contain neither `|` nor `:`, and the identity may not contain `:`.
//! The part before the first `:` therefore names exactly one (prefix, identity) pair.

use std::fmt;

use thiserror::Error;

pub const SEPARATOR: char = ':';
/// Ends the prefix inside a namespace.
pub const PREFIX_DELIMITER: char = '|';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamespaceError {
    #[error("store identity must not be empty")]
    EmptyIdentity,
    #[error("{part} `{value}` must not contain `{reserved}`")]
    Reserved {
        part: &'static str,
        value: String,
        reserved: char,
    },
}

/// Cache scope of one backing store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    pub fn derive(prefix: &str, identity: &str) -> Result<Self, NamespaceError> {
        if identity.is_empty() {
            return Err(NamespaceError::EmptyIdentity);
        }
        if let Some(reserved) = prefix
            .chars()
            .find(|c| *c == SEPARATOR || *c == PREFIX_DELIMITER)
        {
            return Err(NamespaceError::Reserved {
                part: "cache prefix",
                value: prefix.to_string(),
                reserved,
            });
        }
        if identity.contains(SEPARATOR) {
            return Err(NamespaceError::Reserved {
                part: "store identity",
                value: identity.to_string(),
                reserved: SEPARATOR,
            });
        }
        Ok(Self(format!("{prefix}{PREFIX_DELIMITER}{identity}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn key(&self, raw: &str) -> CacheKey {
        CacheKey {
            namespace: self.clone(),
            raw: raw.to_string(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A raw setting key bound to its namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: Namespace,
    raw: String,
}

impl CacheKey {
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Flat string form used by the shared tier.
    pub fn render(&self) -> String {
        format!("{}{SEPARATOR}{}", self.namespace.0, self.raw)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.namespace.0, self.raw)
    }
}
