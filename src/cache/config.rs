//! Cache configuration.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_PREFIX: &str = "settings.";
const DEFAULT_SHARED_TIMEOUT_MS: u64 = 2000;
const DEFAULT_BACKING_TIMEOUT_MS: u64 = 5000;

/// Knobs consumed by [`crate::application::settings::SettingsStore`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Prepended to the store identity to form the namespace.
    pub prefix: String,
    /// Upper bound for one shared-tier call, in milliseconds.
    pub shared_timeout_ms: u64,
    /// Upper bound for one backing-store call, in milliseconds.
    pub backing_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            shared_timeout_ms: DEFAULT_SHARED_TIMEOUT_MS,
            backing_timeout_ms: DEFAULT_BACKING_TIMEOUT_MS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            prefix: settings.prefix.clone(),
            shared_timeout_ms: settings.shared_timeout_ms.get(),
            backing_timeout_ms: settings.backing_timeout_ms.get(),
        }
    }
}

impl CacheConfig {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Zero is clamped to one millisecond so a misconfiguration cannot disable the bound.
    pub fn shared_timeout(&self) -> Duration {
        Duration::from_millis(self.shared_timeout_ms.max(1))
    }

    pub fn backing_timeout(&self) -> Duration {
        Duration::from_millis(self.backing_timeout_ms.max(1))
    }
}
