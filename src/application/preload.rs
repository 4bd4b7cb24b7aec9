use std::time::Instant;

use futures::stream::{self, StreamExt};
use metrics::histogram;
use tracing::{info, warn};

use crate::{application::settings::SettingsStore, cache::CachedValue};

const DEFAULT_CONCURRENCY: usize = 4;
const METRIC_PRELOAD_MS: &str = "tierset_preload_ms";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadConfig {
    pub enabled: bool,
    /// Resolved in this order; duplicates are resolved once each time they appear.
    pub keys: Vec<String>,
    pub concurrency: usize,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keys: Vec::new(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl From<&crate::config::PreloadSettings> for PreloadConfig {
    fn from(settings: &crate::config::PreloadSettings) -> Self {
        Self {
            enabled: settings.enabled,
            keys: settings.keys.clone(),
            concurrency: settings.concurrency.get() as usize,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadReport {
    pub loaded: usize,
    pub missing: usize,
    pub failed: usize,
    pub skipped: bool,
}

impl PreloadReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Warms the cache tiers for a fixed list of keys before real traffic arrives.
pub struct Preloader {
    store: SettingsStore,
    config: PreloadConfig,
}

impl Preloader {
    pub fn new(store: SettingsStore, config: PreloadConfig) -> Self {
        Self { store, config }
    }

    /// Never fails: every problem is logged and counted in the report.
    pub async fn run(&self) -> PreloadReport {
        if !self.config.enabled || self.config.keys.is_empty() {
            return PreloadReport::skipped();
        }

        match self.store.is_ready().await {
            Ok(true) => {}
            Ok(false) => {
                info!(
                    target = "tierset::preload",
                    namespace = %self.store.namespace(),
                    "settings table not ready; skipping preload"
                );
                return PreloadReport::skipped();
            }
            Err(err) => {
                warn!(
                    target = "tierset::preload",
                    namespace = %self.store.namespace(),
                    error = %err,
                    "readiness check failed; skipping preload"
                );
                return PreloadReport::skipped();
            }
        }

        let started = Instant::now();
        let store = &self.store;
        let outcomes: Vec<_> = stream::iter(self.config.keys.iter())
            .map(|key| async move { (key, store.resolve(key).await) })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut report = PreloadReport::default();
        for (key, outcome) in outcomes {
            match outcome {
                Ok(CachedValue::Present(_)) => report.loaded += 1,
                Ok(CachedValue::Absent) => report.missing += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        target = "tierset::preload",
                        key = key.as_str(),
                        error = %err,
                        "failed to preload setting"
                    );
                }
            }
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_PRELOAD_MS).record(elapsed_ms);
        info!(
            target = "tierset::preload",
            namespace = %self.store.namespace(),
            loaded = report.loaded,
            missing = report.missing,
            failed = report.failed,
            elapsed_ms,
            "settings preload finished"
        );
        report
    }
}
