use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Metric descriptions go to whichever recorder is installed at that point, so install
/// the recorder first.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "tierset_memo_hit_total",
            Unit::Count,
            "Reads answered by the process-local memo tier."
        );
        describe_counter!(
            "tierset_memo_miss_total",
            Unit::Count,
            "Reads that missed the memo tier."
        );
        describe_counter!(
            "tierset_shared_hit_total",
            Unit::Count,
            "Memo misses answered by the shared tier."
        );
        describe_counter!(
            "tierset_shared_miss_total",
            Unit::Count,
            "Memo misses the shared tier could not answer."
        );
        describe_counter!(
            "tierset_backing_load_total",
            Unit::Count,
            "Lookups that reached the backing store and repopulated the cache tiers."
        );
        describe_counter!(
            "tierset_tier_error_total",
            Unit::Count,
            "Tier failures absorbed on the read path, labelled by tier and operation."
        );
        describe_counter!(
            "tierset_lock_poisoned_total",
            Unit::Count,
            "Memo or in-process store locks recovered after a panicking writer."
        );
        describe_histogram!(
            "tierset_preload_ms",
            Unit::Milliseconds,
            "Wall time of one preload run in milliseconds."
        );
    });
}
