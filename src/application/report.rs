//! Side channel for failures the read path absorbs.

use std::fmt;

use metrics::counter;
use tracing::warn;

pub(crate) const METRIC_TIER_ERROR: &str = "tierset_tier_error_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Shared,
    Backing,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Shared => "shared",
            Tier::Backing => "backing",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure that did not reach the caller.
///
/// `tier` is `None` when no tier failed, e.g. a stored value that does not decode.
#[derive(Debug, Clone, Copy)]
pub struct Incident<'a> {
    pub operation: &'static str,
    pub key: &'a str,
    pub tier: Option<Tier>,
    pub error: &'a (dyn std::error::Error + Send + Sync),
}

/// Receives absorbed failures. Implementations must not block.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, incident: Incident<'_>);
}

/// Logs each incident at `warn` and bumps `tierset_tier_error_total`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, incident: Incident<'_>) {
        let tier = incident.tier.map_or("none", Tier::as_str);
        warn!(
            target = "tierset::settings",
            op = incident.operation,
            key = incident.key,
            tier,
            error = %incident.error,
            "settings tier failure absorbed"
        );
        counter!(
            METRIC_TIER_ERROR,
            "tier" => tier,
            "op" => incident.operation
        )
        .increment(1);
    }
}
