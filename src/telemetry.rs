//! Telemetry logic.
//! Lookup events and logging setup.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::FailureKind;

const DEFAULT_FILTER: &str = "people_ldap=info";

/// Port for lookup observability.
pub trait Telemetry: Send + Sync {
    fn record_cache_hit(&self, key: &str);

    fn record_cache_miss(&self, key: &str);

    /// A fresh record was written to the cache.
    fn record_cache_store(&self, key: &str, expires_at: u64);

    /// A fresh record was not trusted and therefore not cached.
    fn record_cache_skip(&self, key: &str);

    /// A transport stage failed. Called once per failed lookup.
    fn record_failure(&self, key: &str, kind: FailureKind, details: &str);
}

/// Tracing-based telemetry adapter.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TracingTelemetry {
    /// Create a new [`TracingTelemetry`].
    pub fn new() -> Self {
        Self
    }
}

impl Telemetry for TracingTelemetry {
    fn record_cache_hit(&self, key: &str) {
        tracing::debug!(key, "cache hit");
    }

    fn record_cache_miss(&self, key: &str) {
        tracing::debug!(key, "cache miss");
    }

    fn record_cache_store(&self, key: &str, expires_at: u64) {
        tracing::debug!(key, expires_at, "directory record cached");
    }

    fn record_cache_skip(&self, key: &str) {
        tracing::debug!(key, "directory record not trusted, cache skipped");
    }

    fn record_failure(&self, key: &str, kind: FailureKind, details: &str) {
        tracing::error!(key, %kind, error = details, "directory lookup failed");
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn setup_logging() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
