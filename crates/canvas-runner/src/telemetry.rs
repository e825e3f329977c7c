//! Counter telemetry
//!
//! Orchestrators report logical events through [`Telemetry`], once per
//! event. The default sink forwards to the `metrics` facade; the recording
//! sink keeps names in memory for assertions.

use std::collections::BTreeMap;
use std::fmt::Debug;

use dashmap::DashMap;

/// Counter names
pub mod counters {
    /// Run requested
    pub const RUN_CLICKED: &str = "canvas.run.clicked";
    /// Run blocked locally by engine limits
    pub const RUN_BLOCKED: &str = "canvas.run.blocked";
    /// Run completed
    pub const RUN_COMPLETED: &str = "canvas.run.completed";
    /// Run failed
    pub const RUN_FAILED: &str = "canvas.run.failed";
    /// Run cancelled by the user
    pub const RUN_CANCELLED: &str = "canvas.run.cancelled";
    /// Run served from the completion cache
    pub const RUN_CACHE_HIT: &str = "canvas.run.cache_hit";
    /// Preview sent to the backend
    pub const PREVIEW_DISPATCHED: &str = "canvas.preview.dispatched";
    /// Preview rejected by local validation
    pub const PREVIEW_INVALID: &str = "canvas.preview.invalid";
    /// Limits served from fallback defaults
    pub const LIMITS_FALLBACK: &str = "canvas.limits.fallback";
}

/// Counter sink
#[cfg_attr(test, mockall::automock)]
pub trait Telemetry: Send + Sync + Debug {
    /// Count one occurrence of `name`
    fn increment(&self, name: &'static str);
}

/// Sink forwarding to the `metrics` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsTelemetry;

impl Telemetry for MetricsTelemetry {
    fn increment(&self, name: &'static str) {
        metrics::counter!(name).increment(1);
        tracing::trace!(counter = name, "telemetry");
    }
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn increment(&self, _name: &'static str) {}
}

/// In-memory sink
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    counts: DashMap<&'static str, u64>,
}

impl RecordingTelemetry {
    /// Empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Occurrences of `name`
    #[must_use]
    pub fn count(&self, name: &str) -> u64 {
        self.counts.get(name).map_or(0, |count| *count)
    }

    /// All counters
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<&'static str, u64> {
        self.counts
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }
}

impl Telemetry for RecordingTelemetry {
    fn increment(&self, name: &'static str) {
        *self.counts.entry(name).or_insert(0) += 1;
    }
}
