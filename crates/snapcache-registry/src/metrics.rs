//! Prometheus-style metrics for refresh activity.
//!
//! Metrics are emitted through the `metrics` facade; without an installed
//! recorder every call is a no-op.
//!
//! - `snapcache_refreshes_total{source, outcome}` - completed refreshes
//! - `snapcache_refresh_duration_seconds{source}` - refresh latency
//! - `snapcache_refreshes_joined_total{source}` - de-duplicated requests
//! - `snapcache_refreshes_in_flight` - currently executing refreshes
//! - `snapcache_sources` - registered sources
//! - `snapcache_ticks_total` - scheduler ticks

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use snapcache_core::SourceName;

/// Metrics handle shared by the registry and scheduler.
#[derive(Debug, Clone, Default)]
pub struct RefreshMetrics {
    inner: Arc<RefreshMetricsInner>,
}

#[derive(Debug, Default)]
struct RefreshMetricsInner {
    /// Refreshes currently executing.
    in_flight: AtomicU64,
}

impl RefreshMetrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a refresh of `source`.
    pub fn refresh_started(&self, source: &SourceName) -> RefreshTracker {
        let count = self.inner.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        gauge!("snapcache_refreshes_in_flight").set(count as f64);
        RefreshTracker {
            start: Instant::now(),
            source: source.to_string(),
            metrics: self.clone(),
        }
    }

    /// Record a request that joined an in-flight refresh.
    pub fn refresh_joined(&self, source: &SourceName) {
        counter!("snapcache_refreshes_joined_total", "source" => source.to_string()).increment(1);
    }

    /// Record the number of registered sources.
    pub fn sources_registered(&self, count: usize) {
        gauge!("snapcache_sources").set(count as f64);
    }

    /// Record a scheduler tick.
    pub fn tick(&self) {
        counter!("snapcache_ticks_total").increment(1);
    }

    /// Get the number of refreshes currently executing.
    pub fn in_flight(&self) -> u64 {
        self.inner.in_flight.load(Ordering::Relaxed)
    }

    fn refresh_finished(&self) {
        let count = self.inner.in_flight.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        gauge!("snapcache_refreshes_in_flight").set(count as f64);
    }
}

/// Tracks one refresh execution.
///
/// Call [`finish`](Self::finish) with the outcome label; the in-flight gauge
/// is decremented when the tracker is dropped either way.
#[derive(Debug)]
pub struct RefreshTracker {
    start: Instant,
    source: String,
    metrics: RefreshMetrics,
}

impl RefreshTracker {
    /// Record the outcome and latency.
    pub fn finish(self, outcome: &'static str) {
        let elapsed = self.start.elapsed();
        counter!(
            "snapcache_refreshes_total",
            "source" => self.source.clone(),
            "outcome" => outcome
        )
        .increment(1);
        histogram!("snapcache_refresh_duration_seconds", "source" => self.source.clone())
            .record(elapsed.as_secs_f64());
    }
}

impl Drop for RefreshTracker {
    fn drop(&mut self) {
        self.metrics.refresh_finished();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_creation() {
        let metrics = RefreshMetrics::new();
        assert_eq!(metrics.in_flight(), 0);
    }

    #[test]
    fn in_flight_tracking() {
        let metrics = RefreshMetrics::new();
        let acl = SourceName::new("acl").unwrap();
        let flags = SourceName::new("flags").unwrap();

        let first = metrics.refresh_started(&acl);
        assert_eq!(metrics.in_flight(), 1);

        let second = metrics.refresh_started(&flags);
        assert_eq!(metrics.in_flight(), 2);

        first.finish("refreshed");
        assert_eq!(metrics.in_flight(), 1);

        drop(second);
        assert_eq!(metrics.in_flight(), 0);
    }

    #[test]
    fn clones_share_counters() {
        let metrics = RefreshMetrics::new();
        let clone = metrics.clone();
        let name = SourceName::new("acl").unwrap();

        let _tracker = clone.refresh_started(&name);
        assert_eq!(metrics.in_flight(), 1);
    }
}
