//! Refresh statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for refresh activity.
///
/// All counters are atomic and can be safely accessed from multiple threads.
#[derive(Debug, Default)]
pub struct RefreshStats {
    /// Refresh executions started.
    refreshes_started: AtomicU64,
    /// Refreshes that published a snapshot.
    refreshes_succeeded: AtomicU64,
    /// Refreshes that failed and were reported.
    refreshes_failed: AtomicU64,
    /// Requests that joined an in-flight refresh.
    refreshes_joined: AtomicU64,
    /// Checks that found the source fresh.
    fresh_skips: AtomicU64,
    /// Successful refreshes whose identity matched the previous snapshot.
    unchanged_refreshes: AtomicU64,
    /// Scheduler ticks executed.
    ticks: AtomicU64,
}

impl RefreshStats {
    /// Create new refresh statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a refresh execution starting.
    #[inline]
    pub fn record_started(&self) {
        self.refreshes_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful refresh.
    #[inline]
    pub fn record_succeeded(&self, changed: bool) {
        self.refreshes_succeeded.fetch_add(1, Ordering::Relaxed);
        if !changed {
            self.unchanged_refreshes.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a failed refresh.
    #[inline]
    pub fn record_failed(&self) {
        self.refreshes_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request joining an in-flight refresh.
    #[inline]
    pub fn record_joined(&self) {
        self.refreshes_joined.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a check that needed no work.
    #[inline]
    pub fn record_fresh_skip(&self) {
        self.fresh_skips.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a scheduler tick.
    #[inline]
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total refreshes started.
    #[inline]
    pub fn refreshes_started(&self) -> u64 {
        self.refreshes_started.load(Ordering::Relaxed)
    }

    /// Get total successful refreshes.
    #[inline]
    pub fn refreshes_succeeded(&self) -> u64 {
        self.refreshes_succeeded.load(Ordering::Relaxed)
    }

    /// Get total failed refreshes.
    #[inline]
    pub fn refreshes_failed(&self) -> u64 {
        self.refreshes_failed.load(Ordering::Relaxed)
    }

    /// Get total joined requests.
    #[inline]
    pub fn refreshes_joined(&self) -> u64 {
        self.refreshes_joined.load(Ordering::Relaxed)
    }

    /// Get total fresh skips.
    #[inline]
    pub fn fresh_skips(&self) -> u64 {
        self.fresh_skips.load(Ordering::Relaxed)
    }

    /// Get total unchanged refreshes.
    #[inline]
    pub fn unchanged_refreshes(&self) -> u64 {
        self.unchanged_refreshes.load(Ordering::Relaxed)
    }

    /// Get total scheduler ticks.
    #[inline]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Fraction of completed refreshes that failed (0.0 to 1.0).
    pub fn failure_rate(&self) -> f64 {
        let failed = self.refreshes_failed() as f64;
        let total = failed + self.refreshes_succeeded() as f64;
        if total == 0.0 {
            0.0
        } else {
            failed / total
        }
    }

    /// Reset all statistics.
    pub fn reset(&self) {
        self.refreshes_started.store(0, Ordering::Relaxed);
        self.refreshes_succeeded.store(0, Ordering::Relaxed);
        self.refreshes_failed.store(0, Ordering::Relaxed);
        self.refreshes_joined.store(0, Ordering::Relaxed);
        self.fresh_skips.store(0, Ordering::Relaxed);
        self.unchanged_refreshes.store(0, Ordering::Relaxed);
        self.ticks.store(0, Ordering::Relaxed);
    }
}
