//! Sinks for refresh failures.
//!
//! Refresh failures never propagate out of the scheduler. Each failed
//! attempt is handed to an [`ErrorReporter`] exactly once and then absorbed.

use std::sync::{Mutex, PoisonError};

use snapcache_core::{RefreshError, RefreshPhase, SourceName};
use tracing::error;

/// Receives refresh failures.
pub trait ErrorReporter: Send + Sync + std::fmt::Debug {
    /// Report a failed refresh of `source`.
    fn report(&self, source: &SourceName, phase: RefreshPhase, error: &RefreshError);
}

/// Reporter that logs failures through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, source: &SourceName, phase: RefreshPhase, err: &RefreshError) {
        error!(
            source = %source,
            phase = %phase,
            error = %err.inner(),
            "snapshot refresh failed"
        );
    }
}

/// A failure captured by [`MemoryReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedFailure {
    /// Source whose refresh failed.
    pub source: SourceName,
    /// Phase of the failure.
    pub phase: RefreshPhase,
    /// Rendered underlying error.
    pub message: String,
}

/// Reporter that keeps failures in memory.
///
/// Useful in tests and for surfacing recent failures on a status page.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    failures: Mutex<Vec<ReportedFailure>>,
}

impl MemoryReporter {
    /// Create an empty reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// All failures reported so far.
    pub fn failures(&self) -> Vec<ReportedFailure> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Failures reported for one source.
    pub fn failures_for(&self, source: &str) -> Vec<ReportedFailure> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|f| f.source.as_str() == source)
            .cloned()
            .collect()
    }

    /// Number of failures reported so far.
    pub fn len(&self) -> usize {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if nothing has been reported.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget all recorded failures.
    pub fn clear(&self) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl ErrorReporter for MemoryReporter {
    fn report(&self, source: &SourceName, phase: RefreshPhase, err: &RefreshError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ReportedFailure {
                source: source.clone(),
                phase,
                message: err.inner().to_string(),
            });
    }
}
