//! Builder for configuring and creating a refresh scheduler.

use std::sync::Arc;
use std::time::Duration;

use snapcache_core::{Clock, SnapcacheResult, SystemClock};

use crate::config::SchedulerConfig;
use crate::registry::SourceRegistry;
use crate::reporter::{ErrorReporter, TracingReporter};
use crate::scheduler::RefreshScheduler;

/// Builder for a [`RefreshScheduler`].
///
/// # Example
///
/// ```rust
/// use snapcache_core::ManualClock;
/// use snapcache_registry::{MemoryReporter, RefreshScheduler};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let scheduler = RefreshScheduler::builder()
///     .clock(Arc::new(ManualClock::new(0)))
///     .reporter(Arc::new(MemoryReporter::new()))
///     .tick_period(Duration::from_millis(500))
///     .build()
///     .unwrap();
/// assert_eq!(scheduler.config().tick_period, Duration::from_millis(500));
/// ```
#[derive(Debug, Default)]
pub struct SchedulerBuilder {
    registry: Option<Arc<SourceRegistry>>,
    clock: Option<Arc<dyn Clock>>,
    reporter: Option<Arc<dyn ErrorReporter>>,
    config: SchedulerConfig,
}

impl SchedulerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive an existing registry instead of creating one.
    pub fn registry(mut self, registry: Arc<SourceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the clock (defaults to [`SystemClock`]).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the error reporter (defaults to [`TracingReporter`]).
    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the tick period.
    pub fn tick_period(mut self, period: Duration) -> Self {
        self.config.tick_period = period;
        self
    }

    /// Set the watch channel buffer size for a newly created registry.
    pub fn watch_buffer_size(mut self, size: usize) -> Self {
        self.config.watch_buffer_size = size;
        self
    }

    /// Build the scheduler.
    pub fn build(self) -> SnapcacheResult<RefreshScheduler> {
        self.config.validate()?;
        let registry = self.registry.unwrap_or_else(|| {
            Arc::new(SourceRegistry::with_watch_buffer(
                self.config.watch_buffer_size,
            ))
        });
        Ok(RefreshScheduler::from_parts(
            registry,
            self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            self.reporter.unwrap_or_else(|| Arc::new(TracingReporter)),
            self.config,
        ))
    }
}
