//! Refresh scheduler: initialization and the recurring freshness check.
//!
//! The [`RefreshScheduler`] drives every source in a [`SourceRegistry`]:
//!
//! - [`initialize_all`](RefreshScheduler::initialize_all) refreshes every
//!   source once and then starts the recurring tick
//! - [`reinitialize_check`](RefreshScheduler::reinitialize_check) refreshes
//!   only cold or stale sources
//! - [`reinitialize_start`](RefreshScheduler::reinitialize_start) and
//!   [`reinitialize_stop`](RefreshScheduler::reinitialize_stop) control the tick
//! - [`reset`](RefreshScheduler::reset) stops the tick and empties the registry
//!
//! Refresh failures never escape the scheduler; they are handed to its
//! [`ErrorReporter`] and counted in the returned [`InitializeSummary`].

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use snapcache_core::{
    BoxError, Clock, SnapcacheError, SnapcacheResult, SnapshotIdentity, SystemClock,
};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::builder::SchedulerBuilder;
use crate::config::{RegisterOptions, SchedulerConfig};
use crate::registry::SourceRegistry;
use crate::reporter::{ErrorReporter, TracingReporter};
use crate::snapshot::Snapshot;
use crate::source::{RefreshContext, RefreshOutcome, RefreshProcedure, Source};
use crate::watch::Watch;

/// Counts of outcomes from one pass over the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitializeSummary {
    /// Sources that published a new snapshot.
    pub refreshed: usize,
    /// Sources that were fresh and needed no work.
    pub fresh: usize,
    /// Sources whose refresh failed and was reported.
    pub failed: usize,
}

impl InitializeSummary {
    fn record(&mut self, outcome: &RefreshOutcome) {
        match outcome {
            RefreshOutcome::Fresh => self.fresh += 1,
            RefreshOutcome::Refreshed(_) => self.refreshed += 1,
            RefreshOutcome::Failed(_) => self.failed += 1,
        }
    }

    /// Number of sources visited.
    pub fn total(&self) -> usize {
        self.refreshed + self.fresh + self.failed
    }
}

impl fmt::Display for InitializeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} refreshed, {} fresh, {} failed",
            self.refreshed, self.fresh, self.failed
        )
    }
}

/// Drives refreshes of every source in a registry.
///
/// Cloning is cheap; clones share the registry and the tick task.
///
/// # Example
///
/// ```rust
/// use snapcache_registry::{RefreshScheduler, RegisterOptions};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let scheduler = RefreshScheduler::new();
/// scheduler
///     .register("acl", || async { Ok::<_, std::io::Error>(vec!["allow *"]) }, RegisterOptions::every(30))
///     .unwrap();
///
/// let summary = scheduler.initialize_all().await;
/// assert_eq!(summary.refreshed, 1);
/// assert!(scheduler.is_ticking());
///
/// let rules = scheduler.get_data::<Vec<&str>>("acl").unwrap().unwrap();
/// assert_eq!(rules.as_slice(), ["allow *"]);
///
/// scheduler.reset();
/// assert!(!scheduler.has_source("acl"));
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    inner: Arc<SchedulerInner>,
}

#[derive(Debug)]
struct SchedulerInner {
    registry: Arc<SourceRegistry>,
    clock: Arc<dyn Clock>,
    ctx: RefreshContext,
    config: SchedulerConfig,
    tick: Mutex<Option<JoinHandle<()>>>,
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshScheduler {
    /// Create a scheduler with a fresh registry and default settings.
    pub fn new() -> Self {
        Self::from_parts(
            Arc::new(SourceRegistry::new()),
            Arc::new(SystemClock),
            Arc::new(TracingReporter),
            SchedulerConfig::default(),
        )
    }

    /// Create a scheduler builder.
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub(crate) fn from_parts(
        registry: Arc<SourceRegistry>,
        clock: Arc<dyn Clock>,
        reporter: Arc<dyn ErrorReporter>,
        config: SchedulerConfig,
    ) -> Self {
        let ctx = RefreshContext::new(
            reporter,
            registry.stats_handle(),
            registry.watches_handle(),
            registry.metrics().clone(),
        );
        Self {
            inner: Arc::new(SchedulerInner {
                registry,
                clock,
                ctx,
                config,
                tick: Mutex::new(None),
            }),
        }
    }

    /// The registry this scheduler drives.
    #[inline]
    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.inner.registry
    }

    /// The scheduler configuration.
    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Current clock reading in seconds.
    #[inline]
    pub fn now_secs(&self) -> u64 {
        self.inner.clock.now_secs()
    }

    /// Refresh every source once, then start the recurring tick.
    ///
    /// Sources are refreshed concurrently. Never fails: failed sources are
    /// reported and stay cold until a later tick succeeds.
    pub async fn initialize_all(&self) -> InitializeSummary {
        let summary = self.inner.check().await;
        info!(%summary, "initialized sources");
        if let Err(err) = self.reinitialize_start() {
            warn!(error = %err, "could not start refresh tick");
        }
        summary
    }

    /// Refresh every cold or stale source once.
    ///
    /// Fresh sources cost nothing. Sources already refreshing are joined,
    /// not refreshed twice.
    pub async fn reinitialize_check(&self) -> InitializeSummary {
        self.inner.check().await
    }

    /// Start (or restart) the recurring tick.
    ///
    /// Any previous tick is cancelled first, so at most one tick task runs.
    /// The first tick fires one period after the call. Fails only when
    /// called outside a tokio runtime.
    pub fn reinitialize_start(&self) -> SnapcacheResult<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            SnapcacheError::configuration(format!("refresh tick needs a tokio runtime: {e}"))
        })?;

        let period = self.inner.config.tick_period;
        let handle = runtime.spawn(tick_loop(Arc::downgrade(&self.inner), period));

        if let Some(previous) = self.inner.lock_tick().replace(handle) {
            previous.abort();
            debug!("replaced previous refresh tick");
        }
        info!(period_ms = period.as_millis() as u64, "refresh tick started");
        Ok(())
    }

    /// Stop the recurring tick. Refreshes already running are not cancelled.
    pub fn reinitialize_stop(&self) {
        if self.inner.stop_tick() {
            info!("refresh tick stopped");
        }
    }

    /// Check if the recurring tick is scheduled.
    pub fn is_ticking(&self) -> bool {
        self.inner
            .lock_tick()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the tick and remove every source.
    ///
    /// Refreshes still executing finish in the background; their results
    /// are discarded.
    pub fn reset(&self) {
        self.inner.stop_tick();
        self.inner.registry.clear();
        info!("scheduler reset");
    }

    /// Register an async closure as a source. See [`SourceRegistry::register`].
    pub fn register<F, Fut, T, E>(
        &self,
        name: impl Into<String>,
        procedure: F,
        options: RegisterOptions,
    ) -> SnapcacheResult<Arc<Source>>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Serialize + Send + Sync + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        self.inner.registry.register(name, procedure, options)
    }

    /// Register a [`RefreshProcedure`]. See [`SourceRegistry::register_procedure`].
    pub fn register_procedure<P: RefreshProcedure>(
        &self,
        name: impl Into<String>,
        procedure: P,
        options: RegisterOptions,
    ) -> SnapcacheResult<Arc<Source>> {
        self.inner
            .registry
            .register_procedure(name, procedure, options)
    }

    /// Refresh one source if it is cold or stale.
    pub async fn maybe_refresh(&self, name: &str) -> SnapcacheResult<RefreshOutcome> {
        let source = self.inner.registry.get(name)?;
        Ok(source
            .maybe_refresh(self.now_secs(), &self.inner.ctx)
            .await)
    }

    /// Refresh one source now, regardless of freshness.
    ///
    /// Unlike the scheduler-wide operations, a failure is returned to the
    /// caller (after being reported).
    pub async fn refresh(&self, name: &str) -> SnapcacheResult<Arc<Snapshot>> {
        let source = self.inner.registry.get(name)?;
        match source.refresh(self.now_secs(), &self.inner.ctx).await {
            RefreshOutcome::Refreshed(snapshot) => Ok(snapshot),
            RefreshOutcome::Failed(err) => Err(SnapcacheError::Refresh(err)),
            // A forced refresh never reports fresh; fall back to what is published.
            RefreshOutcome::Fresh => source
                .snapshot()
                .ok_or_else(|| SnapcacheError::not_found(name)),
        }
    }

    /// See [`SourceRegistry::get_data`].
    pub fn get_data<T: Any + Send + Sync>(&self, name: &str) -> SnapcacheResult<Option<Arc<T>>> {
        self.inner.registry.get_data(name)
    }

    /// See [`SourceRegistry::get_data_id`].
    pub fn get_data_id(&self, name: &str) -> SnapcacheResult<SnapshotIdentity> {
        self.inner.registry.get_data_id(name)
    }

    /// See [`SourceRegistry::snapshot`].
    pub fn snapshot(&self, name: &str) -> SnapcacheResult<Option<Arc<Snapshot>>> {
        self.inner.registry.snapshot(name)
    }

    /// See [`SourceRegistry::has_source`].
    pub fn has_source(&self, name: &str) -> bool {
        self.inner.registry.has_source(name)
    }

    /// See [`SourceRegistry::watch`].
    pub fn watch(&self, name: &str) -> SnapcacheResult<Watch> {
        self.inner.registry.watch(name)
    }
}

impl SchedulerInner {
    async fn check(&self) -> InitializeSummary {
        let now = self.clock.now_secs();
        let sources = self.registry.sources();
        let outcomes = join_all(
            sources
                .iter()
                .map(|source| source.maybe_refresh(now, &self.ctx)),
        )
        .await;

        let mut summary = InitializeSummary::default();
        for outcome in &outcomes {
            summary.record(outcome);
        }
        summary
    }

    fn lock_tick(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.tick.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Abort the tick task; returns whether one was scheduled.
    fn stop_tick(&self) -> bool {
        match self.lock_tick().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        self.stop_tick();
    }
}

async fn tick_loop(inner: Weak<SchedulerInner>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            debug!("scheduler dropped, refresh tick exiting");
            return;
        };
        inner.ctx.stats().record_tick();
        inner.registry.metrics().tick();
        let summary = inner.check().await;
        if summary.refreshed + summary.failed > 0 {
            debug!(%summary, "refresh tick");
        }
    }
}
