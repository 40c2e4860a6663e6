//! Sources: named refresh procedures and their current snapshot.
//!
//! A [`Source`] is Cold until its first successful refresh, Fresh while its
//! snapshot is within the refresh interval, and Stale afterwards. Whether a
//! refresh is currently executing is tracked separately by the in-flight
//! handle, which is checked and set under one lock so that concurrent
//! requests for the same source share a single execution.
//!
//! ## Important
//!
//! The in-flight lock is never held across an `.await`. Refreshes run on
//! their own tokio task, so they complete even if every caller waiting on
//! them is dropped. The task clears the in-flight slot however it ends,
//! including cancellation by runtime shutdown.

use std::any::{type_name, Any};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use snapcache_core::{
    BoxError, RefreshError, RefreshInterval, RefreshPhase, SnapshotIdentity, SourceName,
};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::metrics::RefreshMetrics;
use crate::reporter::ErrorReporter;
use crate::snapshot::{Snapshot, SnapshotData};
use crate::stats::RefreshStats;
use crate::watch::{SnapshotUpdate, WatchManager};

/// An asynchronous data-producing operation.
///
/// Closures are adapted with [`FnProcedure`]; implement this trait directly
/// for procedures that carry their own state, such as a client handle.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use snapcache_core::BoxError;
/// use snapcache_registry::RefreshProcedure;
///
/// #[derive(Debug)]
/// struct StaticRules(Vec<String>);
///
/// #[async_trait]
/// impl RefreshProcedure for StaticRules {
///     type Output = Vec<String>;
///
///     async fn refresh(&self) -> Result<Vec<String>, BoxError> {
///         Ok(self.0.clone())
///     }
/// }
/// ```
#[async_trait]
pub trait RefreshProcedure: Send + Sync + 'static {
    /// Data produced by a refresh.
    type Output: Serialize + Send + Sync + 'static;

    /// Produce a fresh value.
    async fn refresh(&self) -> Result<Self::Output, BoxError>;
}

/// Adapter turning an async closure into a [`RefreshProcedure`].
#[derive(Clone)]
pub struct FnProcedure<F>(F);

impl<F> FnProcedure<F> {
    /// Wrap a closure.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> fmt::Debug for FnProcedure<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FnProcedure").field(&type_name::<F>()).finish()
    }
}

#[async_trait]
impl<F, Fut, T, E> RefreshProcedure for FnProcedure<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Serialize + Send + Sync + 'static,
    E: Into<BoxError> + Send + 'static,
{
    type Output = T;

    async fn refresh(&self) -> Result<T, BoxError> {
        (self.0)().await.map_err(Into::into)
    }
}

/// Data produced by one successful procedure run.
struct Produced {
    data: SnapshotData,
    type_name: &'static str,
    identity: SnapshotIdentity,
}

/// Object-safe view of a [`RefreshProcedure`] with its output erased.
trait ErasedProcedure: Send + Sync {
    fn produce(&self) -> BoxFuture<'static, Result<Produced, (RefreshPhase, BoxError)>>;
    fn output_type(&self) -> &'static str;
}

struct Erased<P>(Arc<P>);

impl<P: RefreshProcedure> ErasedProcedure for Erased<P> {
    fn produce(&self) -> BoxFuture<'static, Result<Produced, (RefreshPhase, BoxError)>> {
        let procedure = Arc::clone(&self.0);
        async move {
            let value = procedure
                .refresh()
                .await
                .map_err(|e| (RefreshPhase::Procedure, e))?;
            let identity = SnapshotIdentity::compute(&value)
                .map_err(|e| (RefreshPhase::Identity, BoxError::from(e)))?;
            Ok::<_, (RefreshPhase, BoxError)>(Produced {
                data: Arc::new(value) as SnapshotData,
                type_name: type_name::<P::Output>(),
                identity,
            })
        }
        .boxed()
    }

    fn output_type(&self) -> &'static str {
        type_name::<P::Output>()
    }
}

/// Result of asking a source to refresh.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// The snapshot was within its interval; nothing ran.
    Fresh,
    /// A refresh published this snapshot.
    Refreshed(Arc<Snapshot>),
    /// The refresh failed; the previous snapshot (if any) is still current.
    Failed(Arc<RefreshError>),
}

impl RefreshOutcome {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Refreshed(_) => "refreshed",
            Self::Failed(_) => "failed",
        }
    }

    /// The published snapshot, if this outcome is [`RefreshOutcome::Refreshed`].
    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        match self {
            Self::Refreshed(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    /// Check if the refresh failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Collaborators a refresh reports to.
#[derive(Debug, Clone)]
pub struct RefreshContext {
    reporter: Arc<dyn ErrorReporter>,
    stats: Arc<RefreshStats>,
    watches: Arc<WatchManager>,
    metrics: RefreshMetrics,
}

impl RefreshContext {
    /// Create a context reporting to `reporter`.
    pub fn new(
        reporter: Arc<dyn ErrorReporter>,
        stats: Arc<RefreshStats>,
        watches: Arc<WatchManager>,
        metrics: RefreshMetrics,
    ) -> Self {
        Self {
            reporter,
            stats,
            watches,
            metrics,
        }
    }

    /// The error reporter.
    pub fn reporter(&self) -> &Arc<dyn ErrorReporter> {
        &self.reporter
    }

    /// Refresh statistics.
    pub fn stats(&self) -> &RefreshStats {
        &self.stats
    }
}

type InFlight = Shared<BoxFuture<'static, RefreshOutcome>>;

/// The executing refresh of a source, tagged with its sequence number.
struct Pending {
    seq: u64,
    outcome: InFlight,
}

/// A named, independently refreshed producer of snapshots.
pub struct Source {
    name: SourceName,
    procedure: Arc<dyn ErasedProcedure>,
    interval: RefreshInterval,
    /// Last successfully published snapshot.
    current: ArcSwapOption<Snapshot>,
    /// Set iff a refresh is executing.
    in_flight: Mutex<Option<Pending>>,
    next_seq: AtomicU64,
    /// Set once the source has been removed from its registry.
    detached: AtomicBool,
}

impl Source {
    /// Create a source from a procedure.
    pub fn new<P: RefreshProcedure>(
        name: SourceName,
        procedure: P,
        interval: RefreshInterval,
    ) -> Self {
        Self {
            name,
            procedure: Arc::new(Erased(Arc::new(procedure))),
            interval,
            current: ArcSwapOption::empty(),
            in_flight: Mutex::new(None),
            next_seq: AtomicU64::new(0),
            detached: AtomicBool::new(false),
        }
    }

    /// Get the source name.
    #[inline]
    pub fn name(&self) -> &SourceName {
        &self.name
    }

    /// Get the refresh interval.
    #[inline]
    pub fn interval(&self) -> RefreshInterval {
        self.interval
    }

    /// Type name of the data this source produces.
    #[inline]
    pub fn output_type(&self) -> &'static str {
        self.procedure.output_type()
    }

    /// Current snapshot, or `None` while cold.
    #[inline]
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.current.load_full()
    }

    /// Identity of the current snapshot; empty while cold.
    pub fn identity(&self) -> SnapshotIdentity {
        self.current
            .load_full()
            .map(|s| s.identity().clone())
            .unwrap_or_default()
    }

    /// Check whether a refresh is executing.
    pub fn is_refreshing(&self) -> bool {
        self.lock_in_flight().is_some()
    }

    /// Check whether the source is fresh at `now_secs`.
    pub fn is_fresh_at(&self, now_secs: u64) -> bool {
        self.current
            .load_full()
            .is_some_and(|s| s.is_fresh_at(now_secs))
    }

    /// Check whether this source has been dropped from its registry.
    #[inline]
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    pub(crate) fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }

    /// Refresh if cold or stale, otherwise return [`RefreshOutcome::Fresh`].
    ///
    /// A request made while a refresh is executing waits for that refresh
    /// instead of starting another one.
    pub async fn maybe_refresh(
        self: &Arc<Self>,
        now_secs: u64,
        ctx: &RefreshContext,
    ) -> RefreshOutcome {
        self.run(now_secs, ctx, false).await
    }

    /// Refresh regardless of freshness, joining any in-flight refresh.
    pub async fn refresh(
        self: &Arc<Self>,
        now_secs: u64,
        ctx: &RefreshContext,
    ) -> RefreshOutcome {
        self.run(now_secs, ctx, true).await
    }

    async fn run(
        self: &Arc<Self>,
        now_secs: u64,
        ctx: &RefreshContext,
        force: bool,
    ) -> RefreshOutcome {
        let (pending, start) = {
            let mut in_flight = self.lock_in_flight();
            if let Some(existing) = in_flight.as_ref() {
                ctx.stats.record_joined();
                ctx.metrics.refresh_joined(&self.name);
                trace!(source = %self.name, "joining in-flight refresh");
                (existing.outcome.clone(), None)
            } else if !force && self.is_fresh_at(now_secs) {
                ctx.stats.record_fresh_skip();
                trace!(source = %self.name, "snapshot fresh, skipping refresh");
                return RefreshOutcome::Fresh;
            } else {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = oneshot::channel();
                let outcome = awaited_outcome(self.name.clone(), rx);
                *in_flight = Some(Pending {
                    seq,
                    outcome: outcome.clone(),
                });
                (outcome, Some((seq, tx)))
            }
        };

        // Spawned only after the lock is released: a task dropped on a
        // closed runtime clears the slot from its guard.
        if let Some((seq, tx)) = start {
            self.spawn_refresh(seq, tx, now_secs, ctx.clone());
        }
        pending.await
    }

    fn spawn_refresh(
        self: &Arc<Self>,
        seq: u64,
        tx: oneshot::Sender<RefreshOutcome>,
        now_secs: u64,
        ctx: RefreshContext,
    ) {
        ctx.stats.record_started();
        debug!(source = %self.name, now_secs, seq, "starting refresh");

        let source = Arc::clone(self);
        let mut guard = InFlightGuard::new(Arc::clone(self), seq);
        let produce = self.procedure.produce();
        tokio::spawn(async move {
            let tracker = ctx.metrics.refresh_started(&source.name);
            let started = Instant::now();
            let result = match AssertUnwindSafe(produce).catch_unwind().await {
                Ok(Ok(produced)) => Ok(produced),
                Ok(Err((phase, err))) => Err(RefreshError::new(source.name.clone(), phase, err)),
                Err(panic) => Err(RefreshError::new(
                    source.name.clone(),
                    RefreshPhase::Panicked,
                    panic_message(panic.as_ref()),
                )),
            };
            let outcome = source.finish(result, now_secs, &ctx, &mut guard);
            debug!(
                source = %source.name,
                outcome = outcome.as_str(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "refresh finished"
            );
            tracker.finish(outcome.as_str());
            // Every caller may have gone away; the result is published regardless.
            let _ = tx.send(outcome);
        });
    }

    /// Publish or discard the result and clear the in-flight slot.
    fn finish(
        &self,
        result: Result<Produced, RefreshError>,
        now_secs: u64,
        ctx: &RefreshContext,
        guard: &mut InFlightGuard,
    ) -> RefreshOutcome {
        match result {
            Ok(produced) => {
                let snapshot = Arc::new(Snapshot::from_parts(
                    produced.data,
                    produced.type_name,
                    produced.identity,
                    now_secs,
                    self.interval,
                ));
                let previous = self
                    .current
                    .swap(Some(Arc::clone(&snapshot)))
                    .map(|s| s.identity().clone())
                    .unwrap_or_default();
                let changed = previous != *snapshot.identity();
                ctx.stats.record_succeeded(changed);
                guard.release();
                debug!(
                    source = %self.name,
                    identity = %snapshot.identity().short(),
                    changed,
                    "published snapshot"
                );

                if self.is_detached() {
                    warn!(source = %self.name, "refresh finished after source was removed, result ignored");
                } else if changed {
                    ctx.watches.notify(SnapshotUpdate {
                        source: self.name.clone(),
                        snapshot: Arc::clone(&snapshot),
                        previous,
                    });
                }
                RefreshOutcome::Refreshed(snapshot)
            }
            Err(err) => {
                ctx.stats.record_failed();
                guard.release();
                let reported = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    ctx.reporter.report(&self.name, err.phase(), &err)
                }));
                if reported.is_err() {
                    warn!(source = %self.name, "error reporter panicked");
                }
                RefreshOutcome::Failed(Arc::new(err))
            }
        }
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Option<Pending>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears a source's in-flight slot when its refresh ends, however it ends.
///
/// Lives inside the refresh task, so cancellation (runtime shutdown) and
/// unwinding release the slot as well. Only the slot of this refresh is
/// cleared.
struct InFlightGuard {
    source: Arc<Source>,
    seq: u64,
    released: bool,
}

impl InFlightGuard {
    fn new(source: Arc<Source>, seq: u64) -> Self {
        Self {
            source,
            seq,
            released: false,
        }
    }

    fn release(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }
        let mut in_flight = self.source.lock_in_flight();
        if in_flight.as_ref().is_some_and(|p| p.seq == self.seq) {
            *in_flight = None;
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.released {
            warn!(source = %self.source.name, seq = self.seq, "refresh task ended without an outcome");
            self.release();
        }
    }
}

/// Outcome future shared by every caller of one refresh.
fn awaited_outcome(name: SourceName, rx: oneshot::Receiver<RefreshOutcome>) -> InFlight {
    rx.map(move |received| {
        received.unwrap_or_else(|_| {
            RefreshOutcome::Failed(Arc::new(RefreshError::new(
                name,
                RefreshPhase::Cancelled,
                "refresh task ended before producing an outcome",
            )))
        })
    })
    .boxed()
    .shared()
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("output_type", &self.output_type())
            .field("identity", &self.identity().short().to_string())
            .field("refreshing", &self.is_refreshing())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    format!("refresh procedure panicked: {message}")
}
