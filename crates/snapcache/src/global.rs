//! Process-wide scheduler.
//!
//! Libraries should take a [`RefreshScheduler`] or [`SourceRegistry`]
//! explicitly. Applications that want a single shared instance can use the
//! functions here instead; the scheduler is created with default settings on
//! first use and lives for the rest of the process.
//!
//! [`SourceRegistry`]: snapcache_registry::SourceRegistry
//!
//! ```rust
//! use snapcache::global;
//! use snapcache::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> SnapcacheResult<()> {
//! global::register(
//!     "doc-example",
//!     || async { Ok::<_, BoxError>(42u32) },
//!     RegisterOptions::default(),
//! )?;
//! global::scheduler().maybe_refresh("doc-example").await?;
//! assert_eq!(*global::get_data::<u32>("doc-example")?.unwrap(), 42);
//!
//! global::reset();
//! assert!(!global::has_source("doc-example"));
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use snapcache_core::{BoxError, SnapcacheResult, SnapshotIdentity};
use snapcache_registry::{InitializeSummary, RefreshScheduler, RegisterOptions, Source};

static SCHEDULER: OnceLock<RefreshScheduler> = OnceLock::new();

/// The process-wide scheduler, created on first use.
pub fn scheduler() -> &'static RefreshScheduler {
    SCHEDULER.get_or_init(RefreshScheduler::new)
}

/// Register a source with the process-wide scheduler.
pub fn register<F, Fut, T, E>(
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
    scheduler().register(name, procedure, options)
}

/// Refresh every source once and start the tick.
pub async fn initialize_all() -> InitializeSummary {
    scheduler().initialize_all().await
}

/// Current data of a source as `T`; `None` while cold.
pub fn get_data<T: Any + Send + Sync>(name: &str) -> SnapcacheResult<Option<Arc<T>>> {
    scheduler().get_data(name)
}

/// Identity of a source's current snapshot; empty while cold.
pub fn get_data_id(name: &str) -> SnapcacheResult<SnapshotIdentity> {
    scheduler().get_data_id(name)
}

/// Check if a source is registered.
pub fn has_source(name: &str) -> bool {
    scheduler().has_source(name)
}

/// Stop the tick and remove every source.
///
/// Intended for tests that share the process-wide instance.
pub fn reset() {
    if let Some(scheduler) = SCHEDULER.get() {
        scheduler.reset();
    }
}
