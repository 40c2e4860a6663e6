//! # snapcache-registry
//!
//! Registry and refresh scheduler for named snapshots.
//!
//! A *source* pairs a name with an async refresh procedure and a refresh
//! interval. The latest result of the procedure is published as an
//! immutable [`Snapshot`], identified by a content digest.
//!
//! - [`SourceRegistry`] - DashMap-based name to source mapping
//! - [`Source`] - one named source with its current snapshot
//! - [`RefreshScheduler`] - initialization and the recurring freshness tick
//! - [`Watch`] - subscription to snapshot changes of a source
//!
//! ## Key Design Decisions
//!
//! - Snapshots are replaced atomically; readers never observe partial state
//! - Concurrent refreshes of one source share a single execution
//! - A failed refresh keeps the previous snapshot and is reported once
//! - All `DashMap` references are dropped before any `.await`
//!
//! ## Example
//!
//! ```rust
//! use snapcache_registry::{RefreshScheduler, RegisterOptions};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler = RefreshScheduler::new();
//! scheduler.register(
//!     "feature-flags",
//!     || async { Ok::<_, std::io::Error>(vec![("dark-mode", true)]) },
//!     RegisterOptions::every(60),
//! )?;
//!
//! scheduler.initialize_all().await;
//! let id = scheduler.get_data_id("feature-flags")?;
//! assert_eq!(id.as_str().len(), 64);
//! scheduler.reset();
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod config;
mod metrics;
mod registry;
mod reporter;
mod scheduler;
mod snapshot;
mod source;
mod stats;
mod watch;

pub use builder::SchedulerBuilder;
pub use config::{RegisterOptions, SchedulerConfig};
pub use metrics::{RefreshMetrics, RefreshTracker};
pub use registry::SourceRegistry;
pub use reporter::{ErrorReporter, MemoryReporter, ReportedFailure, TracingReporter};
pub use scheduler::{InitializeSummary, RefreshScheduler};
pub use snapshot::{Snapshot, SnapshotBuilder};
pub use source::{FnProcedure, RefreshContext, RefreshOutcome, RefreshProcedure, Source};
pub use stats::RefreshStats;
pub use watch::{SnapshotUpdate, Watch, WatchId, WatchManager};

pub use snapcache_core::{
    BoxError, Clock, ManualClock, RefreshError, RefreshInterval, RefreshPhase, SnapcacheError,
    SnapcacheResult, SnapshotIdentity, SourceName, SystemClock,
};
