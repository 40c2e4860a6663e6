//! # snapcache
//!
//! Named, periodically refreshed, immutable data snapshots.
//!
//! Register an async procedure under a name with a refresh interval; the
//! scheduler keeps the latest result as a content-identified snapshot, and
//! readers get it back without blocking on the procedure:
//!
//! ```rust
//! use snapcache::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> SnapcacheResult<()> {
//! let scheduler = RefreshScheduler::new();
//! scheduler.register(
//!     "acl",
//!     || async { Ok::<_, BoxError>(vec!["allow 10.0.0.0/8"]) },
//!     RegisterOptions::every(30),
//! )?;
//!
//! scheduler.initialize_all().await;
//! let rules = scheduler.get_data::<Vec<&str>>("acl")?;
//! assert!(rules.is_some());
//! scheduler.reset();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - `snapcache-core` - identities, names, intervals, clock and errors
//! - `snapcache-registry` - sources, registry, scheduler, watches
//!
//! This crate re-exports both, and adds a process-wide scheduler in
//! [`global`] for applications that want one shared instance.
//!
//! ## Design Principles
//!
//! 1. **No panics in library code** - All errors are returned as `Result`
//! 2. **No locks held across await points** - Uses DashMap and careful design
//! 3. **Immutable snapshots** - Data is shared as `Arc<T>`, never mutated
//! 4. **Observable** - Built-in metrics and tracing support

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod global;

pub use snapcache_core as core;
pub use snapcache_registry as registry;

/// Prelude module for convenient imports.
///
/// ```rust
/// use snapcache::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use snapcache_core::{
        BoxError, Clock, ManualClock, RefreshError, RefreshInterval, RefreshPhase,
        SnapcacheError, SnapcacheResult, SnapshotIdentity, SourceName, SystemClock,
    };

    // Registry types
    pub use snapcache_registry::{
        ErrorReporter, InitializeSummary, RefreshOutcome, RefreshProcedure, RefreshScheduler,
        RegisterOptions, SchedulerConfig, Snapshot, SnapshotUpdate, Source, SourceRegistry,
        Watch,
    };
}

/// Version information for this crate.
pub mod version {
    /// Crate version.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Minimum supported Rust version.
    pub const MSRV: &str = "1.75";

    /// Get version info as a string.
    pub fn version_string() -> String {
        format!("snapcache {} (MSRV {})", VERSION, MSRV)
    }
}
