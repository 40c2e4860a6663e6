//! Snapshot: immutable result of one successful refresh.
//!
//! A snapshot pairs the produced data with its content identity and the
//! time it was taken. Snapshots are:
//!
//! - **Immutable**: data is only reachable through `Arc<T>` / `&T`
//! - **Identified**: each carries a [`SnapshotIdentity`] of its data
//! - **Timestamped**: `created_at_secs` orders snapshots of one source
//!
//! Mutating snapshot data does not compile:
//!
//! ```rust,compile_fail
//! use snapcache_registry::Snapshot;
//! use std::sync::Arc;
//!
//! let snapshot = Snapshot::builder().data(vec![1u32, 2, 3]).build().unwrap();
//! let data: Arc<Vec<u32>> = snapshot.data::<Vec<u32>>().unwrap();
//! data.push(4); // cannot borrow data in an `Arc` as mutable
//! ```

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use snapcache_core::{RefreshInterval, SnapcacheResult, SnapshotIdentity};

/// Type-erased snapshot payload.
pub(crate) type SnapshotData = Arc<dyn Any + Send + Sync>;

/// An immutable snapshot of a source's data.
#[derive(Clone)]
pub struct Snapshot {
    /// Produced data.
    data: SnapshotData,
    /// Type name of the data, for diagnostics.
    type_name: &'static str,
    /// Content identity of the data.
    identity: SnapshotIdentity,
    /// Clock reading when the refresh that produced this snapshot started.
    created_at_secs: u64,
    /// Refresh interval of the owning source.
    interval: RefreshInterval,
}

impl Snapshot {
    /// Create a new snapshot builder.
    pub fn builder() -> SnapshotBuilder<()> {
        SnapshotBuilder::new()
    }

    pub(crate) fn from_parts(
        data: SnapshotData,
        type_name: &'static str,
        identity: SnapshotIdentity,
        created_at_secs: u64,
        interval: RefreshInterval,
    ) -> Self {
        Self {
            data,
            type_name,
            identity,
            created_at_secs,
            interval,
        }
    }

    /// Get the data as `T`.
    ///
    /// Returns `None` if the snapshot holds a different type.
    pub fn data<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.data).downcast::<T>().ok()
    }

    /// Borrow the data as `T`.
    #[inline]
    pub fn data_ref<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    /// Check whether the data is a `T`.
    #[inline]
    pub fn is<T: Any>(&self) -> bool {
        self.data.is::<T>()
    }

    /// Type name of the stored data.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Get the content identity.
    #[inline]
    pub fn identity(&self) -> &SnapshotIdentity {
        &self.identity
    }

    /// Get the creation time in clock seconds.
    #[inline]
    pub fn created_at_secs(&self) -> u64 {
        self.created_at_secs
    }

    /// Get the refresh interval of the owning source.
    #[inline]
    pub fn interval(&self) -> RefreshInterval {
        self.interval
    }

    /// Whether this snapshot is still within its interval at `now_secs`.
    #[inline]
    pub fn is_fresh_at(&self, now_secs: u64) -> bool {
        self.interval.is_fresh(self.created_at_secs, now_secs)
    }

    /// Seconds elapsed since creation at `now_secs`.
    #[inline]
    pub fn age_secs(&self, now_secs: u64) -> u64 {
        now_secs.saturating_sub(self.created_at_secs)
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("type_name", &self.type_name)
            .field("identity", &self.identity.short())
            .field("created_at_secs", &self.created_at_secs)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Builder for creating snapshots outside a refresh, e.g. for seeding or tests.
#[derive(Debug)]
pub struct SnapshotBuilder<T> {
    data: T,
    created_at_secs: u64,
    interval: RefreshInterval,
}

impl SnapshotBuilder<()> {
    /// Create a new snapshot builder holding `()`.
    pub fn new() -> Self {
        Self {
            data: (),
            created_at_secs: 0,
            interval: RefreshInterval::ALWAYS,
        }
    }
}

impl Default for SnapshotBuilder<()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SnapshotBuilder<T> {
    /// Set the snapshot data.
    pub fn data<U>(self, data: U) -> SnapshotBuilder<U> {
        SnapshotBuilder {
            data,
            created_at_secs: self.created_at_secs,
            interval: self.interval,
        }
    }

    /// Set the creation time in clock seconds.
    pub fn created_at(mut self, secs: u64) -> Self {
        self.created_at_secs = secs;
        self
    }

    /// Set the refresh interval.
    pub fn interval(mut self, interval: RefreshInterval) -> Self {
        self.interval = interval;
        self
    }
}

impl<T: Serialize + Send + Sync + 'static> SnapshotBuilder<T> {
    /// Build the snapshot, computing the identity of its data.
    pub fn build(self) -> SnapcacheResult<Snapshot> {
        let identity = SnapshotIdentity::compute(&self.data)?;
        Ok(Snapshot::from_parts(
            Arc::new(self.data),
            type_name::<T>(),
            identity,
            self.created_at_secs,
            self.interval,
        ))
    }
}
