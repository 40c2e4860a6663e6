//! Source registry: name → source mapping.
//!
//! The [`SourceRegistry`] uses `DashMap` for concurrent access. It is an
//! ordinary value: construct one, share it behind an `Arc`, and hand it to a
//! [`RefreshScheduler`](crate::RefreshScheduler) and to any reader.
//!
//! ## Important
//!
//! `DashMap` references are never held across an `.await`; lookups clone
//! the `Arc<Source>` and drop the shard guard immediately.

use std::any::{type_name, Any};
use std::future::Future;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use snapcache_core::{
    BoxError, SnapcacheError, SnapcacheResult, SnapshotIdentity, SourceName,
};
use tracing::{debug, info};

use crate::config::RegisterOptions;
use crate::metrics::RefreshMetrics;
use crate::snapshot::Snapshot;
use crate::source::{FnProcedure, RefreshProcedure, Source};
use crate::stats::RefreshStats;
use crate::watch::{Watch, WatchManager};

/// Registry of named sources.
///
/// # Example
///
/// ```rust
/// use snapcache_registry::{RegisterOptions, SourceRegistry};
///
/// let registry = SourceRegistry::new();
/// registry
///     .register("acl", || async { Ok::<_, std::io::Error>(vec!["allow *"]) }, RegisterOptions::every(10))
///     .unwrap();
///
/// assert!(registry.has_source("acl"));
/// // Nothing runs at registration time.
/// assert!(registry.get_data_id("acl").unwrap().is_empty());
/// ```
#[derive(Debug)]
pub struct SourceRegistry {
    sources: DashMap<SourceName, Arc<Source>>,
    watches: Arc<WatchManager>,
    stats: Arc<RefreshStats>,
    metrics: RefreshMetrics,
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceRegistry {
    /// Create an empty registry with default settings.
    pub fn new() -> Self {
        Self::with_watch_buffer(16)
    }

    /// Create an empty registry whose watches buffer `size` updates.
    pub fn with_watch_buffer(size: usize) -> Self {
        Self {
            sources: DashMap::new(),
            watches: Arc::new(WatchManager::with_buffer_size(size)),
            stats: Arc::new(RefreshStats::new()),
            metrics: RefreshMetrics::new(),
        }
    }

    /// Register an async closure as a source.
    ///
    /// Fails with [`SnapcacheError::Configuration`] for an invalid name and
    /// [`SnapcacheError::DuplicateName`] if the name is taken. No refresh is
    /// performed.
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
        self.register_procedure(name, FnProcedure::new(procedure), options)
    }

    /// Register a [`RefreshProcedure`] implementation as a source.
    pub fn register_procedure<P: RefreshProcedure>(
        &self,
        name: impl Into<String>,
        procedure: P,
        options: RegisterOptions,
    ) -> SnapcacheResult<Arc<Source>> {
        let name = SourceName::new(name)?;
        let source = Arc::new(Source::new(
            name.clone(),
            procedure,
            options.refresh_interval,
        ));

        // The entry guard locks its shard; it must be gone before `len()`.
        match self.sources.entry(name) {
            Entry::Occupied(entry) => {
                return Err(SnapcacheError::DuplicateName {
                    name: entry.key().to_string(),
                })
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&source));
            }
        }

        self.metrics.sources_registered(self.sources.len());
        debug!(
            source = %source.name(),
            interval = %source.interval(),
            output = source.output_type(),
            "registered source"
        );
        Ok(source)
    }

    /// Get a source by name.
    pub fn get(&self, name: &str) -> SnapcacheResult<Arc<Source>> {
        self.sources
            .get(name)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| SnapcacheError::not_found(name))
    }

    /// Check if a source is registered.
    pub fn has_source(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Current snapshot of a source; `None` while cold.
    pub fn snapshot(&self, name: &str) -> SnapcacheResult<Option<Arc<Snapshot>>> {
        Ok(self.get(name)?.snapshot())
    }

    /// Current data of a source as `T`; `None` while cold.
    ///
    /// Fails with [`SnapcacheError::TypeMismatch`] if the source produces a
    /// different type.
    pub fn get_data<T: Any + Send + Sync>(&self, name: &str) -> SnapcacheResult<Option<Arc<T>>> {
        match self.snapshot(name)? {
            None => Ok(None),
            Some(snapshot) => snapshot
                .data::<T>()
                .map(Some)
                .ok_or_else(|| SnapcacheError::TypeMismatch {
                    name: name.to_string(),
                    expected: type_name::<T>(),
                }),
        }
    }

    /// Identity of a source's current snapshot; empty while cold.
    pub fn get_data_id(&self, name: &str) -> SnapcacheResult<SnapshotIdentity> {
        Ok(self.get(name)?.identity())
    }

    /// Subscribe to snapshot changes of a registered source.
    pub fn watch(&self, name: &str) -> SnapcacheResult<Watch> {
        let source = self.get(name)?;
        Ok(self.watches.create_watch(source.name().clone()))
    }

    /// Names of all registered sources, sorted.
    pub fn names(&self) -> Vec<SourceName> {
        let mut names: Vec<_> = self.sources.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// All registered sources.
    pub fn sources(&self) -> Vec<Arc<Source>> {
        self.sources.iter().map(|r| Arc::clone(r.value())).collect()
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Check if no source is registered.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Remove every source and close every watch.
    ///
    /// Refreshes still executing run to completion against the removed
    /// sources; their results are never visible through this registry.
    pub fn clear(&self) {
        // One pass: every removed source is detached, and a source registered
        // concurrently is either removed here or stays registered.
        let mut removed = 0usize;
        self.sources.retain(|_, source| {
            source.detach();
            removed += 1;
            false
        });
        self.watches.clear();
        self.metrics.sources_registered(self.sources.len());
        info!(removed, "cleared source registry");
    }

    /// Refresh statistics.
    #[inline]
    pub fn stats(&self) -> &RefreshStats {
        &self.stats
    }

    /// Watch manager.
    #[inline]
    pub fn watches(&self) -> &WatchManager {
        &self.watches
    }

    pub(crate) fn stats_handle(&self) -> Arc<RefreshStats> {
        Arc::clone(&self.stats)
    }

    pub(crate) fn watches_handle(&self) -> Arc<WatchManager> {
        Arc::clone(&self.watches)
    }

    pub(crate) fn metrics(&self) -> &RefreshMetrics {
        &self.metrics
    }
}
