//! Watch system for snapshot change notifications.
//!
//! The watch system provides:
//! - Unique watch identifiers ([`WatchId`])
//! - Watch subscriptions ([`Watch`]) receiving [`SnapshotUpdate`]s
//! - Watch management ([`WatchManager`]) keyed by source name
//!
//! Updates are only sent when a refresh publishes a snapshot whose identity
//! differs from the one it replaces.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use snapcache_core::{SnapcacheError, SnapcacheResult, SnapshotIdentity, SourceName};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::Snapshot;

/// Unique identifier for a watch subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

impl WatchId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric value of this watch ID.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "watch-{}", self.0)
    }
}

/// A published change to a source's snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotUpdate {
    /// Source that changed.
    pub source: SourceName,
    /// The newly published snapshot.
    pub snapshot: Arc<Snapshot>,
    /// Identity of the replaced snapshot; empty if the source was cold.
    pub previous: SnapshotIdentity,
}

/// A watch subscription for one source.
#[derive(Debug)]
pub struct Watch {
    id: WatchId,
    source: SourceName,
    receiver: mpsc::Receiver<SnapshotUpdate>,
}

impl Watch {
    /// Get the unique identifier for this watch.
    #[inline]
    pub fn id(&self) -> WatchId {
        self.id
    }

    /// Get the source this watch is subscribed to.
    #[inline]
    pub fn source(&self) -> &SourceName {
        &self.source
    }

    /// Receive the next update.
    ///
    /// Returns `None` if the watch has been cancelled or the registry reset.
    pub async fn recv(&mut self) -> Option<SnapshotUpdate> {
        self.receiver.recv().await
    }

    /// Try to receive an update without waiting.
    pub fn try_recv(&mut self) -> Result<SnapshotUpdate, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }
}

#[derive(Debug, Clone)]
struct WatchSender {
    id: WatchId,
    sender: mpsc::Sender<SnapshotUpdate>,
}

impl WatchSender {
    /// Send without blocking; a full channel drops the update.
    fn try_send(&self, update: SnapshotUpdate) -> SnapcacheResult<()> {
        match self.sender.try_send(update) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                trace!(watch_id = %self.id, "watch channel full, skipping update");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SnapcacheError::WatchClosed {
                watch_id: self.id.0,
            }),
        }
    }
}

/// Manager for watch subscriptions.
///
/// Uses a `Mutex` internally; it is never held across I/O or `.await`.
#[derive(Debug)]
pub struct WatchManager {
    watches: Mutex<HashMap<SourceName, Vec<WatchSender>>>,
    channel_buffer: usize,
}

impl Default for WatchManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchManager {
    /// Create a new watch manager with default settings.
    pub fn new() -> Self {
        Self::with_buffer_size(16)
    }

    /// Create a new watch manager with a custom channel buffer size.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            watches: Mutex::new(HashMap::new()),
            channel_buffer: buffer_size.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SourceName, Vec<WatchSender>>> {
        self.watches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a new watch for a source.
    pub fn create_watch(&self, source: SourceName) -> Watch {
        let id = WatchId::next();
        let (sender, receiver) = mpsc::channel(self.channel_buffer);

        self.lock()
            .entry(source.clone())
            .or_default()
            .push(WatchSender { id, sender });

        debug!(watch_id = %id, source = %source, "created watch");

        Watch {
            id,
            source,
            receiver,
        }
    }

    /// Cancel a watch subscription.
    pub fn cancel_watch(&self, watch_id: WatchId) {
        let mut watches = self.lock();

        for senders in watches.values_mut() {
            if let Some(pos) = senders.iter().position(|s| s.id == watch_id) {
                senders.swap_remove(pos);
                debug!(watch_id = %watch_id, "cancelled watch");
                return;
            }
        }

        warn!(watch_id = %watch_id, "attempted to cancel unknown watch");
    }

    /// Notify all watches of a source. Closed watches are removed.
    pub fn notify(&self, update: SnapshotUpdate) {
        let senders: Vec<WatchSender> = self
            .lock()
            .get(&update.source)
            .cloned()
            .unwrap_or_default();

        if senders.is_empty() {
            return;
        }

        let mut closed_ids = Vec::new();
        for sender in &senders {
            if let Err(SnapcacheError::WatchClosed { watch_id }) = sender.try_send(update.clone())
            {
                closed_ids.push(WatchId(watch_id));
            }
        }

        if !closed_ids.is_empty() {
            if let Some(senders) = self.lock().get_mut(&update.source) {
                senders.retain(|s| !closed_ids.contains(&s.id));
            }
            debug!(count = closed_ids.len(), "removed closed watches");
        }

        trace!(
            source = %update.source,
            identity = %update.snapshot.identity().short(),
            watch_count = senders.len() - closed_ids.len(),
            "notified watches of snapshot update"
        );
    }

    /// Drop every subscription; their receivers observe end-of-stream.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Get the number of active watches for a source.
    pub fn watch_count(&self, source: &str) -> usize {
        self.lock().get(source).map(Vec::len).unwrap_or(0)
    }

    /// Get the total number of active watches across all sources.
    pub fn total_watch_count(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }
}
