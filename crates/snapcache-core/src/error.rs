//! Error types for snapcache operations.
//!
//! This module provides [`SnapcacheError`], the error type returned by
//! registration and lookup operations, and [`RefreshError`], which wraps a
//! failed refresh of a single source.
//!
//! Registration errors are fail-fast and always surface to the caller.
//! Refresh errors are fail-soft: the scheduler reports and absorbs them, so
//! they only reach callers that explicitly ask for a single source's outcome.

use std::fmt;
use std::sync::Arc;

use crate::SourceName;

/// Boxed error produced by a refresh procedure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for snapcache operations.
///
/// # Example
///
/// ```rust
/// use snapcache_core::{SnapcacheError, SourceName};
///
/// let err = SourceName::new("").unwrap_err();
/// assert!(matches!(err, SnapcacheError::Configuration(_)));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum SnapcacheError {
    /// Invalid registration input (name, interval or options).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A source with this name is already registered.
    #[error("source already registered: {name}")]
    DuplicateName {
        /// The conflicting source name.
        name: String,
    },

    /// No source with this name is registered.
    #[error("source not found: {name}")]
    NotFound {
        /// The requested source name.
        name: String,
    },

    /// Snapshot data was requested as a different type than the source produces.
    #[error("type mismatch for source {name}: snapshot data is not {expected}")]
    TypeMismatch {
        /// The source name.
        name: String,
        /// The requested type name.
        expected: &'static str,
    },

    /// A value could not be brought into canonical form for hashing.
    #[error("cannot compute snapshot identity: {reason}")]
    Identity {
        /// Why serialization failed.
        reason: String,
    },

    /// A refresh of a single source failed.
    #[error(transparent)]
    Refresh(Arc<RefreshError>),

    /// Watch subscription was closed.
    #[error("watch closed: watch_id={watch_id}")]
    WatchClosed {
        /// ID of the closed watch.
        watch_id: u64,
    },
}

impl SnapcacheError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a lookup error for an unknown source.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Returns `true` for errors raised while registering a source.
    pub fn is_registration_error(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::DuplicateName { .. })
    }
}

/// Stage of a refresh at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshPhase {
    /// The refresh procedure returned an error.
    Procedure,
    /// The produced value could not be hashed into an identity.
    Identity,
    /// The refresh procedure panicked.
    Panicked,
    /// The refresh task was dropped before finishing, e.g. by runtime shutdown.
    Cancelled,
}

impl RefreshPhase {
    /// Stable lowercase label, used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Procedure => "procedure",
            Self::Identity => "identity",
            Self::Panicked => "panicked",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RefreshPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed refresh of one source.
#[derive(Debug, thiserror::Error)]
#[error("refresh of {source_name} failed during {phase}: {source}")]
pub struct RefreshError {
    source_name: SourceName,
    phase: RefreshPhase,
    #[source]
    source: BoxError,
}

impl RefreshError {
    /// Wrap an underlying failure.
    pub fn new(source_name: SourceName, phase: RefreshPhase, source: impl Into<BoxError>) -> Self {
        Self {
            source_name,
            phase,
            source: source.into(),
        }
    }

    /// Name of the source whose refresh failed.
    #[inline]
    pub fn source_name(&self) -> &SourceName {
        &self.source_name
    }

    /// Phase in which the refresh failed.
    #[inline]
    pub fn phase(&self) -> RefreshPhase {
        self.phase
    }

    /// The underlying error.
    #[inline]
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.source.as_ref()
    }
}
