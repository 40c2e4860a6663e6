//! # snapcache-core
//!
//! Core types and error handling shared by the snapcache crates.
//!
//! - [`SnapcacheError`] - Error type for registration and lookup
//! - [`RefreshError`] - A failed refresh of one source
//! - [`SnapshotIdentity`] - Content-derived identity of snapshot data
//! - [`SourceName`] - Validated source name
//! - [`RefreshInterval`] - Per-source freshness window
//! - [`Clock`] - Time source used by freshness checks
//!
//! ## Example
//!
//! ```rust
//! use snapcache_core::{RefreshInterval, SnapshotIdentity, SourceName};
//!
//! let name = SourceName::new("acl").unwrap();
//! let interval = RefreshInterval::from_secs(10);
//! let identity = SnapshotIdentity::compute(&vec!["allow *"]).unwrap();
//!
//! assert_eq!(name.as_str(), "acl");
//! assert!(interval.is_fresh(0, 9));
//! assert!(!identity.is_empty());
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod error;
mod identity;
mod interval;
mod name;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{BoxError, RefreshError, RefreshPhase, SnapcacheError};
pub use identity::SnapshotIdentity;
pub use interval::RefreshInterval;
pub use name::SourceName;

/// Result type alias using [`SnapcacheError`].
pub type SnapcacheResult<T> = std::result::Result<T, SnapcacheError>;
