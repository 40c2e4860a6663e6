//! Content-derived snapshot identities.
//!
//! This module provides [`SnapshotIdentity`], a digest of a value's canonical
//! serialized form. Identities let consumers detect whether a refresh changed
//! anything without comparing the data itself.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::SnapcacheError;

/// Stable, content-based identifier for snapshot data.
///
/// The identity is the SHA-256 digest of the value's canonical JSON form,
/// rendered as 64 lowercase hex characters. The canonical form sorts object
/// keys, so two values that serialize to the same JSON document always have
/// the same identity regardless of map iteration order.
///
/// An empty identity represents "no snapshot yet".
///
/// # Example
///
/// ```rust
/// use snapcache_core::SnapshotIdentity;
/// use std::collections::HashMap;
///
/// let mut a = HashMap::new();
/// a.insert("x", 1);
/// a.insert("y", 2);
/// let b: HashMap<_, _> = [("y", 2), ("x", 1)].into_iter().collect();
///
/// assert_eq!(
///     SnapshotIdentity::compute(&a).unwrap(),
///     SnapshotIdentity::compute(&b).unwrap(),
/// );
/// assert!(SnapshotIdentity::empty().is_empty());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SnapshotIdentity(String);

impl SnapshotIdentity {
    /// Length of a computed identity in hex characters.
    pub const LEN: usize = 64;

    /// Compute the identity of a value.
    ///
    /// Absent or empty values (`None`, `()`, empty collections) hash to a
    /// well-defined identity. Fails only when the value has no JSON
    /// representation, e.g. a map keyed by a non-string type.
    pub fn compute<T: Serialize + ?Sized>(value: &T) -> Result<Self, SnapcacheError> {
        let canonical = serde_json::to_value(value).map_err(|e| SnapcacheError::Identity {
            reason: e.to_string(),
        })?;
        let bytes = serde_json::to_vec(&canonical).map_err(|e| SnapcacheError::Identity {
            reason: e.to_string(),
        })?;
        Ok(Self::from_bytes(&bytes))
    }

    /// Compute the identity of raw, already-canonical bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut hex = String::with_capacity(Self::LEN);
        for byte in digest.iter() {
            hex.push(char::from(HEX[usize::from(byte >> 4)]));
            hex.push(char::from(HEX[usize::from(byte & 0x0f)]));
        }
        Self(hex)
    }

    /// The placeholder identity for a source without a snapshot.
    #[must_use]
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Check if this is the placeholder identity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines.
    #[must_use]
    pub fn short(&self) -> &str {
        // Identities built with `From<String>` need not be hex.
        self.0
            .char_indices()
            .nth(12)
            .map_or(self.0.as_str(), |(end, _)| &self.0[..end])
    }

    /// Consume and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

const HEX: &[u8; 16] = b"0123456789abcdef";

impl fmt::Display for SnapshotIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SnapshotIdentity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<SnapshotIdentity> for String {
    fn from(id: SnapshotIdentity) -> Self {
        id.0
    }
}

impl AsRef<str> for SnapshotIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
