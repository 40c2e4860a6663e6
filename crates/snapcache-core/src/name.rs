//! Validated source names.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use crate::error::SnapcacheError;

/// Name of a registered source.
///
/// Names are non-empty, at most [`SourceName::MAX_LEN`] bytes, and made of
/// ASCII alphanumerics plus `_`, `-`, `.`, `:` and `/`.
///
/// # Example
///
/// ```rust
/// use snapcache_core::SourceName;
///
/// let name = SourceName::new("acl.rules").unwrap();
/// assert_eq!(name.as_str(), "acl.rules");
/// assert!(SourceName::new("has space").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceName(String);

impl SourceName {
    /// Maximum name length in bytes.
    pub const MAX_LEN: usize = 128;

    /// Validate and wrap a source name.
    pub fn new(name: impl Into<String>) -> Result<Self, SnapcacheError> {
        let name = name.into();
        if name.is_empty() {
            return Err(SnapcacheError::configuration("source name cannot be empty"));
        }
        if let Some(bad) = name.chars().find(|c| !is_name_char(*c)) {
            return Err(SnapcacheError::configuration(format!(
                "source name {name:?} contains invalid character {bad:?}"
            )));
        }
        if name.len() > Self::MAX_LEN {
            return Err(SnapcacheError::configuration(format!(
                "source name exceeds {} bytes: {}...",
                Self::MAX_LEN,
                &name[..32]
            )));
        }
        Ok(Self(name))
    }

    /// Get the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '/')
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SourceName {
    type Err = SnapcacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for SourceName {
    type Error = SnapcacheError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl TryFrom<String> for SourceName {
    type Error = SnapcacheError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl AsRef<str> for SourceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SourceName {
    fn borrow(&self) -> &str {
        &self.0
    }
}
