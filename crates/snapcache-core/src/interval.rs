//! Per-source refresh intervals.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::SnapcacheError;

/// How long a snapshot stays fresh, in whole seconds.
///
/// An interval of zero makes a source eligible for refresh on every
/// scheduling check.
///
/// Intervals read from text or configuration files must be non-negative
/// integers; both `10` and `"10"` are accepted when deserializing.
///
/// # Example
///
/// ```rust
/// use snapcache_core::RefreshInterval;
///
/// let interval = RefreshInterval::parse("30").unwrap();
/// assert_eq!(interval.as_secs(), 30);
/// assert!(!interval.is_fresh(100, 130));
/// assert!(interval.is_fresh(100, 129));
/// assert!(RefreshInterval::parse("-1").is_err());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefreshInterval(u64);

impl RefreshInterval {
    /// Zero interval: always eligible.
    pub const ALWAYS: Self = Self(0);

    /// Create an interval from seconds.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Parse a textual interval.
    pub fn parse(input: &str) -> Result<Self, SnapcacheError> {
        let trimmed = input.trim();
        trimmed.parse::<u64>().map(Self).map_err(|_| {
            SnapcacheError::configuration(format!(
                "refresh interval must be a non-negative integer number of seconds, got {input:?}"
            ))
        })
    }

    /// Interval length in seconds.
    #[inline]
    #[must_use]
    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// Interval as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }

    /// Whether a snapshot created at `created_at_secs` is still fresh at `now_secs`.
    ///
    /// A clock that moved backwards counts as zero elapsed time.
    #[inline]
    #[must_use]
    pub fn is_fresh(&self, created_at_secs: u64, now_secs: u64) -> bool {
        now_secs.saturating_sub(created_at_secs) < self.0
    }
}

impl fmt::Display for RefreshInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

impl FromStr for RefreshInterval {
    type Err = SnapcacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<u64> for RefreshInterval {
    fn from(secs: u64) -> Self {
        Self(secs)
    }
}

impl TryFrom<i64> for RefreshInterval {
    type Error = SnapcacheError;

    fn try_from(secs: i64) -> Result<Self, Self::Error> {
        u64::try_from(secs).map(Self).map_err(|_| {
            SnapcacheError::configuration(format!(
                "refresh interval must be non-negative, got {secs}"
            ))
        })
    }
}

impl Serialize for RefreshInterval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for RefreshInterval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(IntervalVisitor)
    }
}

struct IntervalVisitor;

impl<'de> Visitor<'de> for IntervalVisitor {
    type Value = RefreshInterval;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer number of seconds")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(RefreshInterval(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        RefreshInterval::try_from(v).map_err(E::custom)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Err(E::custom(format!(
            "refresh interval must be an integer, got {v}"
        )))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        RefreshInterval::parse(v).map_err(E::custom)
    }
}
