//! Scheduler and registration configuration.

use std::time::Duration;

use serde::{Deserialize, Deserializer};
use snapcache_core::{RefreshInterval, SnapcacheError, SnapcacheResult};

/// Configuration for the refresh scheduler.
///
/// Deserializes from e.g. `{"tick_period_ms": 500, "watch_buffer_size": 32}`;
/// missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Period of the recurring freshness check.
    #[serde(rename = "tick_period_ms", deserialize_with = "duration_from_millis")]
    pub tick_period: Duration,
    /// Channel buffer size for new watches.
    pub watch_buffer_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(1),
            watch_buffer_size: 16,
        }
    }
}

impl SchedulerConfig {
    /// Reject configurations the scheduler cannot run with.
    pub fn validate(&self) -> SnapcacheResult<()> {
        if self.tick_period.is_zero() {
            return Err(SnapcacheError::configuration(
                "tick period must be greater than zero",
            ));
        }
        if self.watch_buffer_size == 0 {
            return Err(SnapcacheError::configuration(
                "watch buffer size must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn duration_from_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

/// Options accepted when registering a source.
///
/// # Example
///
/// ```rust
/// use snapcache_registry::RegisterOptions;
///
/// let options: RegisterOptions =
///     serde_json::from_str(r#"{"refresh_interval": "30"}"#).unwrap();
/// assert_eq!(options.refresh_interval.as_secs(), 30);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegisterOptions {
    /// How long a snapshot stays fresh. Zero means every check refreshes.
    pub refresh_interval: RefreshInterval,
}

impl RegisterOptions {
    /// Options with the given interval in seconds.
    pub fn every(secs: u64) -> Self {
        Self {
            refresh_interval: RefreshInterval::from_secs(secs),
        }
    }

    /// Set the refresh interval.
    pub fn refresh_interval(mut self, interval: RefreshInterval) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Read options from an untyped JSON value, e.g. a section of a config file.
    pub fn from_value(value: serde_json::Value) -> SnapcacheResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| SnapcacheError::configuration(format!("invalid source options: {e}")))
    }
}
