//! Source heartbeat configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Configuration of the source heartbeat watchdog.
///
/// Any read attempt on the source counts as a heartbeat. When no heartbeat is observed for
/// longer than [`HeartbeatConfig::threshold_ms`], the attempt is failed unless
/// [`HeartbeatConfig::fail_on_timeout`] is disabled, in which case the silence is only logged.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HeartbeatConfig {
    /// Maximum silence tolerated from the source, in milliseconds.
    ///
    /// Default: 86400000 (24 hours)
    #[serde(default = "default_threshold_ms")]
    pub threshold_ms: u64,

    /// Interval in milliseconds between two liveness checks.
    ///
    /// Default: 60000 (1 minute)
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    /// Whether a missed heartbeat fails the attempt.
    ///
    /// Default: true
    #[serde(default = "default_fail_on_timeout")]
    pub fail_on_timeout: bool,
}

impl HeartbeatConfig {
    /// Default heartbeat threshold: 24 hours.
    pub const DEFAULT_THRESHOLD_MS: u64 = 24 * 60 * 60 * 1_000;

    /// Default check interval: 1 minute.
    pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 60_000;

    /// Missed heartbeats fail the attempt by default.
    pub const DEFAULT_FAIL_ON_TIMEOUT: bool = true;

    /// Returns the threshold as a [`Duration`].
    pub fn threshold(&self) -> Duration {
        Duration::from_millis(self.threshold_ms)
    }

    /// Returns the check interval as a [`Duration`].
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Validates the heartbeat configuration.
    ///
    /// Both the threshold and the check interval must be non-zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.threshold_ms == 0 {
            return Err(ValidationError::invalid(
                "heartbeat.threshold_ms",
                "must be greater than 0",
            ));
        }

        if self.check_interval_ms == 0 {
            return Err(ValidationError::invalid(
                "heartbeat.check_interval_ms",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            threshold_ms: Self::DEFAULT_THRESHOLD_MS,
            check_interval_ms: Self::DEFAULT_CHECK_INTERVAL_MS,
            fail_on_timeout: Self::DEFAULT_FAIL_ON_TIMEOUT,
        }
    }
}

fn default_threshold_ms() -> u64 {
    HeartbeatConfig::DEFAULT_THRESHOLD_MS
}

fn default_check_interval_ms() -> u64 {
    HeartbeatConfig::DEFAULT_CHECK_INTERVAL_MS
}

fn default_fail_on_timeout() -> bool {
    HeartbeatConfig::DEFAULT_FAIL_ON_TIMEOUT
}
