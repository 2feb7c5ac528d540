//! Destination call timeout configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Configuration of the watchdog guarding `accept` and `notify_end_of_input` on the destination.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DestinationTimeoutConfig {
    /// Whether destination calls are guarded at all.
    ///
    /// Default: true
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Maximum duration in milliseconds of a single guarded destination call.
    ///
    /// Default: 86400000 (24 hours)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Interval in milliseconds between two checks of the running timers.
    ///
    /// Default: 60000 (1 minute)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Whether a timed out call fails the attempt.
    ///
    /// Default: true
    #[serde(default = "default_fail_on_timeout")]
    pub fail_on_timeout: bool,
}

impl DestinationTimeoutConfig {
    /// Destination timeouts are enabled by default.
    pub const DEFAULT_ENABLED: bool = true;

    /// Default timeout: 24 hours.
    pub const DEFAULT_TIMEOUT_MS: u64 = 24 * 60 * 60 * 1_000;

    /// Default poll interval: 1 minute.
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 60_000;

    /// Timeouts fail the attempt by default.
    pub const DEFAULT_FAIL_ON_TIMEOUT: bool = true;

    /// Returns the timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Returns the poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validates the destination timeout configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout_ms == 0 {
            return Err(ValidationError::invalid(
                "destination_timeout.timeout_ms",
                "must be greater than 0",
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(ValidationError::invalid(
                "destination_timeout.poll_interval_ms",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Default for DestinationTimeoutConfig {
    fn default() -> Self {
        Self {
            enabled: Self::DEFAULT_ENABLED,
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
            poll_interval_ms: Self::DEFAULT_POLL_INTERVAL_MS,
            fail_on_timeout: Self::DEFAULT_FAIL_ON_TIMEOUT,
        }
    }
}

fn default_enabled() -> bool {
    DestinationTimeoutConfig::DEFAULT_ENABLED
}

fn default_timeout_ms() -> u64 {
    DestinationTimeoutConfig::DEFAULT_TIMEOUT_MS
}

fn default_poll_interval_ms() -> u64 {
    DestinationTimeoutConfig::DEFAULT_POLL_INTERVAL_MS
}

fn default_fail_on_timeout() -> bool {
    DestinationTimeoutConfig::DEFAULT_FAIL_ON_TIMEOUT
}
