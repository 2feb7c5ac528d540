//! Top level replication worker configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::load::Config;
use crate::shared::{
    BufferConfig, DestinationTimeoutConfig, HeartbeatConfig, ValidationConfig, ValidationError,
};

/// Scheduling strategy used to move messages from the source to the destination.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerType {
    /// The source pump writes every message to the destination inline.
    Direct,
    /// A bounded queue decouples source reads from destination writes.
    #[default]
    Buffered,
}

impl fmt::Display for WorkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerType::Direct => f.write_str("direct"),
            WorkerType::Buffered => f.write_str("buffered"),
        }
    }
}

/// Configuration shared by every replication worker implementation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ReplicationWorkerConfig {
    /// Strategy selected for the attempt.
    #[serde(default)]
    pub worker_type: WorkerType,
    /// Source liveness watchdog settings.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    /// Destination call watchdog settings.
    #[serde(default)]
    pub destination_timeout: DestinationTimeoutConfig,
    /// Queue sizing, only used by [`WorkerType::Buffered`].
    #[serde(default)]
    pub buffer: BufferConfig,
    /// Record schema validation settings.
    #[serde(default)]
    pub validation: ValidationConfig,
    /// Whether record fields missing from the catalog are removed before reaching the destination.
    #[serde(default)]
    pub field_selection_enabled: bool,
    /// Time in milliseconds granted to the pumps to unwind after an abort.
    #[serde(default = "default_shutdown_grace_period_ms")]
    pub shutdown_grace_period_ms: u64,
    /// Upper bound in milliseconds for closing a connector.
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

impl ReplicationWorkerConfig {
    /// Default shutdown grace period: 10 seconds.
    pub const DEFAULT_SHUTDOWN_GRACE_PERIOD_MS: u64 = 10_000;

    /// Default close timeout: 1 minute.
    pub const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 60_000;

    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_period_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    /// Validates this configuration and every nested section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.heartbeat.validate()?;
        self.destination_timeout.validate()?;
        self.buffer.validate()?;
        self.validation.validate()?;

        if self.close_timeout_ms == 0 {
            return Err(ValidationError::invalid(
                "close_timeout_ms",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Default for ReplicationWorkerConfig {
    fn default() -> Self {
        Self {
            worker_type: WorkerType::default(),
            heartbeat: HeartbeatConfig::default(),
            destination_timeout: DestinationTimeoutConfig::default(),
            buffer: BufferConfig::default(),
            validation: ValidationConfig::default(),
            field_selection_enabled: false,
            shutdown_grace_period_ms: default_shutdown_grace_period_ms(),
            close_timeout_ms: default_close_timeout_ms(),
        }
    }
}

impl Config for ReplicationWorkerConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

fn default_shutdown_grace_period_ms() -> u64 {
    ReplicationWorkerConfig::DEFAULT_SHUTDOWN_GRACE_PERIOD_MS
}

fn default_close_timeout_ms() -> u64 {
    ReplicationWorkerConfig::DEFAULT_CLOSE_TIMEOUT_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: ReplicationWorkerConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config.worker_type, WorkerType::Buffered);
        assert_eq!(config.buffer.source_queue_capacity, 1000);
        assert_eq!(config.shutdown_grace_period(), Duration::from_secs(10));
        assert!(!config.field_selection_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_nested_sections_are_validated() {
        let config = ReplicationWorkerConfig {
            buffer: BufferConfig {
                source_queue_capacity: 0,
            },
            ..Default::default()
        };

        assert_eq!(
            config.validate(),
            Err(ValidationError::invalid(
                "buffer.source_queue_capacity",
                "must be greater than 0"
            ))
        );
    }

    #[test]
    fn test_worker_type_is_snake_case() {
        let config: ReplicationWorkerConfig =
            serde_json::from_str(r#"{"worker_type": "direct"}"#).unwrap();

        assert_eq!(config.worker_type, WorkerType::Direct);
        assert_eq!(config.worker_type.to_string(), "direct");
    }
}
