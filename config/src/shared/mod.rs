//! Shared configuration types for replication workers.

mod buffer;
mod destination_timeout;
mod heartbeat;
mod validation;
mod worker;

pub use buffer::BufferConfig;
pub use destination_timeout::DestinationTimeoutConfig;
pub use heartbeat::HeartbeatConfig;
pub use validation::ValidationConfig;
pub use worker::{ReplicationWorkerConfig, WorkerType};

use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A field holds a value outside of its allowed range.
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}

impl ValidationError {
    pub(crate) fn invalid(field: &str, constraint: &str) -> Self {
        ValidationError::InvalidFieldValue {
            field: field.to_string(),
            constraint: constraint.to_string(),
        }
    }
}
