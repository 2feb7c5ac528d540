use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Queue sizing for the buffered replication worker.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BufferConfig {
    /// Maximum number of processed source messages waiting to be written to the destination.
    ///
    /// The source pump blocks once the queue is full.
    #[serde(default = "default_source_queue_capacity")]
    pub source_queue_capacity: usize,
}

impl BufferConfig {
    /// Default queue capacity between the source pump and the destination writer.
    pub const DEFAULT_SOURCE_QUEUE_CAPACITY: usize = 1000;

    /// Validates buffer configuration settings.
    ///
    /// Ensures the queue capacity is non-zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.source_queue_capacity == 0 {
            return Err(ValidationError::invalid(
                "buffer.source_queue_capacity",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            source_queue_capacity: default_source_queue_capacity(),
        }
    }
}

fn default_source_queue_capacity() -> usize {
    BufferConfig::DEFAULT_SOURCE_QUEUE_CAPACITY
}
