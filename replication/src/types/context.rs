use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::ConfiguredCatalog;

/// Everything the caller supplies for one replication attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationInput {
    pub connection_id: Uuid,
    pub workspace_id: Uuid,
    pub source_id: Uuid,
    pub destination_id: Uuid,
    pub job_id: i64,
    pub attempt_number: u32,
    #[serde(default)]
    pub is_reset: bool,
    pub source_configuration: Value,
    pub destination_configuration: Value,
    pub catalog: ConfiguredCatalog,
    #[serde(default)]
    pub state: Option<Value>,
}

/// Identity of the running attempt, shared read-only with every component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationContext {
    pub is_reset: bool,
    pub connection_id: Uuid,
    pub source_id: Uuid,
    pub destination_id: Uuid,
    pub job_id: i64,
    pub attempt_number: u32,
    pub workspace_id: Uuid,
}

impl From<&ReplicationInput> for ReplicationContext {
    fn from(input: &ReplicationInput) -> Self {
        Self {
            is_reset: input.is_reset,
            connection_id: input.connection_id,
            source_id: input.source_id,
            destination_id: input.destination_id,
            job_id: input.job_id,
            attempt_number: input.attempt_number,
            workspace_id: input.workspace_id,
        }
    }
}

/// Configuration handed to the source when it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStartConfig {
    pub source_id: Uuid,
    pub configuration: Value,
    pub catalog: ConfiguredCatalog,
    pub state: Option<Value>,
}

impl From<&ReplicationInput> for SourceStartConfig {
    fn from(input: &ReplicationInput) -> Self {
        Self {
            source_id: input.source_id,
            configuration: input.source_configuration.clone(),
            catalog: input.catalog.clone(),
            state: input.state.clone(),
        }
    }
}

/// Configuration handed to the destination when it starts.
///
/// The catalog is the one produced by the mapper, so the destination sees the rewritten stream
/// names.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationStartConfig {
    pub destination_id: Uuid,
    pub configuration: Value,
    pub catalog: ConfiguredCatalog,
}
