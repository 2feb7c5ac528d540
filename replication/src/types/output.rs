use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{ConfiguredCatalog, FailureReason, StateMessage, StreamSyncStats, SyncStats};

/// Final status of a replication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationStatus {
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for ReplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplicationStatus::Completed => "completed",
            ReplicationStatus::Failed => "failed",
            ReplicationStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationAttemptSummary {
    pub status: ReplicationStatus,
    pub records_synced: u64,
    pub bytes_synced: u64,
    /// Epoch milliseconds at which the attempt started.
    pub start_time: i64,
    /// Epoch milliseconds at which the attempt ended.
    pub end_time: i64,
    pub total_stats: SyncStats,
    pub stream_stats: Vec<StreamSyncStats>,
}

/// Result of a replication attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationOutput {
    pub summary: ReplicationAttemptSummary,
    pub failures: Vec<FailureReason>,
    /// Catalog seen by the destination.
    pub output_catalog: ConfiguredCatalog,
    /// Last state committed by the destination for each scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<Vec<StateMessage>>,
}

impl ReplicationOutput {
    pub fn status(&self) -> ReplicationStatus {
        self.summary.status
    }
}
