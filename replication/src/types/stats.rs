use serde::{Deserialize, Serialize};

/// Counters and timings of a sync, either in total or for a single stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub records_emitted: u64,
    pub bytes_emitted: u64,
    pub records_committed: u64,
    pub bytes_committed: u64,
    pub source_state_messages_emitted: u64,
    pub destination_state_messages_emitted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_seconds_before_source_state_message_emitted: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_seconds_before_source_state_message_emitted: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_seconds_between_state_message_emitted_and_committed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_seconds_between_state_message_emitted_and_committed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_records: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication_start_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication_end_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_read_start_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_read_end_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_write_start_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_write_end_time: Option<i64>,
}

/// Stats of one named stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSyncStats {
    pub stream_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_namespace: Option<String>,
    pub stats: SyncStats,
}
