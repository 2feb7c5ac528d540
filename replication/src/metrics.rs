//! Metric names and labels recorded by the replication engine.

/// Label for the job id in metrics.
pub const JOB_ID_LABEL: &str = "job_id";

/// Label for the stream name in metrics.
pub const STREAM_NAME_LABEL: &str = "stream_name";

/// Label for the failure origin in metrics.
pub const FAILURE_ORIGIN_LABEL: &str = "failure_origin";

/// Label for the final status of an attempt in metrics.
pub const STATUS_LABEL: &str = "status";

// Watchdog metrics

/// Counter for source heartbeat timeouts, fatal or observed.
pub const REPLICATION_SOURCE_HEARTBEAT_TIMEOUTS_TOTAL: &str =
    "replication_source_heartbeat_timeouts_total";

/// Counter for destination `accept` calls exceeding the timeout.
pub const REPLICATION_DESTINATION_ACCEPT_TIMEOUTS_TOTAL: &str =
    "replication_destination_accept_timeouts_total";

/// Counter for destination `notify_end_of_input` calls exceeding the timeout.
pub const REPLICATION_DESTINATION_NOTIFY_END_OF_INPUT_TIMEOUTS_TOTAL: &str =
    "replication_destination_notify_end_of_input_timeouts_total";

// Pipeline metrics

/// Counter for records read from the source.
pub const REPLICATION_RECORDS_READ_TOTAL: &str = "replication_records_read_total";

/// Counter for state messages read from the source.
pub const REPLICATION_SOURCE_STATES_TOTAL: &str = "replication_source_states_total";

/// Counter for state messages committed by the destination.
pub const REPLICATION_DESTINATION_STATES_TOTAL: &str = "replication_destination_states_total";

/// Counter for records failing schema validation.
pub const REPLICATION_SCHEMA_VALIDATION_ERRORS_TOTAL: &str =
    "replication_schema_validation_errors_total";

/// Counter for records not validated because the validation pool was saturated.
pub const REPLICATION_SCHEMA_VALIDATION_SKIPPED_TOTAL: &str =
    "replication_schema_validation_skipped_total";

/// Counter for connector configuration updates that failed to persist.
pub const REPLICATION_CONFIG_UPDATE_FAILURES_TOTAL: &str =
    "replication_config_update_failures_total";

// Attempt metrics

/// Counter for failures recorded on attempts.
pub const REPLICATION_FAILURES_TOTAL: &str = "replication_failures_total";

/// Counter for finished attempts.
pub const REPLICATION_ATTEMPTS_TOTAL: &str = "replication_attempts_total";
