//! Builders for catalogs, inputs, messages and worker configurations.

use config::shared::{
    BufferConfig, DestinationTimeoutConfig, HeartbeatConfig, ReplicationWorkerConfig,
    ValidationConfig, WorkerType,
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::types::{
    ConfiguredCatalog, ConfiguredStream, ControlKind, ControlMessage, ErrorTrace, EstimateTrace,
    LogLevel, LogMessage, Message, RecordMessage, ReplicationInput, StateMessage, StreamDescriptor,
    StreamStatus, StreamStatusTrace, TraceFailureType, TraceKind, TraceMessage,
};

pub const TEST_JOB_ID: i64 = 42;
pub const TEST_ATTEMPT_NUMBER: u32 = 1;

pub fn users_stream() -> StreamDescriptor {
    StreamDescriptor::with_namespace("users", "public")
}

pub fn orders_stream() -> StreamDescriptor {
    StreamDescriptor::with_namespace("orders", "public")
}

/// Schema of the streams built by [`test_catalog`].
pub fn test_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": { "type": "integer" },
            "name": { "type": "string" }
        }
    })
}

pub fn test_catalog(streams: &[StreamDescriptor]) -> ConfiguredCatalog {
    ConfiguredCatalog::new(
        streams
            .iter()
            .map(|stream| ConfiguredStream::new(stream.clone(), test_schema()))
            .collect(),
    )
}

pub fn test_input(catalog: ConfiguredCatalog) -> ReplicationInput {
    ReplicationInput {
        connection_id: Uuid::new_v4(),
        workspace_id: Uuid::new_v4(),
        source_id: Uuid::new_v4(),
        destination_id: Uuid::new_v4(),
        job_id: TEST_JOB_ID,
        attempt_number: TEST_ATTEMPT_NUMBER,
        is_reset: false,
        source_configuration: json!({ "host": "source.internal" }),
        destination_configuration: json!({ "host": "destination.internal" }),
        catalog,
        state: None,
    }
}

/// Worker configuration whose watchdogs are idle unless a test tightens them.
pub fn test_config(worker_type: WorkerType) -> ReplicationWorkerConfig {
    ReplicationWorkerConfig {
        worker_type,
        heartbeat: HeartbeatConfig {
            threshold_ms: 60_000,
            check_interval_ms: 10,
            fail_on_timeout: true,
        },
        destination_timeout: DestinationTimeoutConfig {
            enabled: true,
            timeout_ms: 60_000,
            poll_interval_ms: 10,
            fail_on_timeout: true,
        },
        buffer: BufferConfig {
            source_queue_capacity: 16,
        },
        validation: ValidationConfig {
            enabled: true,
            max_in_flight: 4,
            max_errors_per_stream: 10,
        },
        field_selection_enabled: false,
        shutdown_grace_period_ms: 5_000,
        close_timeout_ms: 5_000,
    }
}

pub fn record(stream: &StreamDescriptor, data: Value) -> Message {
    Message::Record(RecordMessage::new(stream.clone(), data))
}

pub fn stream_state(stream: &StreamDescriptor, data: Value) -> Message {
    Message::State(StateMessage::stream(stream.clone(), data))
}

pub fn global_state(streams: &[StreamDescriptor], data: Value) -> Message {
    Message::State(StateMessage::global(streams.to_vec(), data))
}

pub fn log(level: LogLevel, message: &str) -> Message {
    Message::Log(LogMessage {
        level,
        message: message.to_string(),
    })
}

pub fn stream_status(stream: &StreamDescriptor, status: StreamStatus) -> Message {
    trace(TraceKind::StreamStatus(StreamStatusTrace {
        stream: stream.clone(),
        status,
    }))
}

pub fn error_trace(message: &str, failure_type: TraceFailureType) -> Message {
    trace(TraceKind::Error(ErrorTrace {
        message: message.to_string(),
        internal_message: Some(format!("internal: {message}")),
        stack_trace: None,
        failure_type: Some(failure_type),
        stream: None,
    }))
}

pub fn estimate(stream: &StreamDescriptor, rows: u64, bytes: u64) -> Message {
    trace(TraceKind::Estimate(EstimateTrace {
        stream: stream.clone(),
        row_estimate: Some(rows),
        byte_estimate: Some(bytes),
    }))
}

pub fn connector_config(config: Value) -> Message {
    Message::Control(ControlMessage {
        emitted_at: now_millis(),
        kind: ControlKind::ConnectorConfig { config },
    })
}

fn trace(kind: TraceKind) -> Message {
    Message::Trace(TraceMessage {
        emitted_at: now_millis(),
        kind,
    })
}

fn now_millis() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64
}
