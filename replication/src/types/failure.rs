//! Failure reasons attached to the output of a failed attempt.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ErrorTrace, StreamDescriptor, TraceFailureType};

/// Maximum length of failure messages coming from outside the engine.
pub const MAX_MESSAGE_LENGTH: usize = 50_000;

/// Maximum length of failure stack traces.
pub const MAX_STACK_TRACE_LENGTH: usize = 100_000;

/// Maximum number of failures reported for one attempt.
pub const MAX_FAILURES_TO_KEEP: usize = 10;

const TRUNCATION_NOTICE: &str = "Remainder truncated by the Airbyte platform.";

const JOB_ID_METADATA_KEY: &str = "jobId";
const ATTEMPT_NUMBER_METADATA_KEY: &str = "attemptNumber";
const FROM_TRACE_MESSAGE_METADATA_KEY: &str = "from_trace_message";
const CONNECTOR_COMMAND_METADATA_KEY: &str = "connector_command";

/// Component a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureOrigin {
    Source,
    Destination,
    Replication,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    SystemError,
    ConfigError,
    TransientError,
    HeartbeatTimeout,
    DestinationTimeout,
}

impl From<TraceFailureType> for FailureType {
    fn from(value: TraceFailureType) -> Self {
        match value {
            TraceFailureType::SystemError => FailureType::SystemError,
            TraceFailureType::ConfigError => FailureType::ConfigError,
            TraceFailureType::TransientError => FailureType::TransientError,
        }
    }
}

/// Connector command running when a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectorCommand {
    Read,
    Write,
}

impl ConnectorCommand {
    fn as_str(self) -> &'static str {
        match self {
            ConnectorCommand::Read => "read",
            ConnectorCommand::Write => "write",
        }
    }
}

/// Structured explanation of why an attempt did not complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReason {
    pub failure_origin: FailureOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_type: Option<FailureType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<String>,
    /// Epoch milliseconds at which the failure was observed.
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_descriptor: Option<StreamDescriptor>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl FailureReason {
    /// Creates a failure of `origin` stamped with the current time and the attempt identity.
    pub fn new(origin: FailureOrigin, job_id: i64, attempt_number: u32) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(JOB_ID_METADATA_KEY.to_string(), Value::from(job_id));
        metadata.insert(
            ATTEMPT_NUMBER_METADATA_KEY.to_string(),
            Value::from(attempt_number),
        );

        Self {
            failure_origin: origin,
            failure_type: None,
            external_message: None,
            internal_message: None,
            stacktrace: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
            retryable: None,
            stream_descriptor: None,
            metadata,
        }
    }

    /// Builds a failure from an error trace emitted by a connector.
    ///
    /// Connector provided strings are truncated since they come from outside the engine.
    pub fn from_error_trace(
        origin: FailureOrigin,
        trace: &ErrorTrace,
        emitted_at: f64,
        job_id: i64,
        attempt_number: u32,
    ) -> Self {
        let mut failure = Self::new(origin, job_id, attempt_number)
            .with_type(
                trace
                    .failure_type
                    .map(FailureType::from)
                    .unwrap_or(FailureType::SystemError),
            )
            .with_external_message(truncate_with_notice(&trace.message, MAX_MESSAGE_LENGTH));

        failure.internal_message = trace
            .internal_message
            .as_deref()
            .map(|message| truncate_with_notice(message, MAX_MESSAGE_LENGTH));
        failure.stacktrace = trace
            .stack_trace
            .as_deref()
            .map(|stacktrace| truncate_with_notice(stacktrace, MAX_STACK_TRACE_LENGTH));
        failure.stream_descriptor = trace.stream.clone();
        failure.timestamp = emitted_at as i64;
        failure
            .metadata
            .insert(FROM_TRACE_MESSAGE_METADATA_KEY.to_string(), Value::Bool(true));

        failure
    }

    pub fn with_type(mut self, failure_type: FailureType) -> Self {
        self.failure_type = Some(failure_type);
        self
    }

    pub fn with_external_message(mut self, message: impl Into<String>) -> Self {
        self.external_message = Some(message.into());
        self
    }

    pub fn with_internal_message(mut self, message: &str) -> Self {
        self.internal_message = Some(truncate_with_notice(message, MAX_MESSAGE_LENGTH));
        self
    }

    pub fn with_stacktrace(mut self, stacktrace: &str) -> Self {
        self.stacktrace = Some(truncate_with_notice(stacktrace, MAX_STACK_TRACE_LENGTH));
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    pub(crate) fn with_connector_command(mut self, command: ConnectorCommand) -> Self {
        self.metadata.insert(
            CONNECTOR_COMMAND_METADATA_KEY.to_string(),
            Value::from(command.as_str()),
        );
        self
    }

    /// Returns whether the failure was built from a connector error trace.
    pub fn is_from_trace_message(&self) -> bool {
        self.metadata
            .get(FROM_TRACE_MESSAGE_METADATA_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Truncates `value` to at most `max_chars` characters, marking the cut with a notice.
pub(crate) fn truncate_with_notice(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }

    let Some(kept) = max_chars.checked_sub(TRUNCATION_NOTICE.len() + 4) else {
        return value.to_string();
    };

    let mut truncated: String = value.chars().take(kept).collect();
    truncated.push_str("... ");
    truncated.push_str(TRUNCATION_NOTICE);
    truncated
}

/// Renders a duration in words, for example `1 hour 5 minutes`.
///
/// Leading and trailing zero units are omitted and sub-second precision is dropped.
pub(crate) fn duration_in_words(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let units = [
        (total_seconds / 86_400, "day"),
        ((total_seconds % 86_400) / 3_600, "hour"),
        ((total_seconds % 3_600) / 60, "minute"),
        (total_seconds % 60, "second"),
    ];

    let first = units.iter().position(|(value, _)| *value != 0);
    let last = units.iter().rposition(|(value, _)| *value != 0);
    let (Some(first), Some(last)) = (first, last) else {
        return "0 seconds".to_string();
    };

    units[first..=last]
        .iter()
        .map(|(value, unit)| {
            if *value == 1 {
                format!("{value} {unit}")
            } else {
                format!("{value} {unit}s")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
