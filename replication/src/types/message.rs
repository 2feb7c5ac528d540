//! Messages exchanged with the source and the destination.
//!
//! Messages are plain values. Stages of the pipeline consume a message and return a new one
//! instead of mutating a shared instance.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity of a stream: a name and an optional namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl StreamDescriptor {
    /// Creates a descriptor without namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }

    /// Creates a descriptor with a namespace.
    pub fn with_namespace(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }
}

impl fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{namespace}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Peer a message was received from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageOrigin {
    Source,
    Destination,
    /// Messages synthesized by the engine itself.
    Internal,
}

/// Kind of a [`Message`], used for logging and routing decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Record,
    State,
    Log,
    Trace,
    Control,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Record => "RECORD",
            MessageType::State => "STATE",
            MessageType::Log => "LOG",
            MessageType::Trace => "TRACE",
            MessageType::Control => "CONTROL",
        };
        f.write_str(name)
    }
}

/// A message read from a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    Record(RecordMessage),
    State(StateMessage),
    Log(LogMessage),
    Trace(TraceMessage),
    Control(ControlMessage),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Record(_) => MessageType::Record,
            Message::State(_) => MessageType::State,
            Message::Log(_) => MessageType::Log,
            Message::Trace(_) => MessageType::Trace,
            Message::Control(_) => MessageType::Control,
        }
    }

    /// Returns whether the message must be delivered to the destination.
    ///
    /// Only records and states cross over; every other kind is consumed by the engine.
    pub fn is_forwarded(&self) -> bool {
        matches!(self, Message::Record(_) | Message::State(_))
    }
}

impl From<RecordMessage> for Message {
    fn from(record: RecordMessage) -> Self {
        Message::Record(record)
    }
}

impl From<StateMessage> for Message {
    fn from(state: StateMessage) -> Self {
        Message::State(state)
    }
}

/// A unit of data for one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMessage {
    pub stream: StreamDescriptor,
    pub data: Value,
    /// Epoch milliseconds at which the source emitted the record.
    #[serde(default)]
    pub emitted_at: i64,
}

impl RecordMessage {
    pub fn new(stream: StreamDescriptor, data: Value) -> Self {
        Self {
            stream,
            data,
            emitted_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Streams covered by a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateScope {
    /// Checkpoint of a single stream.
    Stream(StreamDescriptor),
    /// Checkpoint shared by several streams.
    Global(Vec<StreamDescriptor>),
    /// Checkpoint without stream information, covering every stream.
    Legacy,
}

/// A checkpoint marker allowing the sync to resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMessage {
    pub scope: StateScope,
    pub data: Value,
    /// Checkpoint id stamped by the engine on states read from the source, and echoed back by
    /// the destination when it commits them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl StateMessage {
    pub fn stream(stream: StreamDescriptor, data: Value) -> Self {
        Self {
            scope: StateScope::Stream(stream),
            data,
            id: None,
        }
    }

    pub fn global(streams: Vec<StreamDescriptor>, data: Value) -> Self {
        Self {
            scope: StateScope::Global(streams),
            data,
            id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// A log line emitted by a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub level: LogLevel,
    pub message: String,
}

/// Out-of-band information about the sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceMessage {
    /// Epoch milliseconds at which the connector emitted the trace.
    pub emitted_at: f64,
    pub kind: TraceKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    Error(ErrorTrace),
    StreamStatus(StreamStatusTrace),
    Estimate(EstimateTrace),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceFailureType {
    SystemError,
    ConfigError,
    TransientError,
}

/// Error reported by a connector before failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorTrace {
    pub message: String,
    #[serde(default)]
    pub internal_message: Option<String>,
    #[serde(default)]
    pub stack_trace: Option<String>,
    #[serde(default)]
    pub failure_type: Option<TraceFailureType>,
    #[serde(default)]
    pub stream: Option<StreamDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Started,
    Running,
    Complete,
    Incomplete,
}

/// Progress of a single stream as reported by a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStatusTrace {
    pub stream: StreamDescriptor,
    pub status: StreamStatus,
}

/// Expected volume of a stream as reported by the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateTrace {
    pub stream: StreamDescriptor,
    #[serde(default)]
    pub row_estimate: Option<u64>,
    #[serde(default)]
    pub byte_estimate: Option<u64>,
}

/// Instruction sent by a connector to the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub emitted_at: f64,
    pub kind: ControlKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    /// The connector rotated its configuration, for example after refreshing credentials.
    ConnectorConfig { config: Value },
}
