//! Data model exchanged between the replication engine and its callers.

mod catalog;
mod context;
mod failure;
mod message;
mod output;
mod stats;

pub use catalog::{ConfiguredCatalog, ConfiguredStream, DestinationSyncMode, SyncMode};
pub use context::{DestinationStartConfig, ReplicationContext, ReplicationInput, SourceStartConfig};
pub(crate) use failure::{ConnectorCommand, duration_in_words};
pub use failure::{
    FailureOrigin, FailureReason, FailureType, MAX_FAILURES_TO_KEEP, MAX_MESSAGE_LENGTH,
    MAX_STACK_TRACE_LENGTH,
};
pub use message::{
    ControlKind, ControlMessage, ErrorTrace, EstimateTrace, LogLevel, LogMessage, Message,
    MessageOrigin, MessageType, RecordMessage, StateMessage, StateScope, StreamDescriptor,
    StreamStatus, StreamStatusTrace, TraceFailureType, TraceKind, TraceMessage,
};
pub use output::{ReplicationAttemptSummary, ReplicationOutput, ReplicationStatus};
pub use stats::{StreamSyncStats, SyncStats};
