use std::fmt;
use std::future::Future;

use crate::error::ReplicationResult;
use crate::types::{Message, MessageOrigin, ReplicationContext, StreamDescriptor};

/// Why a stream did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncompleteCause {
    Failed,
    Canceled,
}

impl fmt::Display for IncompleteCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncompleteCause::Failed => f.write_str("failed"),
            IncompleteCause::Canceled => f.write_str("canceled"),
        }
    }
}

/// Receives the stream status events of an attempt.
///
/// Errors returned by the publisher are logged by the engine and never fail the attempt.
pub trait EventPublisher {
    /// Publishes a stream status trace emitted by a connector.
    fn publish_status_event(
        &self,
        origin: MessageOrigin,
        message: &Message,
        context: &ReplicationContext,
    ) -> impl Future<Output = ReplicationResult<()>> + Send;

    /// Publishes that `stream` completed.
    fn publish_complete_status_event(
        &self,
        stream: &StreamDescriptor,
        context: &ReplicationContext,
        origin: MessageOrigin,
    ) -> impl Future<Output = ReplicationResult<()>> + Send;

    /// Publishes that `stream` did not complete.
    fn publish_incomplete_status_event(
        &self,
        stream: &StreamDescriptor,
        context: &ReplicationContext,
        origin: MessageOrigin,
        cause: IncompleteCause,
    ) -> impl Future<Output = ReplicationResult<()>> + Send;
}
