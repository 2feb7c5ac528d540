use std::future::Future;
use std::path::Path;

use crate::error::ReplicationResult;
use crate::types::{DestinationStartConfig, Message};

/// Connector writing the messages of a sync.
///
/// The destination reads the messages handed to [`MessageSink::accept`] in order and emits back
/// the states it committed, which the engine reads through [`MessageSink::attempt_read`].
pub trait MessageSink {
    /// Starts the connector for the attempt whose working directory is `job_root`.
    fn start(
        &self,
        config: &DestinationStartConfig,
        job_root: &Path,
    ) -> impl Future<Output = ReplicationResult<()>> + Send;

    /// Delivers a record or a state to the destination.
    fn accept(&self, message: Message) -> impl Future<Output = ReplicationResult<()>> + Send;

    /// Signals that no more messages will be delivered.
    ///
    /// Called at most once, and only when the source finished on its own.
    fn notify_end_of_input(&self) -> impl Future<Output = ReplicationResult<()>> + Send;

    /// Returns whether the destination has no more messages to emit.
    fn is_finished(&self) -> bool;

    /// Returns the exit code of a finished destination.
    fn exit_value(&self) -> ReplicationResult<i32>;

    /// Reads the next message emitted by the destination.
    ///
    /// Returns `None` when no message is currently available.
    fn attempt_read(&self) -> impl Future<Output = ReplicationResult<Option<Message>>> + Send;

    /// Waits for the connector to terminate and releases its resources.
    fn close(&self) -> impl Future<Output = ReplicationResult<()>> + Send;

    /// Terminates the connector without waiting for it to finish.
    fn cancel(&self) -> impl Future<Output = ReplicationResult<()>> + Send;
}
