use std::future::Future;
use std::path::Path;

use crate::error::ReplicationResult;
use crate::types::{Message, SourceStartConfig};

/// Connector producing the messages of a sync.
///
/// Implementations must not block the runtime in any of the asynchronous methods. Blocking I/O
/// has to be moved to `tokio::task::spawn_blocking`.
pub trait MessageSource {
    /// Starts the connector for the attempt whose working directory is `job_root`.
    fn start(
        &self,
        config: &SourceStartConfig,
        job_root: &Path,
    ) -> impl Future<Output = ReplicationResult<()>> + Send;

    /// Reads the next message.
    ///
    /// Returns `None` when no message is currently available, which does not imply that the
    /// source is finished. The future may stay pending until a message arrives.
    fn attempt_read(&self) -> impl Future<Output = ReplicationResult<Option<Message>>> + Send;

    /// Returns whether the source has no more messages to emit.
    fn is_finished(&self) -> bool;

    /// Returns the exit code of a finished source.
    fn exit_value(&self) -> ReplicationResult<i32>;

    /// Waits for the connector to terminate and releases its resources.
    fn close(&self) -> impl Future<Output = ReplicationResult<()>> + Send;

    /// Terminates the connector without waiting for it to finish.
    fn cancel(&self) -> impl Future<Output = ReplicationResult<()>> + Send;
}
