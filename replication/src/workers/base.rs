use std::fmt;
use std::future::Future;
use std::path::Path;

use crate::error::ReplicationResult;
use crate::types::{ReplicationInput, ReplicationOutput, ReplicationStatus};

/// Lifecycle of a replication worker.
///
/// A worker runs a single attempt: once it left [`WorkerState::NotStarted`] it can not be run
/// again. Only a [`WorkerState::Running`] worker can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    NotStarted,
    /// The peers are being started.
    Starting,
    Running,
    /// The pumps stopped and the peers are being torn down.
    Stopping,
    Completed,
    Failed,
    Cancelled,
}

impl From<ReplicationStatus> for WorkerState {
    fn from(status: ReplicationStatus) -> Self {
        match status {
            ReplicationStatus::Completed => WorkerState::Completed,
            ReplicationStatus::Failed => WorkerState::Failed,
            ReplicationStatus::Cancelled => WorkerState::Cancelled,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::NotStarted => "not_started",
            WorkerState::Starting => "starting",
            WorkerState::Running => "running",
            WorkerState::Stopping => "stopping",
            WorkerState::Completed => "completed",
            WorkerState::Failed => "failed",
            WorkerState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Runs one replication attempt from a source to a destination.
///
/// Workers are shared through an [`std::sync::Arc`] so that [`ReplicationWorker::cancel`] can be
/// called from another task while [`ReplicationWorker::run`] is in flight.
pub trait ReplicationWorker {
    /// Runs the attempt to completion and returns its output.
    ///
    /// Failures of the peers and of the engine are reported in the output. An error is only
    /// returned when the output itself can not be produced, or when the worker was already run.
    fn run(
        &self,
        input: ReplicationInput,
        job_root: &Path,
    ) -> impl Future<Output = ReplicationResult<ReplicationOutput>> + Send;

    /// Requests the running attempt to stop as soon as possible.
    ///
    /// Calling it more than once, or on a worker which is not running, has no effect.
    fn cancel(&self);

    /// Returns the current lifecycle state of the worker.
    fn state(&self) -> WorkerState;
}
