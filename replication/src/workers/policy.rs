use std::fmt;

use crate::error::ReplicationError;
use crate::monitors::{DestinationTimeout, HeartbeatTimeout};
use crate::types::{ConnectorCommand, FailureOrigin, FailureReason, FailureType, duration_in_words};

const SOURCE_EXTERNAL_MESSAGE: &str = "Something went wrong within the source connector";
const DESTINATION_EXTERNAL_MESSAGE: &str = "Something went wrong within the destination connector";
const REPLICATION_EXTERNAL_MESSAGE: &str = "Something went wrong during replication";
const HEARTBEATS_DOCS_URL: &str = "https://docs.airbyte.com/understanding-airbyte/heartbeats";

/// Failure that aborted a replication attempt, attributed to the component responsible for it.
///
/// Tasks wrap their errors into the variant matching what they were doing when the error
/// happened, so that the attribution never depends on inspecting the error itself.
#[derive(Debug, Clone)]
pub enum AttemptFailure {
    /// The source failed to start, to be read, or exited with an error.
    Source(ReplicationError),
    /// The destination failed to start, to accept messages, or exited with an error.
    Destination(ReplicationError),
    /// The source showed no activity for longer than the heartbeat threshold.
    HeartbeatTimeout(HeartbeatTimeout),
    /// A destination call ran for longer than the destination timeout.
    DestinationTimeout(DestinationTimeout),
    /// The engine itself failed, for example while tracking stats.
    Replication(ReplicationError),
}

impl AttemptFailure {
    pub fn origin(&self) -> FailureOrigin {
        match self {
            AttemptFailure::Source(_) | AttemptFailure::HeartbeatTimeout(_) => FailureOrigin::Source,
            AttemptFailure::Destination(_) | AttemptFailure::DestinationTimeout(_) => {
                FailureOrigin::Destination
            }
            AttemptFailure::Replication(_) => FailureOrigin::Replication,
        }
    }

    /// Converts the failure into the [`FailureReason`] reported in the attempt output.
    pub fn to_failure_reason(&self, job_id: i64, attempt_number: u32) -> FailureReason {
        let failure = FailureReason::new(self.origin(), job_id, attempt_number);

        match self {
            AttemptFailure::Source(err) => failure
                .with_type(FailureType::SystemError)
                .with_external_message(SOURCE_EXTERNAL_MESSAGE)
                .with_internal_message(&err.summary())
                .with_stacktrace(&err.to_string())
                .with_retryable(true)
                .with_connector_command(ConnectorCommand::Read),
            AttemptFailure::Destination(err) => failure
                .with_type(FailureType::SystemError)
                .with_external_message(DESTINATION_EXTERNAL_MESSAGE)
                .with_internal_message(&err.summary())
                .with_stacktrace(&err.to_string())
                .with_retryable(true)
                .with_connector_command(ConnectorCommand::Write),
            AttemptFailure::HeartbeatTimeout(timeout) => failure
                .with_type(FailureType::HeartbeatTimeout)
                .with_external_message(heartbeat_timeout_message(timeout))
                .with_internal_message(&timeout.to_string())
                .with_stacktrace(&format!("{timeout:?}"))
                .with_retryable(false)
                .with_connector_command(ConnectorCommand::Read),
            AttemptFailure::DestinationTimeout(timeout) => failure
                .with_type(FailureType::DestinationTimeout)
                .with_external_message(destination_timeout_message(timeout))
                .with_internal_message(&timeout.to_string())
                .with_stacktrace(&format!("{timeout:?}"))
                .with_retryable(true)
                .with_connector_command(ConnectorCommand::Write),
            AttemptFailure::Replication(err) => failure
                .with_type(FailureType::SystemError)
                .with_external_message(REPLICATION_EXTERNAL_MESSAGE)
                .with_internal_message(&err.summary())
                .with_stacktrace(&err.to_string())
                .with_retryable(true),
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Source(err) => write!(f, "source failure: {}", err.summary()),
            AttemptFailure::Destination(err) => {
                write!(f, "destination failure: {}", err.summary())
            }
            AttemptFailure::HeartbeatTimeout(timeout) => write!(f, "{timeout}"),
            AttemptFailure::DestinationTimeout(timeout) => write!(f, "{timeout}"),
            AttemptFailure::Replication(err) => {
                write!(f, "replication failure: {}", err.summary())
            }
        }
    }
}

fn heartbeat_timeout_message(timeout: &HeartbeatTimeout) -> String {
    format!(
        "Airbyte detected that the Source didn't send any records in the last {}, exceeding the \
         configured {} threshold. Airbyte will try reading again on the next sync. Please see \
         {HEARTBEATS_DOCS_URL} for more info.",
        duration_in_words(timeout.time_since_last_beat),
        duration_in_words(timeout.threshold),
    )
}

fn destination_timeout_message(timeout: &DestinationTimeout) -> String {
    format!(
        "Airbyte detected that the Destination didn't make progress in the last {}, exceeding \
         the configured {} threshold. Airbyte will try reading again on the next sync. Please see \
         {HEARTBEATS_DOCS_URL} for more info.",
        duration_in_words(timeout.elapsed),
        duration_in_words(timeout.threshold),
    )
}
