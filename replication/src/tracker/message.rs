use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::error::ReplicationResult;
#[cfg(feature = "failpoints")]
use crate::failpoints::{REPLICATION_TRACKER_ACCEPT, replication_fail_point};
use crate::tracker::SyncStatsTracker;
use crate::types::{
    ErrorTrace, FailureOrigin, FailureReason, Message, StateMessage, StreamSyncStats, SyncStats,
    TraceKind,
};

/// Error trace received from a peer, with its emission time.
#[derive(Debug, Clone)]
struct ReceivedErrorTrace {
    origin: FailureOrigin,
    emitted_at: f64,
    error: ErrorTrace,
}

/// Observes the messages exchanged with both peers.
///
/// The tracker never alters message content, except for stamping a checkpoint id on states read
/// from the source so that the acknowledgement of the destination can be paired with them.
#[derive(Debug, Default)]
pub struct MessageTracker {
    stats: SyncStatsTracker,
    last_error_trace: Mutex<Option<ReceivedErrorTrace>>,
}

impl MessageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &SyncStatsTracker {
        &self.stats
    }

    /// Accounts for a message read from the source and returns it, stamped if it is a state.
    pub fn accept_from_source(&self, message: Message) -> ReplicationResult<Message> {
        #[cfg(feature = "failpoints")]
        replication_fail_point(REPLICATION_TRACKER_ACCEPT)?;

        match message {
            Message::Record(record) => {
                let bytes = serde_json::to_string(&record.data)?.len() as u64;
                self.stats.update_stats_from_record(&record.stream, bytes)?;

                Ok(Message::Record(record))
            }
            Message::State(mut state) => {
                let id = self.stats.stage_source_state(&state)?;
                debug!(checkpoint_id = id, "staged source state");
                state.id = Some(id);

                Ok(Message::State(state))
            }
            Message::Trace(trace) => {
                match &trace.kind {
                    TraceKind::Error(error) => {
                        self.remember(FailureOrigin::Source, trace.emitted_at, error);
                    }
                    TraceKind::Estimate(estimate) => {
                        self.stats.update_estimate(
                            &estimate.stream,
                            estimate.row_estimate,
                            estimate.byte_estimate,
                        )?;
                    }
                    TraceKind::StreamStatus(_) => {}
                }

                Ok(Message::Trace(trace))
            }
            message => Ok(message),
        }
    }

    /// Accounts for a message read from the destination.
    pub fn accept_from_destination(&self, message: &Message) -> ReplicationResult<()> {
        match message {
            Message::State(state) => self.stats.commit_destination_state(state),
            Message::Trace(trace) => {
                if let TraceKind::Error(error) = &trace.kind {
                    self.remember(FailureOrigin::Destination, trace.emitted_at, error);
                }

                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Builds a failure from the most recent error trace received from either peer.
    pub fn error_trace_message_failure(
        &self,
        job_id: i64,
        attempt_number: u32,
    ) -> Option<FailureReason> {
        let last = self
            .last_error_trace
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        last.map(|trace| {
            FailureReason::from_error_trace(
                trace.origin,
                &trace.error,
                trace.emitted_at,
                job_id,
                attempt_number,
            )
        })
    }

    /// Keeps the error trace with the latest emission time. Traces emitted at the same time are
    /// ordered by observation.
    fn remember(&self, origin: FailureOrigin, emitted_at: f64, error: &ErrorTrace) {
        let mut last = self
            .last_error_trace
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if last
            .as_ref()
            .is_some_and(|current| current.emitted_at > emitted_at)
        {
            return;
        }

        *last = Some(ReceivedErrorTrace {
            origin,
            emitted_at,
            error: error.clone(),
        });
    }

    pub fn total_stats(&self, has_replication_completed: bool) -> ReplicationResult<SyncStats> {
        self.stats.total_stats(has_replication_completed)
    }

    pub fn stream_stats(
        &self,
        has_replication_completed: bool,
    ) -> ReplicationResult<Vec<StreamSyncStats>> {
        self.stats.stream_stats(has_replication_completed)
    }

    pub fn output_states(&self) -> ReplicationResult<Vec<StateMessage>> {
        self.stats.output_states()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::{
        EstimateTrace, RecordMessage, StreamDescriptor, TraceFailureType, TraceMessage,
    };

    fn error_trace(message: &str, emitted_at: f64) -> Message {
        Message::Trace(TraceMessage {
            emitted_at,
            kind: TraceKind::Error(ErrorTrace {
                message: message.to_string(),
                internal_message: None,
                stack_trace: None,
                failure_type: Some(TraceFailureType::TransientError),
                stream: None,
            }),
        })
    }

    #[test]
    fn test_source_states_are_stamped_with_increasing_ids() {
        let tracker = MessageTracker::new();
        let stream = StreamDescriptor::new("users");

        let first = tracker
            .accept_from_source(StateMessage::stream(stream.clone(), json!({"c": 1})).into())
            .unwrap();
        let second = tracker
            .accept_from_source(StateMessage::stream(stream, json!({"c": 2})).into())
            .unwrap();

        let (Message::State(first), Message::State(second)) = (first, second) else {
            panic!("expected states");
        };
        assert!(first.id.unwrap() < second.id.unwrap());
    }

    #[test]
    fn test_record_bytes_are_serialized_data_length() {
        let tracker = MessageTracker::new();
        let data = json!({"id": 1});
        let expected = serde_json::to_string(&data).unwrap().len() as u64;

        tracker
            .accept_from_source(RecordMessage::new(StreamDescriptor::new("users"), data).into())
            .unwrap();

        assert_eq!(tracker.total_stats(false).unwrap().bytes_emitted, expected);
    }

    #[test]
    fn test_destination_ack_commits_source_checkpoint() {
        let tracker = MessageTracker::new();
        let stream = StreamDescriptor::new("users");

        tracker
            .accept_from_source(RecordMessage::new(stream.clone(), json!({"id": 1})).into())
            .unwrap();
        let stamped = tracker
            .accept_from_source(StateMessage::stream(stream, json!({"c": 1})).into())
            .unwrap();
        tracker.accept_from_destination(&stamped).unwrap();

        let stats = tracker.total_stats(false).unwrap();
        assert_eq!(stats.records_committed, 1);
        assert_eq!(tracker.output_states().unwrap().len(), 1);
    }

    #[test]
    fn test_error_trace_failure_uses_most_recent_trace() {
        let tracker = MessageTracker::new();
        assert!(tracker.error_trace_message_failure(1, 0).is_none());

        tracker
            .accept_from_source(error_trace("source broke", 1_000.0))
            .unwrap();
        let failure = tracker.error_trace_message_failure(1, 0).unwrap();
        assert_eq!(failure.failure_origin, FailureOrigin::Source);

        tracker
            .accept_from_destination(&error_trace("destination broke", 2_000.0))
            .unwrap();
        let failure = tracker.error_trace_message_failure(1, 0).unwrap();
        assert_eq!(failure.failure_origin, FailureOrigin::Destination);
        assert_eq!(failure.external_message.as_deref(), Some("destination broke"));
        assert_eq!(failure.timestamp, 2_000);
        assert!(failure.is_from_trace_message());
    }

    #[test]
    fn test_error_trace_failure_ignores_older_emission() {
        let tracker = MessageTracker::new();
        tracker
            .accept_from_destination(&error_trace("destination broke", 2_000.0))
            .unwrap();
        tracker
            .accept_from_source(error_trace("source broke late", 1_000.0))
            .unwrap();

        let failure = tracker.error_trace_message_failure(1, 0).unwrap();
        assert_eq!(failure.failure_origin, FailureOrigin::Destination);

        // Traces emitted at the same time are ordered by observation.
        tracker
            .accept_from_source(error_trace("source broke again", 2_000.0))
            .unwrap();
        let failure = tracker.error_trace_message_failure(1, 0).unwrap();
        assert_eq!(failure.failure_origin, FailureOrigin::Source);
        assert_eq!(failure.external_message.as_deref(), Some("source broke again"));
    }

    #[test]
    fn test_estimates_are_recorded() {
        let tracker = MessageTracker::new();
        tracker
            .accept_from_source(Message::Trace(TraceMessage {
                emitted_at: 0.0,
                kind: TraceKind::Estimate(EstimateTrace {
                    stream: StreamDescriptor::new("users"),
                    row_estimate: Some(100),
                    byte_estimate: None,
                }),
            }))
            .unwrap();

        let streams = tracker.stream_stats(false).unwrap();
        assert_eq!(streams[0].stats.estimated_records, Some(100));
    }
}
