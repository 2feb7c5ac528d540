use std::time::Duration;

use replication::events::IncompleteCause;
use replication::test_utils::events::PublishedEvent;
use replication::test_utils::fixtures::{
    error_trace, record, stream_state, test_catalog, test_config, test_input, users_stream,
};
use replication::test_utils::sink::{AcceptBehavior, EndOfInputBehavior, TestSink};
use replication::test_utils::source::{SourceEnd, TestSource};
use replication::types::{
    FailureOrigin, FailureType, MessageOrigin, ReplicationStatus, TraceFailureType,
};
use replication::workers::{ReplicationWorker, WorkerState};
use serde_json::json;
use telemetry::tracing::init_test_tracing;

use crate::common::{TestPeers, WORKER_TYPES, failure_origins, run_replication};

fn users_records(count: u64) -> Vec<replication::types::Message> {
    (1..=count)
        .map(|id| record(&users_stream(), json!({ "id": id, "name": format!("user {id}") })))
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn source_start_failure_skips_replication() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let source = TestSource::new(users_records(3)).failing_start();
        let peers = TestPeers::new(source, TestSink::new());
        let worker = peers.create_worker(test_config(worker_type));

        let output = run_replication(&worker, test_input(test_catalog(&[users_stream()]))).await;

        assert_eq!(output.status(), ReplicationStatus::Failed);
        assert_eq!(failure_origins(&output), vec![FailureOrigin::Source]);
        assert_eq!(peers.source.emitted(), 0);
        assert!(peers.sink.accepted().is_empty());
        assert!(!peers.sink.received_end_of_input());
        assert_eq!(worker.state(), WorkerState::Failed);

        assert_eq!(
            peers.publisher.events(),
            vec![PublishedEvent::Incomplete {
                origin: MessageOrigin::Internal,
                stream: users_stream(),
                cause: IncompleteCause::Failed,
            }]
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn destination_start_failure_is_attributed_to_the_destination() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let sink = TestSink::new().failing_start();
        let peers = TestPeers::new(TestSource::new(users_records(3)), sink);
        let worker = peers.create_worker(test_config(worker_type));

        let output = run_replication(&worker, test_input(test_catalog(&[users_stream()]))).await;

        assert_eq!(output.status(), ReplicationStatus::Failed);
        assert_eq!(failure_origins(&output), vec![FailureOrigin::Destination]);
        assert_eq!(peers.source.emitted(), 0);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn source_read_failure_fails_the_attempt() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let source = TestSource::new(users_records(2)).ending_with(SourceEnd::Fail);
        let peers = TestPeers::new(source, TestSink::new());
        let worker = peers.create_worker(test_config(worker_type));

        let output = run_replication(&worker, test_input(test_catalog(&[users_stream()]))).await;

        assert_eq!(output.status(), ReplicationStatus::Failed);
        assert_eq!(failure_origins(&output), vec![FailureOrigin::Source]);

        let failure = &output.failures[0];
        assert_eq!(failure.failure_type, Some(FailureType::SystemError));
        assert_eq!(
            failure.external_message.as_deref(),
            Some("Something went wrong within the source connector")
        );
        assert_eq!(failure.metadata["connector_command"], json!("read"));
        assert!(!peers.sink.received_end_of_input());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn source_non_zero_exit_fails_after_delivering_everything() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let source = TestSource::new(users_records(3)).with_exit_value(2);
        let peers = TestPeers::new(source, TestSink::new());
        let worker = peers.create_worker(test_config(worker_type));

        let output = run_replication(&worker, test_input(test_catalog(&[users_stream()]))).await;

        assert_eq!(output.status(), ReplicationStatus::Failed);
        assert_eq!(failure_origins(&output), vec![FailureOrigin::Source]);
        assert!(
            output.failures[0]
                .internal_message
                .as_deref()
                .unwrap()
                .contains("exit code 2")
        );
        assert_eq!(peers.sink.accepted_records().len(), 3);
        assert!(peers.sink.received_end_of_input());
        assert!(peers.sink.was_closed());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn destination_crash_only_commits_acknowledged_states() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let users = users_stream();
        let source = TestSource::new(vec![
            record(&users, json!({ "id": 1, "name": "alice" })),
            stream_state(&users, json!({ "cursor": 1 })),
            record(&users, json!({ "id": 2, "name": "bob" })),
            stream_state(&users, json!({ "cursor": 2 })),
        ]);
        let sink = TestSink::new().acknowledging_states(1).with_exit_value(1);
        let peers = TestPeers::new(source, sink);
        let worker = peers.create_worker(test_config(worker_type));

        let output = run_replication(&worker, test_input(test_catalog(&[users.clone()]))).await;

        assert_eq!(output.status(), ReplicationStatus::Failed, "{worker_type}");
        assert_eq!(failure_origins(&output), vec![FailureOrigin::Destination]);

        let states = output.state.unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].data, json!({ "cursor": 1 }));

        let total = &output.summary.total_stats;
        assert_eq!(total.records_emitted, 2);
        assert_eq!(total.records_committed, 1);
        assert_eq!(output.summary.records_synced, 1);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn destination_accept_failure_is_recorded_once() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let sink = TestSink::new().with_accept_behavior(AcceptBehavior::FailAfter(1));
        let peers = TestPeers::new(TestSource::new(users_records(10)), sink);
        let worker = peers.create_worker(test_config(worker_type));

        let output = run_replication(&worker, test_input(test_catalog(&[users_stream()]))).await;

        assert_eq!(output.status(), ReplicationStatus::Failed);
        assert_eq!(failure_origins(&output), vec![FailureOrigin::Destination]);
        assert_eq!(output.failures[0].metadata["connector_command"], json!("write"));
        assert_eq!(peers.sink.accepted_records().len(), 1);
        assert!(!peers.sink.received_end_of_input());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn destination_panic_is_a_replication_failure() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let sink = TestSink::new().with_accept_behavior(AcceptBehavior::PanicAfter(2));
        let peers = TestPeers::new(TestSource::new(users_records(10)), sink);
        let worker = peers.create_worker(test_config(worker_type));

        let output = run_replication(&worker, test_input(test_catalog(&[users_stream()]))).await;

        assert_eq!(output.status(), ReplicationStatus::Failed, "{worker_type}");
        assert_eq!(failure_origins(&output), vec![FailureOrigin::Replication]);
        assert!(peers.source.was_closed());
        assert!(peers.sink.was_closed());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn silent_source_trips_the_heartbeat() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let source = TestSource::new(users_records(2)).ending_with(SourceEnd::Hang);
        let peers = TestPeers::new(source, TestSink::new());

        let mut config = test_config(worker_type);
        config.heartbeat.threshold_ms = 200;
        let worker = peers.create_worker(config);

        let output = run_replication(&worker, test_input(test_catalog(&[users_stream()]))).await;

        assert_eq!(output.status(), ReplicationStatus::Failed);
        assert_eq!(failure_origins(&output), vec![FailureOrigin::Source]);

        let failure = &output.failures[0];
        assert_eq!(failure.failure_type, Some(FailureType::HeartbeatTimeout));
        assert_eq!(failure.retryable, Some(false));
        assert!(
            failure
                .external_message
                .as_deref()
                .unwrap()
                .starts_with("Airbyte detected that the Source didn't send any records")
        );
        // Nothing reaches the destination once the heartbeat fired.
        assert_eq!(peers.sink.accepted_records().len(), 2);
        assert!(!peers.sink.received_end_of_input());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn observe_only_heartbeat_lets_a_slow_source_complete() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let source = TestSource::new(users_records(2)).with_read_delay(Duration::from_millis(150));
        let peers = TestPeers::new(source, TestSink::new());

        let mut config = test_config(worker_type);
        config.heartbeat.threshold_ms = 50;
        config.heartbeat.fail_on_timeout = false;
        let worker = peers.create_worker(config);

        let output = run_replication(&worker, test_input(test_catalog(&[users_stream()]))).await;

        assert_eq!(output.status(), ReplicationStatus::Completed);
        assert!(output.failures.is_empty());
        assert_eq!(peers.sink.accepted_records().len(), 2);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn stuck_destination_accept_trips_the_destination_timeout() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let sink = TestSink::new()
            .with_accept_behavior(AcceptBehavior::Hang)
            .failing_close();
        let peers = TestPeers::new(TestSource::new(users_records(3)), sink);

        let mut config = test_config(worker_type);
        config.destination_timeout.timeout_ms = 200;
        let worker = peers.create_worker(config);

        let output = run_replication(&worker, test_input(test_catalog(&[users_stream()]))).await;

        assert_eq!(output.status(), ReplicationStatus::Failed, "{worker_type}");
        assert_eq!(failure_origins(&output), vec![FailureOrigin::Destination]);
        assert_eq!(
            output.failures[0].failure_type,
            Some(FailureType::DestinationTimeout)
        );
        assert!(peers.sink.was_closed());
        assert!(!peers.sink.received_end_of_input());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn stuck_end_of_input_trips_the_destination_timeout() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let sink = TestSink::new().with_end_of_input_behavior(EndOfInputBehavior::Hang);
        let peers = TestPeers::new(TestSource::new(users_records(3)), sink);

        let mut config = test_config(worker_type);
        config.destination_timeout.timeout_ms = 200;
        let worker = peers.create_worker(config);

        let output = run_replication(&worker, test_input(test_catalog(&[users_stream()]))).await;

        assert_eq!(output.status(), ReplicationStatus::Failed);
        assert_eq!(
            output.failures[0].failure_type,
            Some(FailureType::DestinationTimeout)
        );
        assert_eq!(peers.sink.accepted_records().len(), 3);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn end_of_input_failure_is_attributed_to_the_destination() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let sink = TestSink::new().with_end_of_input_behavior(EndOfInputBehavior::Fail);
        let peers = TestPeers::new(TestSource::new(users_records(1)), sink);
        let worker = peers.create_worker(test_config(worker_type));

        let output = run_replication(&worker, test_input(test_catalog(&[users_stream()]))).await;

        assert_eq!(output.status(), ReplicationStatus::Failed);
        assert_eq!(failure_origins(&output), vec![FailureOrigin::Destination]);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn error_trace_is_reported_before_the_failure_it_explains() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let mut messages = users_records(1);
        messages.push(error_trace("invalid credentials", TraceFailureType::ConfigError));
        let source = TestSource::new(messages).ending_with(SourceEnd::Fail);
        let peers = TestPeers::new(source, TestSink::new());
        let worker = peers.create_worker(test_config(worker_type));

        let output = run_replication(&worker, test_input(test_catalog(&[users_stream()]))).await;

        assert_eq!(output.status(), ReplicationStatus::Failed);
        assert_eq!(
            failure_origins(&output),
            vec![FailureOrigin::Source, FailureOrigin::Source]
        );

        let trace_failure = &output.failures[0];
        assert!(trace_failure.is_from_trace_message());
        assert_eq!(trace_failure.failure_type, Some(FailureType::ConfigError));
        assert_eq!(
            trace_failure.external_message.as_deref(),
            Some("invalid credentials")
        );
        assert!(!output.failures[1].is_from_trace_message());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn error_trace_of_a_completed_attempt_is_not_a_failure() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let mut messages = users_records(1);
        messages.push(error_trace("transient hiccup", TraceFailureType::TransientError));
        let peers = TestPeers::new(TestSource::new(messages), TestSink::new());
        let worker = peers.create_worker(test_config(worker_type));

        let output = run_replication(&worker, test_input(test_catalog(&[users_stream()]))).await;

        assert_eq!(output.status(), ReplicationStatus::Completed);
        assert!(output.failures.is_empty());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn close_failure_fails_an_otherwise_successful_attempt() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let sink = TestSink::new().failing_close();
        let peers = TestPeers::new(TestSource::new(users_records(2)), sink);
        let worker = peers.create_worker(test_config(worker_type));

        let output = run_replication(&worker, test_input(test_catalog(&[users_stream()]))).await;

        assert_eq!(output.status(), ReplicationStatus::Failed);
        assert_eq!(failure_origins(&output), vec![FailureOrigin::Destination]);
        // The destination received everything, so committed counts follow the acknowledgements.
        assert_eq!(output.summary.total_stats.records_emitted, 2);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn close_failure_of_a_failed_peer_is_not_reported_twice() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let source = TestSource::new(users_records(1))
            .ending_with(SourceEnd::Fail)
            .failing_close();
        let peers = TestPeers::new(source, TestSink::new());
        let worker = peers.create_worker(test_config(worker_type));

        let output = run_replication(&worker, test_input(test_catalog(&[users_stream()]))).await;

        assert_eq!(failure_origins(&output), vec![FailureOrigin::Source]);
        assert!(peers.source.was_closed());
    }
}
