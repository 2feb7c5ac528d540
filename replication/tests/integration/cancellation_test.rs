use std::sync::Arc;
use std::time::Duration;

use replication::events::IncompleteCause;
use replication::test_utils::events::PublishedEvent;
use replication::test_utils::fixtures::{
    record, test_catalog, test_config, test_input, users_stream,
};
use replication::test_utils::sink::{AcceptBehavior, TestSink};
use replication::test_utils::source::TestSource;
use replication::types::{Message, MessageOrigin, ReplicationStatus};
use replication::workers::{ReplicationWorker, WorkerState};
use serde_json::json;
use telemetry::tracing::init_test_tracing;

use crate::common::{TestPeers, TestWorker, WORKER_TYPES, job_root};

fn users_records(count: u64) -> Vec<Message> {
    (1..=count)
        .map(|id| record(&users_stream(), json!({ "id": id, "name": format!("user {id}") })))
        .collect()
}

async fn wait_for_state(worker: &TestWorker, expected: WorkerState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while worker.state() != expected {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("worker never reached state {expected}"));
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_stops_an_endless_replication() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let peers = TestPeers::new(TestSource::endless(users_stream()), TestSink::new());
        let worker = Arc::new(peers.create_worker(test_config(worker_type)));
        let input = test_input(test_catalog(&[users_stream()]));

        let accepted = peers.sink.notify_on_accepted(10);
        let running = tokio::spawn({
            let worker = worker.clone();
            async move { worker.run(input, &job_root()).await }
        });

        accepted.notified().await;
        assert_eq!(worker.state(), WorkerState::Running);

        worker.cancel();
        worker.cancel();

        let output = running.await.unwrap().unwrap();
        assert_eq!(output.status(), ReplicationStatus::Cancelled, "{worker_type}");
        assert!(output.failures.is_empty());
        assert_eq!(worker.state(), WorkerState::Cancelled);

        // Cancelled peers are terminated instead of being closed gracefully.
        assert!(peers.source.was_cancelled());
        assert!(peers.sink.was_cancelled());
        assert!(!peers.source.was_closed());
        assert!(!peers.sink.was_closed());
        assert!(!peers.sink.received_end_of_input());

        assert_eq!(
            peers.publisher.events(),
            vec![PublishedEvent::Incomplete {
                origin: MessageOrigin::Internal,
                stream: users_stream(),
                cause: IncompleteCause::Canceled,
            }]
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_unblocks_a_stuck_destination() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let sink = TestSink::new().with_accept_behavior(AcceptBehavior::Hang);
        let peers = TestPeers::new(TestSource::endless(users_stream()), sink);
        let worker = Arc::new(peers.create_worker(test_config(worker_type)));
        let input = test_input(test_catalog(&[users_stream()]));

        let running = tokio::spawn({
            let worker = worker.clone();
            async move { worker.run(input, &job_root()).await }
        });

        while peers.source.emitted() == 0 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        worker.cancel();

        let output = running.await.unwrap().unwrap();
        assert_eq!(output.status(), ReplicationStatus::Cancelled, "{worker_type}");
        assert!(output.failures.is_empty());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_while_peers_start_is_ignored() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let source = TestSource::new(users_records(2)).with_start_delay(Duration::from_millis(200));
        let peers = TestPeers::new(source, TestSink::new());
        let worker = Arc::new(peers.create_worker(test_config(worker_type)));
        let input = test_input(test_catalog(&[users_stream()]));

        let running = tokio::spawn({
            let worker = worker.clone();
            async move { worker.run(input, &job_root()).await }
        });

        wait_for_state(&worker, WorkerState::Starting).await;
        worker.cancel();

        let output = running.await.unwrap().unwrap();
        assert_eq!(output.status(), ReplicationStatus::Completed, "{worker_type}");
        assert_eq!(worker.state(), WorkerState::Completed);
        assert_eq!(peers.sink.accepted_records().len(), 2);
        assert!(!peers.source.was_cancelled());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_during_teardown_does_not_change_the_outcome() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let source = TestSource::new(users_records(3)).with_close_delay(Duration::from_millis(300));
        let peers = TestPeers::new(source, TestSink::new());
        let worker = Arc::new(peers.create_worker(test_config(worker_type)));
        let input = test_input(test_catalog(&[users_stream()]));

        let running = tokio::spawn({
            let worker = worker.clone();
            async move { worker.run(input, &job_root()).await }
        });

        // The pumps are done once the worker stops running, while the source is still closing.
        wait_for_state(&worker, WorkerState::Stopping).await;
        worker.cancel();

        let output = running.await.unwrap().unwrap();
        assert_eq!(output.status(), ReplicationStatus::Completed, "{worker_type}");
        assert!(output.failures.is_empty());
        assert_eq!(worker.state(), WorkerState::Completed);
        assert!(peers.source.was_closed());
        assert!(!peers.source.was_cancelled());
        assert_eq!(output.summary.total_stats.records_committed, 3);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_failures_are_not_attempt_failures() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let source = TestSource::endless(users_stream()).failing_cancel();
        let peers = TestPeers::new(source, TestSink::new());
        let worker = Arc::new(peers.create_worker(test_config(worker_type)));
        let input = test_input(test_catalog(&[users_stream()]));

        let accepted = peers.sink.notify_on_accepted(5);
        let running = tokio::spawn({
            let worker = worker.clone();
            async move { worker.run(input, &job_root()).await }
        });

        accepted.notified().await;
        worker.cancel();

        let output = running.await.unwrap().unwrap();
        assert_eq!(output.status(), ReplicationStatus::Cancelled, "{worker_type}");
        assert!(output.failures.is_empty());
        assert!(peers.source.was_cancelled());
        assert!(peers.sink.was_cancelled());
    }
}
