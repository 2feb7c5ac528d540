use std::sync::Arc;

use config::shared::WorkerType;
use replication::error::ErrorKind;
use replication::failpoints::{REPLICATION_OUTPUT_STATS, REPLICATION_TRACKER_ACCEPT};
use replication::mapper::IdentityMapper;
use replication::test_utils::events::{RecordingConfigUpdater, RecordingPublisher};
use replication::test_utils::failpoints::TestFailScenario;
use replication::test_utils::fixtures::{
    record, test_catalog, test_config, test_input, users_stream,
};
use replication::test_utils::sink::TestSink;
use replication::test_utils::source::TestSource;
use replication::types::{FailureOrigin, ReplicationStatus};
use replication::workers::{AnyReplicationWorker, ReplicationWorker, WorkerState};
use serde_json::json;
use telemetry::tracing::init_test_tracing;

const WORKER_TYPES: [WorkerType; 2] = [WorkerType::Direct, WorkerType::Buffered];

fn create_worker(
    source: TestSource,
    sink: TestSink,
    worker_type: WorkerType,
) -> AnyReplicationWorker<TestSource, TestSink, RecordingPublisher, RecordingConfigUpdater> {
    AnyReplicationWorker::new(
        source,
        sink,
        RecordingPublisher::new(),
        RecordingConfigUpdater::new(),
        Arc::new(IdentityMapper),
        test_config(worker_type),
    )
    .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn tracker_failure_is_a_replication_failure() {
    init_test_tracing();
    let _scenario = TestFailScenario::setup(&[(REPLICATION_TRACKER_ACCEPT, "return")]);

    for worker_type in WORKER_TYPES {
        let users = users_stream();
        let source = TestSource::new(vec![record(&users, json!({ "id": 1, "name": "alice" }))]);
        let sink = TestSink::new();
        let worker = create_worker(source, sink.clone(), worker_type);

        let output = worker
            .run(test_input(test_catalog(&[users])), &std::env::temp_dir())
            .await
            .unwrap();

        assert_eq!(output.status(), ReplicationStatus::Failed);
        assert_eq!(output.failures.len(), 1);
        assert_eq!(output.failures[0].failure_origin, FailureOrigin::Replication);
        assert!(
            output.failures[0]
                .internal_message
                .as_deref()
                .unwrap()
                .contains(REPLICATION_TRACKER_ACCEPT)
        );
        assert!(sink.accepted().is_empty());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn unreadable_stats_fail_the_run() {
    init_test_tracing();
    let _scenario = TestFailScenario::setup(&[(REPLICATION_OUTPUT_STATS, "return")]);

    for worker_type in WORKER_TYPES {
        let users = users_stream();
        let source = TestSource::new(vec![record(&users, json!({ "id": 1, "name": "alice" }))]);
        let sink = TestSink::new();
        let worker = create_worker(source.clone(), sink.clone(), worker_type);

        let err = worker
            .run(test_input(test_catalog(&[users])), &std::env::temp_dir())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::WithFailpoint);
        assert_eq!(worker.state(), WorkerState::Failed);
        // Teardown happens before the output is assembled.
        assert!(source.was_closed());
        assert!(sink.was_closed());
    }
}
