use std::sync::Arc;

use replication::error::ErrorKind;
use replication::events::IncompleteCause;
use replication::mapper::{NamespaceDefinition, NamespacingMapper, SOURCE_NAMESPACE_PLACEHOLDER};
use replication::test_utils::events::{
    ConfigUpdate, PublishedEvent, RecordingConfigUpdater, RecordingPublisher,
};
use replication::test_utils::fixtures::{
    connector_config, estimate, log, orders_stream, record, stream_state, stream_status,
    test_catalog, test_config, test_input, users_stream,
};
use replication::test_utils::sink::TestSink;
use replication::test_utils::source::TestSource;
use replication::types::{
    LogLevel, Message, MessageOrigin, ReplicationStatus, StateScope, StreamDescriptor,
    StreamStatus, SyncStats,
};
use replication::workers::{ReplicationWorker, WorkerState};
use serde_json::json;
use telemetry::tracing::init_test_tracing;

use crate::common::{TestPeers, WORKER_TYPES, job_root, run_replication};

#[tokio::test(flavor = "multi_thread")]
async fn replication_delivers_records_and_states_in_order() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let users = users_stream();
        let source = TestSource::new(vec![
            stream_status(&users, StreamStatus::Started),
            record(&users, json!({ "id": 1, "name": "alice" })),
            record(&users, json!({ "id": 2, "name": "bob" })),
            stream_state(&users, json!({ "cursor": 2 })),
            log(LogLevel::Info, "halfway there"),
            record(&users, json!({ "id": 3, "name": "carol" })),
            stream_state(&users, json!({ "cursor": 3 })),
            stream_status(&users, StreamStatus::Complete),
        ]);
        let peers = TestPeers::new(source, TestSink::new());
        let worker = peers.create_worker(test_config(worker_type));

        let catalog = test_catalog(&[users.clone(), orders_stream()]);
        let output = run_replication(&worker, test_input(catalog.clone())).await;

        assert_eq!(output.status(), ReplicationStatus::Completed, "{worker_type}");
        assert!(output.failures.is_empty());
        assert_eq!(worker.state(), WorkerState::Completed);

        // Only records and states reach the destination, in the order the source emitted them.
        let accepted = peers.sink.accepted();
        let kinds: Vec<_> = accepted
            .iter()
            .map(|message| match message {
                Message::Record(record) => format!("record:{}", record.data["id"]),
                Message::State(state) => format!("state:{}", state.data["cursor"]),
                other => panic!("unexpected message delivered: {other:?}"),
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["record:1", "record:2", "state:2", "record:3", "state:3"]
        );

        let summary = &output.summary;
        assert_eq!(summary.records_synced, 3);
        assert_eq!(summary.total_stats.records_emitted, 3);
        assert_eq!(summary.total_stats.records_committed, 3);
        assert_eq!(summary.total_stats.source_state_messages_emitted, 2);
        assert_eq!(summary.total_stats.destination_state_messages_emitted, 2);
        assert!(summary.total_stats.replication_start_time.is_some());
        assert!(summary.total_stats.replication_end_time.is_some());
        assert!(summary.total_stats.source_read_end_time.is_some());
        assert!(summary.total_stats.destination_write_end_time.is_some());
        assert!(summary.start_time <= summary.end_time);

        let users_stats = summary
            .stream_stats
            .iter()
            .find(|stats| stats.stream_name == "users")
            .unwrap();
        assert_eq!(users_stats.stream_namespace.as_deref(), Some("public"));
        assert_eq!(users_stats.stats.records_emitted, 3);

        let states = output.state.unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].scope, StateScope::Stream(users.clone()));
        assert_eq!(states[0].data, json!({ "cursor": 3 }));
        assert_eq!(states[0].id, None);

        assert_eq!(output.output_catalog, catalog);
        assert!(peers.source.was_closed());
        assert!(peers.sink.was_closed());
        assert!(peers.sink.received_end_of_input());

        let mut expected_events = vec![
            PublishedEvent::Status {
                origin: MessageOrigin::Source,
                stream: users.clone(),
                status: StreamStatus::Started,
            },
            PublishedEvent::Status {
                origin: MessageOrigin::Source,
                stream: users.clone(),
                status: StreamStatus::Complete,
            },
        ];
        expected_events.extend(catalog.descriptors().map(|stream| PublishedEvent::Complete {
            origin: MessageOrigin::Internal,
            stream: stream.clone(),
        }));
        assert_eq!(peers.publisher.events(), expected_events);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn replication_with_an_empty_source_completes() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let peers = TestPeers::new(TestSource::new(vec![]), TestSink::new());
        let worker = peers.create_worker(test_config(worker_type));

        let output = run_replication(&worker, test_input(test_catalog(&[users_stream()]))).await;

        assert_eq!(output.status(), ReplicationStatus::Completed);
        assert_eq!(output.summary.records_synced, 0);
        assert_eq!(output.state, None);
        assert!(peers.sink.accepted().is_empty());
        assert!(peers.sink.received_end_of_input());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn peers_are_started_with_the_attempt_configuration() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let peers = TestPeers::new(TestSource::new(vec![]), TestSink::new());
        let worker = peers.create_worker(test_config(worker_type));

        let mut input = test_input(test_catalog(&[users_stream()]));
        input.state = Some(json!({ "cursor": 10 }));
        run_replication(&worker, input.clone()).await;

        let source_config = peers.source.start_config().unwrap();
        assert_eq!(source_config.source_id, input.source_id);
        assert_eq!(source_config.configuration, input.source_configuration);
        assert_eq!(source_config.state, input.state);
        assert_eq!(source_config.catalog, input.catalog);

        let destination_config = peers.sink.start_config().unwrap();
        assert_eq!(destination_config.destination_id, input.destination_id);
        assert_eq!(
            destination_config.configuration,
            input.destination_configuration
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn namespacing_mapper_rewrites_destination_side_and_reverts_states() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let users = users_stream();
        let source = TestSource::new(vec![
            record(&users, json!({ "id": 1, "name": "alice" })),
            stream_state(&users, json!({ "cursor": 1 })),
        ]);
        let peers = TestPeers::new(source, TestSink::new());

        let catalog = test_catalog(&[users.clone()]);
        let mapper = NamespacingMapper::new(
            NamespaceDefinition::CustomFormat,
            Some(format!("{SOURCE_NAMESPACE_PLACEHOLDER}_raw")),
            Some("airbyte_".to_string()),
            &catalog,
        );
        let worker = peers.create_worker_with_mapper(test_config(worker_type), Arc::new(mapper));

        let output = run_replication(&worker, test_input(catalog)).await;
        assert_eq!(output.status(), ReplicationStatus::Completed);

        let mapped = StreamDescriptor::with_namespace("airbyte_users", "public_raw");
        let records = peers.sink.accepted_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].stream, mapped);

        let destination_catalog = peers.sink.start_config().unwrap().catalog;
        assert_eq!(destination_catalog.streams[0].stream, mapped);
        assert_eq!(output.output_catalog, destination_catalog);

        // States acknowledged by the destination are reported in source terms.
        let states = output.state.unwrap();
        assert_eq!(states[0].scope, StateScope::Stream(users.clone()));
        assert_eq!(output.summary.stream_stats[0].stream_name, "users");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn field_selection_drops_undeclared_fields() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let users = users_stream();
        let source = TestSource::new(vec![record(
            &users,
            json!({ "id": 1, "name": "alice", "password": "hunter2" }),
        )]);
        let peers = TestPeers::new(source, TestSink::new());

        let mut config = test_config(worker_type);
        config.field_selection_enabled = true;
        let worker = peers.create_worker(config);

        let output = run_replication(&worker, test_input(test_catalog(&[users]))).await;
        assert_eq!(output.status(), ReplicationStatus::Completed);

        let records = peers.sink.accepted_records();
        assert_eq!(records[0].data, json!({ "id": 1, "name": "alice" }));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn disabled_field_selection_passes_records_through() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let users = users_stream();
        let data = json!({ "id": 1, "name": "alice", "password": "hunter2" });
        let source = TestSource::new(vec![record(&users, data.clone())]);
        let peers = TestPeers::new(source, TestSink::new());
        let worker = peers.create_worker(test_config(worker_type));

        run_replication(&worker, test_input(test_catalog(&[users]))).await;

        assert_eq!(peers.sink.accepted_records()[0].data, data);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn schema_violations_never_block_records() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let users = users_stream();
        let source = TestSource::new(vec![
            record(&users, json!({ "id": "not a number", "name": 12 })),
            record(&users, json!({ "id": 2, "name": "bob" })),
        ]);
        let peers = TestPeers::new(source, TestSink::new());
        let worker = peers.create_worker(test_config(worker_type));

        let output = run_replication(&worker, test_input(test_catalog(&[users]))).await;

        assert_eq!(output.status(), ReplicationStatus::Completed);
        assert!(output.failures.is_empty());
        assert_eq!(peers.sink.accepted_records().len(), 2);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn connector_config_updates_are_persisted() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let source = TestSource::new(vec![connector_config(json!({ "token": "source" }))]);
        let sink = TestSink::new().with_output(vec![connector_config(
            json!({ "token": "destination" }),
        )]);
        let peers = TestPeers::new(source, sink);
        let worker = peers.create_worker(test_config(worker_type));

        let input = test_input(test_catalog(&[users_stream()]));
        let output = run_replication(&worker, input.clone()).await;
        assert_eq!(output.status(), ReplicationStatus::Completed);

        let updates = peers.config_updater.updates();
        assert_eq!(updates.len(), 2);
        assert!(updates.contains(&ConfigUpdate::Source {
            source_id: input.source_id,
            config: json!({ "token": "source" }),
        }));
        assert!(updates.contains(&ConfigUpdate::Destination {
            destination_id: input.destination_id,
            config: json!({ "token": "destination" }),
        }));
        assert!(peers.sink.accepted().is_empty());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn side_channel_failures_do_not_fail_the_attempt() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let users = users_stream();
        let source = TestSource::new(vec![
            stream_status(&users, StreamStatus::Started),
            connector_config(json!({ "token": "rotated" })),
            record(&users, json!({ "id": 1, "name": "alice" })),
        ]);
        let mut peers = TestPeers::new(source, TestSink::new());
        peers.publisher = RecordingPublisher::failing();
        peers.config_updater = RecordingConfigUpdater::failing();
        let worker = peers.create_worker(test_config(worker_type));

        let output = run_replication(&worker, test_input(test_catalog(&[users]))).await;

        assert_eq!(output.status(), ReplicationStatus::Completed);
        assert!(output.failures.is_empty());
        assert_eq!(peers.config_updater.updates().len(), 1);
        assert_eq!(peers.publisher.events().len(), 2);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn destination_stream_statuses_are_published_with_their_origin() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let users = users_stream();
        let sink = TestSink::new().with_output(vec![stream_status(&users, StreamStatus::Running)]);
        let peers = TestPeers::new(TestSource::new(vec![]), sink);
        let worker = peers.create_worker(test_config(worker_type));

        run_replication(&worker, test_input(test_catalog(&[users.clone()]))).await;

        let events = peers.publisher.events();
        assert!(events.contains(&PublishedEvent::Status {
            origin: MessageOrigin::Destination,
            stream: users.clone(),
            status: StreamStatus::Running,
        }));
        assert_eq!(
            events.last(),
            Some(&PublishedEvent::Complete {
                origin: MessageOrigin::Internal,
                stream: users,
            })
        );
        assert!(!events.iter().any(|event| matches!(
            event,
            PublishedEvent::Incomplete {
                cause: IncompleteCause::Failed,
                ..
            }
        )));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn estimates_are_reported_in_stats() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let users = users_stream();
        let source = TestSource::new(vec![
            estimate(&users, 100, 2_048),
            record(&users, json!({ "id": 1, "name": "alice" })),
        ]);
        let peers = TestPeers::new(source, TestSink::new());
        let worker = peers.create_worker(test_config(worker_type));

        let output = run_replication(&worker, test_input(test_catalog(&[users]))).await;

        assert_eq!(output.summary.total_stats.estimated_records, Some(100));
        assert_eq!(output.summary.total_stats.estimated_bytes, Some(2_048));
        assert!(peers.sink.accepted().iter().all(|message| matches!(message, Message::Record(_))));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_attempts_produce_the_same_summary() {
    init_test_tracing();

    let users = users_stream();
    let messages = vec![
        record(&users, json!({ "id": 1, "name": "alice" })),
        stream_state(&users, json!({ "cursor": 1 })),
        record(&users, json!({ "id": 2, "name": "bob" })),
        stream_state(&users, json!({ "cursor": 2 })),
    ];
    let catalog = test_catalog(&[users.clone()]);

    let mut summaries = Vec::new();
    for worker_type in WORKER_TYPES {
        for _ in 0..2 {
            let peers = TestPeers::new(TestSource::new(messages.clone()), TestSink::new());
            let worker = peers.create_worker(test_config(worker_type));
            let output = run_replication(&worker, test_input(catalog.clone())).await;

            let mut summary = output.summary;
            summary.start_time = 0;
            summary.end_time = 0;
            for stats in std::iter::once(&mut summary.total_stats)
                .chain(summary.stream_stats.iter_mut().map(|stream| &mut stream.stats))
            {
                *stats = SyncStats {
                    max_seconds_before_source_state_message_emitted: None,
                    mean_seconds_before_source_state_message_emitted: None,
                    max_seconds_between_state_message_emitted_and_committed: None,
                    mean_seconds_between_state_message_emitted_and_committed: None,
                    replication_start_time: None,
                    replication_end_time: None,
                    source_read_start_time: None,
                    source_read_end_time: None,
                    destination_write_start_time: None,
                    destination_write_end_time: None,
                    ..stats.clone()
                };
            }
            summaries.push(summary);
        }
    }

    assert!(summaries.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_runs_a_single_attempt() {
    init_test_tracing();

    for worker_type in WORKER_TYPES {
        let peers = TestPeers::new(TestSource::new(vec![]), TestSink::new());
        let worker = peers.create_worker(test_config(worker_type));
        let input = test_input(test_catalog(&[users_stream()]));

        // Cancelling a worker which is not running has no effect.
        worker.cancel();
        assert_eq!(worker.state(), WorkerState::NotStarted);

        let output = run_replication(&worker, input.clone()).await;
        assert_eq!(output.status(), ReplicationStatus::Completed);

        let err = worker.run(input, &job_root()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(worker.state(), WorkerState::Completed);
    }
}
