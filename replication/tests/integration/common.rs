use std::path::PathBuf;
use std::sync::Arc;

use config::shared::{ReplicationWorkerConfig, WorkerType};
use replication::mapper::{IdentityMapper, Mapper};
use replication::test_utils::events::{RecordingConfigUpdater, RecordingPublisher};
use replication::test_utils::sink::TestSink;
use replication::test_utils::source::TestSource;
use replication::types::{FailureOrigin, ReplicationInput, ReplicationOutput};
use replication::workers::{AnyReplicationWorker, ReplicationWorker};

pub const WORKER_TYPES: [WorkerType; 2] = [WorkerType::Direct, WorkerType::Buffered];

pub type TestWorker =
    AnyReplicationWorker<TestSource, TestSink, RecordingPublisher, RecordingConfigUpdater>;

/// Peers of a test worker, kept by the test to inspect what the worker did with them.
#[derive(Debug, Clone)]
pub struct TestPeers {
    pub source: TestSource,
    pub sink: TestSink,
    pub publisher: RecordingPublisher,
    pub config_updater: RecordingConfigUpdater,
}

impl TestPeers {
    pub fn new(source: TestSource, sink: TestSink) -> Self {
        Self {
            source,
            sink,
            publisher: RecordingPublisher::new(),
            config_updater: RecordingConfigUpdater::new(),
        }
    }

    pub fn create_worker(&self, config: ReplicationWorkerConfig) -> TestWorker {
        self.create_worker_with_mapper(config, Arc::new(IdentityMapper))
    }

    pub fn create_worker_with_mapper(
        &self,
        config: ReplicationWorkerConfig,
        mapper: Arc<dyn Mapper>,
    ) -> TestWorker {
        AnyReplicationWorker::new(
            self.source.clone(),
            self.sink.clone(),
            self.publisher.clone(),
            self.config_updater.clone(),
            mapper,
            config,
        )
        .unwrap()
    }
}

pub fn job_root() -> PathBuf {
    std::env::temp_dir()
}

pub async fn run_replication(worker: &TestWorker, input: ReplicationInput) -> ReplicationOutput {
    worker.run(input, &job_root()).await.unwrap()
}

pub fn failure_origins(output: &ReplicationOutput) -> Vec<FailureOrigin> {
    output
        .failures
        .iter()
        .map(|failure| failure.failure_origin)
        .collect()
}
