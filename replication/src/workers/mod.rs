//! Replication workers driving an attempt from the source to the destination.
//!
//! Two strategies are available. [`DirectReplicationWorker`] delivers every message to the
//! destination from the task reading the source, while [`BufferedReplicationWorker`] decouples
//! both through a bounded queue drained by a dedicated writer task. Both share the same driver,
//! message processing, teardown and output assembly.

mod base;
mod buffered;
mod direct;
pub mod policy;
mod replication;

use std::path::Path;
use std::sync::Arc;

use config::shared::{ReplicationWorkerConfig, WorkerType};

pub use base::{ReplicationWorker, WorkerState};
pub use buffered::BufferedReplicationWorker;
pub use direct::DirectReplicationWorker;

use crate::connector::{MessageSink, MessageSource};
use crate::error::ReplicationResult;
use crate::events::{ConnectorConfigUpdater, EventPublisher};
use crate::mapper::Mapper;
use crate::types::{ReplicationInput, ReplicationOutput};

/// A worker of the strategy selected in [`ReplicationWorkerConfig::worker_type`].
#[derive(Debug)]
pub enum AnyReplicationWorker<S, D, P, U> {
    Direct(DirectReplicationWorker<S, D, P, U>),
    Buffered(BufferedReplicationWorker<S, D, P, U>),
}

impl<S, D, P, U> AnyReplicationWorker<S, D, P, U>
where
    S: MessageSource + Clone + Send + Sync + 'static,
    D: MessageSink + Clone + Send + Sync + 'static,
    P: EventPublisher + Clone + Send + Sync + 'static,
    U: ConnectorConfigUpdater + Clone + Send + Sync + 'static,
{
    /// Creates the worker matching the configured strategy.
    pub fn new(
        source: S,
        sink: D,
        publisher: P,
        config_updater: U,
        mapper: Arc<dyn Mapper>,
        config: ReplicationWorkerConfig,
    ) -> ReplicationResult<Self> {
        let worker = match config.worker_type {
            WorkerType::Direct => AnyReplicationWorker::Direct(DirectReplicationWorker::new(
                source,
                sink,
                publisher,
                config_updater,
                mapper,
                config,
            )?),
            WorkerType::Buffered => {
                AnyReplicationWorker::Buffered(BufferedReplicationWorker::new(
                    source,
                    sink,
                    publisher,
                    config_updater,
                    mapper,
                    config,
                )?)
            }
        };

        Ok(worker)
    }
}

impl<S, D, P, U> ReplicationWorker for AnyReplicationWorker<S, D, P, U>
where
    S: MessageSource + Clone + Send + Sync + 'static,
    D: MessageSink + Clone + Send + Sync + 'static,
    P: EventPublisher + Clone + Send + Sync + 'static,
    U: ConnectorConfigUpdater + Clone + Send + Sync + 'static,
{
    async fn run(
        &self,
        input: ReplicationInput,
        job_root: &Path,
    ) -> ReplicationResult<ReplicationOutput> {
        match self {
            AnyReplicationWorker::Direct(worker) => worker.run(input, job_root).await,
            AnyReplicationWorker::Buffered(worker) => worker.run(input, job_root).await,
        }
    }

    fn cancel(&self) {
        match self {
            AnyReplicationWorker::Direct(worker) => worker.cancel(),
            AnyReplicationWorker::Buffered(worker) => worker.cancel(),
        }
    }

    fn state(&self) -> WorkerState {
        match self {
            AnyReplicationWorker::Direct(worker) => worker.state(),
            AnyReplicationWorker::Buffered(worker) => worker.state(),
        }
    }
}
