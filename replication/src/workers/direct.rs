//! Strategy delivering every message to the destination from the task reading the source.

use std::path::Path;
use std::sync::Arc;

use config::shared::ReplicationWorkerConfig;
use tracing::{Instrument, info_span};

use crate::connector::{MessageSink, MessageSource};
use crate::error::ReplicationResult;
use crate::events::{ConnectorConfigUpdater, EventPublisher};
use crate::mapper::Mapper;
use crate::types::{Message, ReplicationInput, ReplicationOutput};
use crate::workers::base::{ReplicationWorker, WorkerState};
use crate::workers::policy::AttemptFailure;
use crate::workers::replication::{
    Flow, ReplicationTasks, ReplicationWorkerCore, ReplicationWorkerHelper, SinkDelivery, Strategy,
};

/// Replication worker calling the destination inline.
///
/// Reading the source and accepting into the destination happen one after the other on a single
/// task, so a slow destination directly slows the source down. A second task drains what the
/// destination emits.
#[derive(Debug)]
pub struct DirectReplicationWorker<S, D, P, U> {
    core: ReplicationWorkerCore<S, D, P, U>,
}

impl<S, D, P, U> DirectReplicationWorker<S, D, P, U>
where
    S: MessageSource + Clone + Send + Sync + 'static,
    D: MessageSink + Clone + Send + Sync + 'static,
    P: EventPublisher + Clone + Send + Sync + 'static,
    U: ConnectorConfigUpdater + Clone + Send + Sync + 'static,
{
    pub fn new(
        source: S,
        sink: D,
        publisher: P,
        config_updater: U,
        mapper: Arc<dyn Mapper>,
        config: ReplicationWorkerConfig,
    ) -> ReplicationResult<Self> {
        let core =
            ReplicationWorkerCore::new(source, sink, publisher, config_updater, mapper, config)?;

        Ok(Self { core })
    }
}

impl<S, D, P, U> ReplicationWorker for DirectReplicationWorker<S, D, P, U>
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
        self.core.run(input, job_root, Strategy::Direct).await
    }

    fn cancel(&self) {
        self.core.cancel();
    }

    fn state(&self) -> WorkerState {
        self.core.state()
    }
}

/// Delivers messages by calling the destination directly.
struct DirectDelivery<D, P, U> {
    sink: D,
    helper: Arc<ReplicationWorkerHelper<P, U>>,
}

impl<D, P, U> SinkDelivery for DirectDelivery<D, P, U>
where
    D: MessageSink + Send + Sync,
    P: EventPublisher + Send + Sync,
    U: ConnectorConfigUpdater + Send + Sync,
{
    async fn deliver(&mut self, message: Message) -> Result<Flow, AttemptFailure> {
        self.helper.accept(&self.sink, message).await
    }

    async fn end_of_input(&mut self) -> Result<Flow, AttemptFailure> {
        self.helper.notify_end_of_input(&self.sink).await
    }
}

/// Spawns the source pump, guarded by the destination timeout, and the sink pump.
pub(crate) fn spawn_pumps<S, D, P, U>(
    tasks: &mut ReplicationTasks,
    source: S,
    sink: D,
    helper: &Arc<ReplicationWorkerHelper<P, U>>,
) where
    S: MessageSource + Send + Sync + 'static,
    D: MessageSink + Clone + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
    U: ConnectorConfigUpdater + Send + Sync + 'static,
{
    let delivery = DirectDelivery {
        sink: sink.clone(),
        helper: helper.clone(),
    };
    let source_helper = helper.clone();
    tasks.spawn(
        "source_pump",
        async move {
            let pump = source_helper.run_source_pump(&source, delivery);
            if let Err(timeout) = source_helper.destination_timeout().run_with_timeout(pump).await {
                source_helper.track_failure(AttemptFailure::DestinationTimeout(timeout));
            }
        }
        .instrument(info_span!("source_pump")),
    );

    let sink_helper = helper.clone();
    tasks.spawn(
        "sink_pump",
        async move {
            sink_helper.run_sink_pump(&sink).await;
        }
        .instrument(info_span!("sink_pump")),
    );
}
