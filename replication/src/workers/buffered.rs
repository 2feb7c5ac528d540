//! Strategy decoupling the source from the destination through a bounded queue.

use std::path::Path;
use std::sync::Arc;

use config::shared::ReplicationWorkerConfig;
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, info_span};

use crate::connector::{MessageSink, MessageSource};
use crate::error::{ErrorKind, ReplicationResult};
use crate::events::{ConnectorConfigUpdater, EventPublisher};
use crate::mapper::Mapper;
use crate::replication_error;
use crate::types::{Message, ReplicationInput, ReplicationOutput};
use crate::workers::base::{ReplicationWorker, WorkerState};
use crate::workers::policy::AttemptFailure;
use crate::workers::replication::{
    Flow, ReplicationTasks, ReplicationWorkerCore, ReplicationWorkerHelper, SinkDelivery, Strategy,
};

/// Replication worker buffering the source output.
///
/// The task reading the source pushes records and states into a bounded queue which is drained
/// by a dedicated writer task. When the queue is full the source pump waits, which bounds the
/// memory used by the attempt.
#[derive(Debug)]
pub struct BufferedReplicationWorker<S, D, P, U> {
    core: ReplicationWorkerCore<S, D, P, U>,
}

impl<S, D, P, U> BufferedReplicationWorker<S, D, P, U>
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

impl<S, D, P, U> ReplicationWorker for BufferedReplicationWorker<S, D, P, U>
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
        self.core.run(input, job_root, Strategy::Buffered).await
    }

    fn cancel(&self) {
        self.core.cancel();
    }

    fn state(&self) -> WorkerState {
        self.core.state()
    }
}

/// Item flowing from the source pump to the destination writer.
#[derive(Debug)]
enum QueueItem {
    Message(Message),
    /// The source finished on its own and everything it emitted was queued.
    ///
    /// The sender completes once the destination was notified of the end of input.
    EndOfInput(oneshot::Sender<()>),
}

/// Delivers messages by pushing them into the queue.
struct QueueDelivery<P, U> {
    tx: mpsc::Sender<QueueItem>,
    helper: Arc<ReplicationWorkerHelper<P, U>>,
}

impl<P, U> QueueDelivery<P, U> {
    async fn push(&mut self, item: QueueItem) -> Result<Flow, AttemptFailure> {
        let result = tokio::select! {
            biased;

            _ = self.helper.shutdown_rx().wait_for_shutdown() => return Ok(Flow::Aborted),
            result = self.tx.send(item) => result,
        };

        match result {
            Ok(()) => Ok(Flow::Continue),
            Err(_) if self.helper.is_aborted() => Ok(Flow::Aborted),
            Err(_) => Err(AttemptFailure::Replication(replication_error!(
                ErrorKind::QueueClosed,
                "Destination writer stopped before the source finished"
            ))),
        }
    }
}

impl<P, U> SinkDelivery for QueueDelivery<P, U>
where
    P: Send + Sync,
    U: Send + Sync,
{
    async fn deliver(&mut self, message: Message) -> Result<Flow, AttemptFailure> {
        self.push(QueueItem::Message(message)).await
    }

    /// Queues the end of input and waits for the writer to drain the queue and notify the
    /// destination, so that the source exit is only checked once everything was delivered.
    async fn end_of_input(&mut self) -> Result<Flow, AttemptFailure> {
        let (drained_tx, drained_rx) = oneshot::channel();
        if self.push(QueueItem::EndOfInput(drained_tx)).await? == Flow::Aborted {
            return Ok(Flow::Aborted);
        }

        tokio::select! {
            biased;

            _ = self.helper.shutdown_rx().wait_for_shutdown() => Ok(Flow::Aborted),
            drained = drained_rx => match drained {
                Ok(()) => Ok(Flow::Continue),
                // The writer stopped before notifying the destination and reports why itself.
                Err(_) => Ok(Flow::Aborted),
            },
        }
    }
}

/// Drains the queue into the destination until the end of input is reached.
async fn write_to_destination<D, P, U>(
    sink: &D,
    helper: &ReplicationWorkerHelper<P, U>,
    mut rx: mpsc::Receiver<QueueItem>,
) -> Result<(), AttemptFailure>
where
    D: MessageSink + Sync,
    P: EventPublisher + Send + Sync,
    U: ConnectorConfigUpdater + Send + Sync,
{
    let mut written = 0u64;
    loop {
        let item = tokio::select! {
            biased;

            _ = helper.shutdown_rx().wait_for_shutdown() => {
                debug!(written, "destination writer stopped since the replication was aborted");
                return Ok(());
            }
            item = rx.recv() => item,
        };

        match item {
            Some(QueueItem::Message(message)) => {
                if helper.accept(sink, message).await? == Flow::Aborted {
                    return Ok(());
                }
                written += 1;
            }
            Some(QueueItem::EndOfInput(drained_tx)) => {
                debug!(written, "destination writer drained the queue");
                if helper.notify_end_of_input(sink).await? == Flow::Continue {
                    let _ = drained_tx.send(());
                }

                return Ok(());
            }
            None => return Ok(()),
        }
    }
}

/// Spawns the source pump, the destination writer guarded by the destination timeout, and the
/// sink pump.
pub(crate) fn spawn_pumps<S, D, P, U>(
    tasks: &mut ReplicationTasks,
    source: S,
    sink: D,
    helper: &Arc<ReplicationWorkerHelper<P, U>>,
    queue_capacity: usize,
) where
    S: MessageSource + Send + Sync + 'static,
    D: MessageSink + Clone + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
    U: ConnectorConfigUpdater + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel(queue_capacity);

    let delivery = QueueDelivery {
        tx,
        helper: helper.clone(),
    };
    let source_helper = helper.clone();
    tasks.spawn(
        "source_pump",
        async move {
            source_helper.run_source_pump(&source, delivery).await;
        }
        .instrument(info_span!("source_pump")),
    );

    let writer_sink = sink.clone();
    let writer_helper = helper.clone();
    tasks.spawn(
        "destination_writer",
        async move {
            let writer = write_to_destination(&writer_sink, &writer_helper, rx);
            match writer_helper.destination_timeout().run_with_timeout(writer).await {
                Ok(Ok(())) => {}
                Ok(Err(failure)) => writer_helper.track_failure(failure),
                Err(timeout) => {
                    writer_helper.track_failure(AttemptFailure::DestinationTimeout(timeout))
                }
            }
        }
        .instrument(info_span!("destination_writer")),
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
