//! Driver shared by the replication strategies.
//!
//! [`ReplicationWorkerCore`] owns the lifecycle of an attempt: it starts the peers, lets the
//! strategy spawn its pumps, joins them, tears the peers down and assembles the output. Messages
//! are processed by [`ReplicationWorkerHelper`], identically for both strategies.

use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use config::shared::ReplicationWorkerConfig;
use metrics::counter;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

use crate::{bail, replication_error};
use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use crate::connector::{MessageSink, MessageSource};
use crate::error::{ErrorKind, ReplicationError, ReplicationResult};
use crate::events::{ConnectorConfigUpdater, EventPublisher, IncompleteCause};
#[cfg(feature = "failpoints")]
use crate::failpoints::{REPLICATION_OUTPUT_STATS, replication_fail_point};
use crate::mapper::Mapper;
use crate::metrics::{
    FAILURE_ORIGIN_LABEL, REPLICATION_ATTEMPTS_TOTAL, REPLICATION_CONFIG_UPDATE_FAILURES_TOTAL,
    REPLICATION_DESTINATION_STATES_TOTAL, REPLICATION_FAILURES_TOTAL,
    REPLICATION_RECORDS_READ_TOTAL, REPLICATION_SOURCE_STATES_TOTAL, STATUS_LABEL,
};
use crate::monitors::{DestinationTimeoutMonitor, HeartbeatMonitor, HeartbeatTimeoutChaperone};
use crate::selector::{FieldSelector, RecordSchemaValidator};
use crate::tracker::{MessageTracker, Phase};
use crate::types::{
    ConfiguredCatalog, ControlKind, ControlMessage, DestinationStartConfig, FailureOrigin,
    FailureReason, LogLevel, LogMessage, MAX_FAILURES_TO_KEEP, Message, MessageOrigin,
    ReplicationAttemptSummary, ReplicationContext, ReplicationInput, ReplicationOutput,
    ReplicationStatus, SourceStartConfig, TraceKind,
};
use crate::workers::base::WorkerState;
use crate::workers::policy::AttemptFailure;
use crate::workers::{buffered, direct};

/// Number of records read from the source between two progress logs.
const PROGRESS_LOG_INTERVAL: u64 = 5_000;

/// Strategy used to deliver messages to the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Strategy {
    Direct,
    Buffered,
}

impl Strategy {
    fn as_str(self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::Buffered => "buffered",
        }
    }
}

/// Outcome of a peer call raced against the shutdown signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Aborted,
}

/// How a pump loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PumpExit {
    /// The peer finished on its own.
    Finished,
    /// The attempt was aborted while the peer was still running.
    Aborted,
}

/// Delivery of the messages read from the source, which is what tells the strategies apart.
pub(crate) trait SinkDelivery: Send {
    /// Hands a record or a state over to the destination side.
    fn deliver(
        &mut self,
        message: Message,
    ) -> impl Future<Output = Result<Flow, AttemptFailure>> + Send;

    /// Signals that the source finished on its own.
    fn end_of_input(&mut self) -> impl Future<Output = Result<Flow, AttemptFailure>> + Send;
}

/// State and message processing shared by every task of an attempt.
pub(crate) struct ReplicationWorkerHelper<P, U> {
    context: ReplicationContext,
    tracker: MessageTracker,
    field_selector: FieldSelector,
    mapper: Arc<dyn Mapper>,
    publisher: P,
    config_updater: U,
    heartbeat_monitor: Arc<HeartbeatMonitor>,
    chaperone: HeartbeatTimeoutChaperone,
    destination_timeout: DestinationTimeoutMonitor,
    shutdown_tx: ShutdownTx,
    shutdown_rx: ShutdownRx,
    failures: Mutex<Vec<FailureReason>>,
    records_read: AtomicU64,
}

impl<P, U> ReplicationWorkerHelper<P, U> {
    pub(crate) fn is_aborted(&self) -> bool {
        self.shutdown_rx.is_shutdown()
    }

    pub(crate) fn shutdown_rx(&self) -> &ShutdownRx {
        &self.shutdown_rx
    }

    pub(crate) fn destination_timeout(&self) -> &DestinationTimeoutMonitor {
        &self.destination_timeout
    }

    pub(crate) fn tracker(&self) -> &MessageTracker {
        &self.tracker
    }

    /// Records the first failure of the attempt and aborts it.
    ///
    /// Failures observed once the attempt is aborted are consequences of the abort and are only
    /// logged.
    pub(crate) fn track_failure(&self, failure: AttemptFailure) {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        if self.shutdown_tx.is_shutdown() {
            debug!(%failure, "ignoring failure observed after the replication was aborted");
            return;
        }

        error!(%failure, origin = ?failure.origin(), "replication failed, aborting");
        self.record(&mut failures, &failure);
        self.shutdown_tx.shutdown();
    }

    /// Records a failure to close a peer, unless a failure of the same origin was recorded.
    fn record_close_failure(&self, failure: AttemptFailure) {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let origin = failure.origin();
        if failures
            .iter()
            .any(|recorded| recorded.failure_origin == origin)
        {
            warn!(%failure, "connector failed to close after it already failed");
            return;
        }

        error!(%failure, "connector failed to close");
        self.record(&mut failures, &failure);
    }

    fn record(&self, failures: &mut Vec<FailureReason>, failure: &AttemptFailure) {
        counter!(
            REPLICATION_FAILURES_TOTAL,
            FAILURE_ORIGIN_LABEL => origin_label(failure.origin()),
        )
        .increment(1);

        failures.push(failure.to_failure_reason(self.context.job_id, self.context.attempt_number));
    }

    fn has_failures(&self) -> bool {
        !self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    fn failures(&self) -> Vec<FailureReason> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Assembles the output of the attempt from the tracked stats and the recorded failures.
    fn build_output(
        &self,
        status: ReplicationStatus,
        start_time: i64,
        output_catalog: ConfiguredCatalog,
    ) -> ReplicationResult<ReplicationOutput> {
        #[cfg(feature = "failpoints")]
        replication_fail_point(REPLICATION_OUTPUT_STATS)?;

        self.tracker.stats().mark(Phase::ReplicationEnd);

        let has_replication_completed = status == ReplicationStatus::Completed;
        let total_stats = self.tracker.total_stats(has_replication_completed)?;
        let stream_stats = self.tracker.stream_stats(has_replication_completed)?;

        let mut failures = Vec::new();
        if !has_replication_completed {
            failures.extend(
                self.tracker
                    .error_trace_message_failure(self.context.job_id, self.context.attempt_number),
            );
        }
        failures.extend(self.failures());
        failures.truncate(MAX_FAILURES_TO_KEEP);

        let states = self.tracker.output_states()?;

        Ok(ReplicationOutput {
            summary: ReplicationAttemptSummary {
                status,
                records_synced: total_stats.records_committed,
                bytes_synced: total_stats.bytes_committed,
                start_time,
                end_time: chrono::Utc::now().timestamp_millis(),
                total_stats,
                stream_stats,
            },
            failures,
            output_catalog,
            state: (!states.is_empty()).then_some(states),
        })
    }
}

impl<P, U> ReplicationWorkerHelper<P, U>
where
    P: EventPublisher + Send + Sync,
    U: ConnectorConfigUpdater + Send + Sync,
{
    /// Processes a message read from the source.
    ///
    /// Returns the message to deliver to the destination, if any. Only records and states are
    /// delivered; every other message is consumed here.
    pub(crate) async fn process_from_source(
        &self,
        message: Message,
    ) -> Result<Option<Message>, AttemptFailure> {
        let message = match message {
            Message::Record(record) => {
                let record = self.field_selector.filter_selected_fields(record);
                self.field_selector.validate_schema(&record);
                self.log_progress();

                Message::Record(record)
            }
            message => message,
        };

        let message = self
            .tracker
            .accept_from_source(message)
            .map_err(AttemptFailure::Replication)?;

        match message {
            Message::Record(_) => Ok(Some(self.mapper.map_message(message))),
            Message::State(_) => {
                counter!(REPLICATION_SOURCE_STATES_TOTAL).increment(1);
                Ok(Some(self.mapper.map_message(message)))
            }
            Message::Log(log) => {
                relog(MessageOrigin::Source, &log);
                Ok(None)
            }
            Message::Trace(_) => {
                self.publish_stream_status(MessageOrigin::Source, &message)
                    .await;
                Ok(None)
            }
            Message::Control(control) => {
                self.update_connector_config(MessageOrigin::Source, &control)
                    .await;
                Ok(None)
            }
        }
    }

    /// Processes a message read from the destination.
    pub(crate) async fn process_from_destination(
        &self,
        message: Message,
    ) -> Result<(), AttemptFailure> {
        let message = self.mapper.revert_map(message);
        self.tracker
            .accept_from_destination(&message)
            .map_err(AttemptFailure::Replication)?;

        match &message {
            Message::State(state) => {
                counter!(REPLICATION_DESTINATION_STATES_TOTAL).increment(1);
                trace!(checkpoint_id = ?state.id, "destination committed state");
            }
            Message::Log(log) => relog(MessageOrigin::Destination, log),
            Message::Trace(_) => {
                self.publish_stream_status(MessageOrigin::Destination, &message)
                    .await
            }
            Message::Control(control) => {
                self.update_connector_config(MessageOrigin::Destination, control)
                    .await
            }
            Message::Record(_) => {
                warn!("ignoring record emitted by the destination");
            }
        }

        Ok(())
    }

    /// Reads the source until it finishes or the attempt is aborted, delivering what it emits.
    pub(crate) async fn read_source<S, T>(
        &self,
        source: &S,
        delivery: &mut T,
    ) -> Result<PumpExit, AttemptFailure>
    where
        S: MessageSource + Sync,
        T: SinkDelivery,
    {
        loop {
            if self.is_aborted() {
                return Ok(PumpExit::Aborted);
            }
            if source.is_finished() {
                return Ok(PumpExit::Finished);
            }

            self.heartbeat_monitor.beat();
            let read = tokio::select! {
                biased;

                _ = self.shutdown_rx.wait_for_shutdown() => return Ok(PumpExit::Aborted),
                read = source.attempt_read() => read,
            };

            let Some(message) = read.map_err(AttemptFailure::Source)? else {
                tokio::task::yield_now().await;
                continue;
            };

            if let Some(message) = self.process_from_source(message).await? {
                if delivery.deliver(message).await? == Flow::Aborted {
                    return Ok(PumpExit::Aborted);
                }
                self.heartbeat_monitor.beat();
            }
        }
    }

    /// Reads the source under the heartbeat chaperone, then signals the end of input and checks
    /// how the source exited.
    pub(crate) async fn run_source_pump<S, T>(&self, source: &S, mut delivery: T)
    where
        S: MessageSource + Sync,
        T: SinkDelivery,
    {
        self.tracker.stats().mark(Phase::SourceReadStart);

        let exit = match self
            .chaperone
            .run_with_heartbeat(self.read_source(source, &mut delivery))
            .await
        {
            Ok(Ok(exit)) => exit,
            Ok(Err(failure)) => return self.track_failure(failure),
            Err(timeout) => return self.track_failure(AttemptFailure::HeartbeatTimeout(timeout)),
        };
        if exit == PumpExit::Aborted {
            debug!("source pump stopped since the replication was aborted");
            return;
        }

        self.tracker.stats().mark(Phase::SourceReadEnd);
        info!(
            records = self.records_read.load(Ordering::Relaxed),
            "source finished emitting messages"
        );

        match delivery.end_of_input().await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Aborted) => return,
            Err(failure) => return self.track_failure(failure),
        }

        match source.exit_value() {
            Ok(0) => {}
            Ok(exit_value) => self.track_failure(AttemptFailure::Source(
                replication_error!(
                    ErrorKind::SourceExitedWithError,
                    "Source exited with a non-zero code",
                    format!("exit code {exit_value}")
                ),
            )),
            Err(err) => self.track_failure(AttemptFailure::Source(err)),
        }
    }

    /// Reads the destination until it finishes or the attempt is aborted, then checks how the
    /// destination exited.
    pub(crate) async fn run_sink_pump<D>(&self, sink: &D)
    where
        D: MessageSink + Sync,
    {
        self.tracker.stats().mark(Phase::DestinationWriteStart);

        loop {
            if self.is_aborted() {
                debug!("sink pump stopped since the replication was aborted");
                return;
            }
            if sink.is_finished() {
                break;
            }

            let read = tokio::select! {
                biased;

                _ = self.shutdown_rx.wait_for_shutdown() => continue,
                read = sink.attempt_read() => read,
            };

            match read {
                Ok(Some(message)) => {
                    if let Err(failure) = self.process_from_destination(message).await {
                        return self.track_failure(failure);
                    }
                }
                Ok(None) => tokio::task::yield_now().await,
                Err(err) => return self.track_failure(AttemptFailure::Destination(err)),
            }
        }

        self.tracker.stats().mark(Phase::DestinationWriteEnd);
        info!("destination finished");

        match sink.exit_value() {
            Ok(0) => {}
            Ok(exit_value) => self.track_failure(AttemptFailure::Destination(
                replication_error!(
                    ErrorKind::DestinationExitedWithError,
                    "Destination exited with a non-zero code",
                    format!("exit code {exit_value}")
                ),
            )),
            Err(err) => self.track_failure(AttemptFailure::Destination(err)),
        }
    }

    /// Delivers a message to the destination under the destination timeout.
    pub(crate) async fn accept<D>(&self, sink: &D, message: Message) -> Result<Flow, AttemptFailure>
    where
        D: MessageSink + Sync,
    {
        self.destination_timeout.start_accept_timer();
        let result = tokio::select! {
            biased;

            _ = self.shutdown_rx.wait_for_shutdown() => None,
            result = sink.accept(message) => Some(result),
        };
        self.destination_timeout.reset_accept_timer();

        match result {
            None => Ok(Flow::Aborted),
            Some(Ok(())) => Ok(Flow::Continue),
            Some(Err(err)) => Err(AttemptFailure::Destination(err)),
        }
    }

    /// Signals the end of input to the destination under the destination timeout.
    ///
    /// The destination is never notified once the attempt is aborted.
    pub(crate) async fn notify_end_of_input<D>(&self, sink: &D) -> Result<Flow, AttemptFailure>
    where
        D: MessageSink + Sync,
    {
        if self.is_aborted() {
            return Ok(Flow::Aborted);
        }

        self.destination_timeout.start_notify_end_of_input_timer();
        let result = tokio::select! {
            biased;

            _ = self.shutdown_rx.wait_for_shutdown() => None,
            result = sink.notify_end_of_input() => Some(result),
        };
        self.destination_timeout.reset_notify_end_of_input_timer();

        match result {
            None => Ok(Flow::Aborted),
            Some(Ok(())) => {
                debug!("notified destination of the end of input");
                Ok(Flow::Continue)
            }
            Some(Err(err)) => Err(AttemptFailure::Destination(err)),
        }
    }

    fn log_progress(&self) {
        counter!(REPLICATION_RECORDS_READ_TOTAL).increment(1);

        let records_read = self.records_read.fetch_add(1, Ordering::Relaxed) + 1;
        if records_read % PROGRESS_LOG_INTERVAL == 0 {
            info!(records = records_read, "records read from source");
        }
    }

    async fn publish_stream_status(&self, origin: MessageOrigin, message: &Message) {
        let Message::Trace(trace) = message else {
            return;
        };
        let TraceKind::StreamStatus(status) = &trace.kind else {
            return;
        };

        if let Err(err) = self
            .publisher
            .publish_status_event(origin, message, &self.context)
            .await
        {
            warn!(
                stream = %status.stream,
                status = ?status.status,
                ?origin,
                error = %err,
                "failed to publish stream status event"
            );
        }
    }

    async fn update_connector_config(&self, origin: MessageOrigin, control: &ControlMessage) {
        let ControlKind::ConnectorConfig { config } = &control.kind;

        let result = match origin {
            MessageOrigin::Source => {
                info!("source emitted an updated configuration");
                self.config_updater
                    .update_source(self.context.source_id, config.clone())
                    .await
            }
            MessageOrigin::Destination => {
                info!("destination emitted an updated configuration");
                self.config_updater
                    .update_destination(self.context.destination_id, config.clone())
                    .await
            }
            MessageOrigin::Internal => return,
        };

        if let Err(err) = result {
            counter!(REPLICATION_CONFIG_UPDATE_FAILURES_TOTAL).increment(1);
            warn!(?origin, error = %err, "failed to persist updated connector configuration");
        }
    }

    async fn publish_end_of_replication(
        &self,
        catalog: &ConfiguredCatalog,
        status: ReplicationStatus,
    ) {
        for stream in catalog.descriptors() {
            let result = match status {
                ReplicationStatus::Completed => {
                    self.publisher
                        .publish_complete_status_event(
                            stream,
                            &self.context,
                            MessageOrigin::Internal,
                        )
                        .await
                }
                ReplicationStatus::Failed => {
                    self.publisher
                        .publish_incomplete_status_event(
                            stream,
                            &self.context,
                            MessageOrigin::Internal,
                            IncompleteCause::Failed,
                        )
                        .await
                }
                ReplicationStatus::Cancelled => {
                    self.publisher
                        .publish_incomplete_status_event(
                            stream,
                            &self.context,
                            MessageOrigin::Internal,
                            IncompleteCause::Canceled,
                        )
                        .await
                }
            };

            if let Err(err) = result {
                warn!(%stream, %status, error = %err, "failed to publish end of replication event");
            }
        }
    }
}

/// Tasks spawned for an attempt.
///
/// Every task resolves to its name so that its completion can be logged.
pub(crate) struct ReplicationTasks {
    tasks: JoinSet<&'static str>,
}

impl ReplicationTasks {
    fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
        }
    }

    pub(crate) fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(async move {
            future.await;
            name
        });
    }

    /// Waits for every task to finish.
    ///
    /// Once the attempt is aborted, tasks get `grace_period` to observe it before being aborted.
    async fn join<P, U>(mut self, helper: &ReplicationWorkerHelper<P, U>, grace_period: Duration) {
        let mut deadline = None;
        loop {
            let next = match deadline {
                Some(deadline) => {
                    let joined = tokio::time::timeout_at(deadline, self.tasks.join_next()).await;
                    match joined {
                        Ok(next) => next,
                        Err(_) => {
                            warn!(
                                remaining = self.tasks.len(),
                                ?grace_period,
                                "replication tasks did not stop within the grace period, aborting them"
                            );
                            self.tasks.abort_all();
                            while self.tasks.join_next().await.is_some() {}

                            return;
                        }
                    }
                }
                None => tokio::select! {
                    biased;

                    next = self.tasks.join_next() => next,
                    _ = helper.shutdown_rx.wait_for_shutdown() => {
                        deadline = Some(Instant::now() + grace_period);
                        continue;
                    }
                },
            };

            match next {
                None => return,
                Some(Ok(name)) => debug!(task = name, "replication task finished"),
                Some(Err(err)) if err.is_panic() => {
                    helper.track_failure(AttemptFailure::Replication(err.into()));
                }
                Some(Err(err)) => debug!(error = %err, "replication task was cancelled"),
            }
        }
    }
}

/// Lifecycle and peers of a replication worker, shared by both strategies.
#[derive(Debug)]
pub(crate) struct ReplicationWorkerCore<S, D, P, U> {
    source: S,
    sink: D,
    publisher: P,
    config_updater: U,
    mapper: Arc<dyn Mapper>,
    config: ReplicationWorkerConfig,
    state: Mutex<WorkerState>,
    cancelled: AtomicBool,
    shutdown_tx: ShutdownTx,
    shutdown_rx: ShutdownRx,
}

impl<S, D, P, U> ReplicationWorkerCore<S, D, P, U>
where
    S: MessageSource + Clone + Send + Sync + 'static,
    D: MessageSink + Clone + Send + Sync + 'static,
    P: EventPublisher + Clone + Send + Sync + 'static,
    U: ConnectorConfigUpdater + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        source: S,
        sink: D,
        publisher: P,
        config_updater: U,
        mapper: Arc<dyn Mapper>,
        config: ReplicationWorkerConfig,
    ) -> ReplicationResult<Self> {
        config.validate()?;

        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        Ok(Self {
            source,
            sink,
            publisher,
            config_updater,
            mapper,
            config,
            state: Mutex::new(WorkerState::NotStarted),
            cancelled: AtomicBool::new(false),
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub(crate) fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Requests the running attempt to stop.
    ///
    /// The flag is set under the state lock, so it is either observed when the pumps stop or the
    /// cancellation is ignored.
    pub(crate) fn cancel(&self) {
        {
            let guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let state = *guard;
            if state != WorkerState::Running {
                info!(%state, "ignoring cancellation of a replication worker which is not running");
                return;
            }

            if self.cancelled.swap(true, Ordering::AcqRel) {
                return;
            }
        }

        info!("cancelling replication");
        self.shutdown_tx.shutdown();
    }

    /// Leaves the running state and returns whether the attempt was cancelled while running.
    fn stop_running(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = WorkerState::Stopping;

        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) async fn run(
        &self,
        input: ReplicationInput,
        job_root: &Path,
        strategy: Strategy,
    ) -> ReplicationResult<ReplicationOutput> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != WorkerState::NotStarted {
                bail!(
                    ErrorKind::InvalidState,
                    "Replication worker can only be run once",
                    format!("the worker is {state}")
                );
            }
            *state = WorkerState::Starting;
        }

        let context = ReplicationContext::from(&input);
        let span = info_span!(
            "replication_worker",
            job_id = context.job_id,
            attempt_number = context.attempt_number,
            connection_id = %context.connection_id,
            strategy = strategy.as_str(),
        );

        let result = self
            .run_attempt(input, context, job_root, strategy)
            .instrument(span)
            .await;

        let state = match &result {
            Ok(output) => WorkerState::from(output.status()),
            Err(_) => WorkerState::Failed,
        };
        self.set_state(state);

        result
    }

    async fn run_attempt(
        &self,
        input: ReplicationInput,
        context: ReplicationContext,
        job_root: &Path,
        strategy: Strategy,
    ) -> ReplicationResult<ReplicationOutput> {
        let start_time = chrono::Utc::now().timestamp_millis();
        let helper = Arc::new(self.build_helper(&input, context));
        helper.tracker.stats().mark(Phase::ReplicationStart);

        let output_catalog = self.mapper.map_catalog(&input.catalog);
        let source_config = SourceStartConfig::from(&input);
        let destination_config = DestinationStartConfig {
            destination_id: input.destination_id,
            configuration: input.destination_configuration.clone(),
            catalog: output_catalog.clone(),
        };

        info!(
            streams = input.catalog.streams.len(),
            is_reset = input.is_reset,
            "starting replication"
        );

        if self
            .start_peers(&helper, &source_config, &destination_config, job_root)
            .await
        {
            self.set_state(WorkerState::Running);

            let mut tasks = ReplicationTasks::new();
            match strategy {
                Strategy::Direct => direct::spawn_pumps(
                    &mut tasks,
                    self.source.clone(),
                    self.sink.clone(),
                    &helper,
                ),
                Strategy::Buffered => buffered::spawn_pumps(
                    &mut tasks,
                    self.source.clone(),
                    self.sink.clone(),
                    &helper,
                    self.config.buffer.source_queue_capacity,
                ),
            }

            tasks
                .join(&helper, self.config.shutdown_grace_period())
                .await;
        }

        let cancelled = self.stop_running();

        helper.field_selector.shutdown();
        self.close_peers(&helper, cancelled).await;

        let status = if cancelled {
            ReplicationStatus::Cancelled
        } else if helper.has_failures() {
            ReplicationStatus::Failed
        } else {
            ReplicationStatus::Completed
        };

        helper
            .publish_end_of_replication(&input.catalog, status)
            .await;
        helper.field_selector.report_validation_errors();

        let output = helper.build_output(status, start_time, output_catalog)?;

        counter!(REPLICATION_ATTEMPTS_TOTAL, STATUS_LABEL => status.to_string()).increment(1);
        info!(
            %status,
            records_synced = output.summary.records_synced,
            bytes_synced = output.summary.bytes_synced,
            failures = output.failures.len(),
            "replication finished"
        );
        info!(
            summary = %serde_json::to_string(&output.summary)?,
            "sync summary"
        );

        Ok(output)
    }

    fn build_helper(
        &self,
        input: &ReplicationInput,
        context: ReplicationContext,
    ) -> ReplicationWorkerHelper<P, U> {
        let validator = self
            .config
            .validation
            .enabled
            .then(|| RecordSchemaValidator::new(&input.catalog, &self.config.validation));
        let field_selector = FieldSelector::new(
            &input.catalog,
            self.config.field_selection_enabled,
            validator,
        );

        let heartbeat_monitor = Arc::new(HeartbeatMonitor::new(self.config.heartbeat.threshold()));
        let chaperone = HeartbeatTimeoutChaperone::new(
            heartbeat_monitor.clone(),
            &self.config.heartbeat,
            self.shutdown_rx.clone(),
        );
        let destination_timeout = DestinationTimeoutMonitor::new(
            &self.config.destination_timeout,
            self.shutdown_rx.clone(),
        );

        ReplicationWorkerHelper {
            context,
            tracker: MessageTracker::new(),
            field_selector,
            mapper: self.mapper.clone(),
            publisher: self.publisher.clone(),
            config_updater: self.config_updater.clone(),
            heartbeat_monitor,
            chaperone,
            destination_timeout,
            shutdown_tx: self.shutdown_tx.clone(),
            shutdown_rx: self.shutdown_rx.clone(),
            failures: Mutex::new(Vec::new()),
            records_read: AtomicU64::new(0),
        }
    }

    /// Starts both peers concurrently and returns whether the pumps can run.
    async fn start_peers(
        &self,
        helper: &ReplicationWorkerHelper<P, U>,
        source_config: &SourceStartConfig,
        destination_config: &DestinationStartConfig,
        job_root: &Path,
    ) -> bool {
        let started = tokio::try_join!(
            async {
                self.sink
                    .start(destination_config, job_root)
                    .await
                    .map_err(AttemptFailure::Destination)
            },
            async {
                self.source
                    .start(source_config, job_root)
                    .await
                    .map_err(AttemptFailure::Source)
            },
        );

        match started {
            Ok(_) => {
                info!("connectors started");
                true
            }
            Err(failure) => {
                helper.track_failure(failure);
                false
            }
        }
    }

    /// Closes the source, then the destination.
    ///
    /// Cancelled attempts cancel the peers instead and never record failures doing so.
    async fn close_peers(&self, helper: &ReplicationWorkerHelper<P, U>, cancelled: bool) {
        let close_timeout = self.config.close_timeout();

        if cancelled {
            let errors: Vec<ReplicationError> = [
                bounded(close_timeout, self.source.cancel()).await,
                bounded(close_timeout, self.sink.cancel()).await,
            ]
            .into_iter()
            .filter_map(Result::err)
            .collect();
            if !errors.is_empty() {
                let err = ReplicationError::from(errors);
                warn!(error = %err, "failed to cancel connectors");
            }

            return;
        }

        if let Err(err) = bounded(close_timeout, self.source.close()).await {
            helper.record_close_failure(AttemptFailure::Source(err));
        }
        if let Err(err) = bounded(close_timeout, self.sink.close()).await {
            helper.record_close_failure(AttemptFailure::Destination(err));
        }
    }
}

/// Runs a peer teardown call for at most `limit`.
async fn bounded<F>(limit: Duration, future: F) -> ReplicationResult<()>
where
    F: Future<Output = ReplicationResult<()>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => bail!(
            ErrorKind::ConnectorCloseTimeout,
            "Connector did not terminate in time",
            format!("no answer after {limit:?}")
        ),
    }
}

/// Logs a connector log line at its level.
fn relog(origin: MessageOrigin, log: &LogMessage) {
    let message = log.message.as_str();
    match log.level {
        LogLevel::Fatal | LogLevel::Error => error!(?origin, "{message}"),
        LogLevel::Warn => warn!(?origin, "{message}"),
        LogLevel::Info => info!(?origin, "{message}"),
        LogLevel::Debug => debug!(?origin, "{message}"),
        LogLevel::Trace => trace!(?origin, "{message}"),
    }
}

fn origin_label(origin: FailureOrigin) -> &'static str {
    match origin {
        FailureOrigin::Source => "source",
        FailureOrigin::Destination => "destination",
        FailureOrigin::Replication => "replication",
    }
}
