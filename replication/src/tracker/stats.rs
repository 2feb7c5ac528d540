use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{ErrorKind, ReplicationResult};
use crate::types::{StateMessage, StateScope, StreamDescriptor, StreamSyncStats, SyncStats};

/// Running max and mean of a series of durations.
#[derive(Debug, Default, Clone, Copy)]
struct TimingStats {
    max: Duration,
    total: Duration,
    count: u32,
}

impl TimingStats {
    fn record(&mut self, elapsed: Duration) {
        self.max = self.max.max(elapsed);
        self.total += elapsed;
        self.count += 1;
    }

    fn max_seconds(&self) -> Option<u64> {
        (self.count > 0).then(|| self.max.as_secs())
    }

    fn mean_seconds(&self) -> Option<u64> {
        (self.count > 0).then(|| (self.total / self.count).as_secs())
    }
}

/// Counts emitted since a previous checkpoint, waiting for the destination to commit them.
#[derive(Debug)]
struct PendingCheckpoint {
    id: u64,
    data: Value,
    records: u64,
    bytes: u64,
    staged_at: Instant,
}

/// Checkpoint bookkeeping of a stream, kept behind a lock since it is only touched by states.
#[derive(Debug)]
struct StreamCheckpoints {
    records_at_last_checkpoint: u64,
    bytes_at_last_checkpoint: u64,
    pending: VecDeque<PendingCheckpoint>,
    last_source_state_at: Instant,
    before_source_state: TimingStats,
    emitted_to_committed: TimingStats,
    estimated_records: Option<u64>,
    estimated_bytes: Option<u64>,
}

impl StreamCheckpoints {
    fn new(now: Instant) -> Self {
        Self {
            records_at_last_checkpoint: 0,
            bytes_at_last_checkpoint: 0,
            pending: VecDeque::new(),
            last_source_state_at: now,
            before_source_state: TimingStats::default(),
            emitted_to_committed: TimingStats::default(),
            estimated_records: None,
            estimated_bytes: None,
        }
    }
}

/// Stats of a single stream.
///
/// Record counters are atomics since they are updated for every record on the hot path.
#[derive(Debug)]
struct StreamStats {
    records_emitted: AtomicU64,
    bytes_emitted: AtomicU64,
    records_committed: AtomicU64,
    bytes_committed: AtomicU64,
    source_states: AtomicU64,
    destination_states: AtomicU64,
    checkpoints: Mutex<StreamCheckpoints>,
}

impl StreamStats {
    fn new(now: Instant) -> Self {
        Self {
            records_emitted: AtomicU64::new(0),
            bytes_emitted: AtomicU64::new(0),
            records_committed: AtomicU64::new(0),
            bytes_committed: AtomicU64::new(0),
            source_states: AtomicU64::new(0),
            destination_states: AtomicU64::new(0),
            checkpoints: Mutex::new(StreamCheckpoints::new(now)),
        }
    }
}

/// Key under which the last committed state of a scope is kept.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum ScopeKey {
    Stream(StreamDescriptor),
    Global,
    Legacy,
}

impl From<&StateScope> for ScopeKey {
    fn from(scope: &StateScope) -> Self {
        match scope {
            StateScope::Stream(stream) => ScopeKey::Stream(stream.clone()),
            StateScope::Global(_) => ScopeKey::Global,
            StateScope::Legacy => ScopeKey::Legacy,
        }
    }
}

/// Phase timestamps in epoch milliseconds, `0` meaning not reached yet.
#[derive(Debug, Default)]
struct PhaseTimestamps {
    replication_start: AtomicI64,
    replication_end: AtomicI64,
    source_read_start: AtomicI64,
    source_read_end: AtomicI64,
    destination_write_start: AtomicI64,
    destination_write_end: AtomicI64,
}

/// A phase of the attempt whose start or end is stamped in the total stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ReplicationStart,
    ReplicationEnd,
    SourceReadStart,
    SourceReadEnd,
    DestinationWriteStart,
    DestinationWriteEnd,
}

/// Aggregates emitted and committed stats per stream.
#[derive(Debug)]
pub struct SyncStatsTracker {
    streams: RwLock<BTreeMap<StreamDescriptor, Arc<StreamStats>>>,
    next_checkpoint_id: AtomicU64,
    source_states: AtomicU64,
    destination_states: AtomicU64,
    totals: Mutex<TotalTimings>,
    output_states: Mutex<BTreeMap<ScopeKey, StateMessage>>,
    phases: PhaseTimestamps,
}

#[derive(Debug)]
struct TotalTimings {
    last_source_state_at: Instant,
    before_source_state: TimingStats,
    emitted_to_committed: TimingStats,
}

impl Default for SyncStatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStatsTracker {
    pub fn new() -> Self {
        Self {
            streams: RwLock::new(BTreeMap::new()),
            next_checkpoint_id: AtomicU64::new(1),
            source_states: AtomicU64::new(0),
            destination_states: AtomicU64::new(0),
            totals: Mutex::new(TotalTimings {
                last_source_state_at: Instant::now(),
                before_source_state: TimingStats::default(),
                emitted_to_committed: TimingStats::default(),
            }),
            output_states: Mutex::new(BTreeMap::new()),
            phases: PhaseTimestamps::default(),
        }
    }

    /// Records a record of `bytes` serialized bytes emitted by the source.
    pub fn update_stats_from_record(
        &self,
        stream: &StreamDescriptor,
        bytes: u64,
    ) -> ReplicationResult<()> {
        let stats = self.stream(stream)?;
        stats.records_emitted.fetch_add(1, Ordering::Relaxed);
        stats.bytes_emitted.fetch_add(bytes, Ordering::Relaxed);

        Ok(())
    }

    /// Stages the counts emitted since the previous checkpoint of every stream covered by
    /// `state` and returns the id under which they were staged.
    pub fn stage_source_state(&self, state: &StateMessage) -> ReplicationResult<u64> {
        let id = self.next_checkpoint_id.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();

        for stats in self.covered_streams(&state.scope)? {
            let records = stats.records_emitted.load(Ordering::Relaxed);
            let bytes = stats.bytes_emitted.load(Ordering::Relaxed);
            stats.source_states.fetch_add(1, Ordering::Relaxed);

            let mut checkpoints = lock(&stats.checkpoints, ErrorKind::StatsTrackingFailed)?;
            let elapsed = now.duration_since(checkpoints.last_source_state_at);
            checkpoints.before_source_state.record(elapsed);
            checkpoints.last_source_state_at = now;

            let staged_records = records - checkpoints.records_at_last_checkpoint;
            let staged_bytes = bytes - checkpoints.bytes_at_last_checkpoint;
            checkpoints.records_at_last_checkpoint = records;
            checkpoints.bytes_at_last_checkpoint = bytes;
            checkpoints.pending.push_back(PendingCheckpoint {
                id,
                data: state.data.clone(),
                records: staged_records,
                bytes: staged_bytes,
                staged_at: now,
            });
        }

        self.source_states.fetch_add(1, Ordering::Relaxed);
        let mut totals = lock(&self.totals, ErrorKind::StatsTrackingFailed)?;
        let elapsed = now.duration_since(totals.last_source_state_at);
        totals.before_source_state.record(elapsed);
        totals.last_source_state_at = now;

        Ok(id)
    }

    /// Commits the checkpoints acknowledged by `state` and remembers it as the last state of its
    /// scope.
    ///
    /// Every staged checkpoint up to and including the acknowledged one is committed. A state
    /// without id matches the oldest checkpoint carrying the same data. A state matching no
    /// checkpoint commits nothing.
    pub fn commit_destination_state(&self, state: &StateMessage) -> ReplicationResult<()> {
        self.destination_states.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        let mut matched = false;
        for stats in self.covered_streams(&state.scope)? {
            stats.destination_states.fetch_add(1, Ordering::Relaxed);

            let mut checkpoints = lock(&stats.checkpoints, ErrorKind::StatsTrackingFailed)?;
            let position = checkpoints
                .pending
                .iter()
                .position(|pending| match state.id {
                    Some(id) => pending.id == id,
                    None => pending.data == state.data,
                });
            let Some(position) = position else {
                continue;
            };

            matched = true;
            let mut latency = None;
            for pending in checkpoints.pending.drain(..=position) {
                stats
                    .records_committed
                    .fetch_add(pending.records, Ordering::Relaxed);
                stats
                    .bytes_committed
                    .fetch_add(pending.bytes, Ordering::Relaxed);
                latency = Some(now.duration_since(pending.staged_at));
            }

            if let Some(latency) = latency {
                checkpoints.emitted_to_committed.record(latency);
                lock(&self.totals, ErrorKind::StatsTrackingFailed)?
                    .emitted_to_committed
                    .record(latency);
            }
        }

        if !matched {
            warn!(
                checkpoint_id = ?state.id,
                "destination acknowledged a state matching no staged checkpoint, ignoring it"
            );
        }

        let mut committed = state.clone();
        committed.id = None;
        lock(&self.output_states, ErrorKind::StatsTrackingFailed)?
            .insert(ScopeKey::from(&state.scope), committed);

        Ok(())
    }

    /// Records the volume the source expects to emit for `stream`.
    pub fn update_estimate(
        &self,
        stream: &StreamDescriptor,
        row_estimate: Option<u64>,
        byte_estimate: Option<u64>,
    ) -> ReplicationResult<()> {
        let stats = self.stream(stream)?;
        let mut checkpoints = lock(&stats.checkpoints, ErrorKind::StatsTrackingFailed)?;
        if row_estimate.is_some() {
            checkpoints.estimated_records = row_estimate;
        }
        if byte_estimate.is_some() {
            checkpoints.estimated_bytes = byte_estimate;
        }

        Ok(())
    }

    /// Stamps `phase` with the current time.
    pub fn mark(&self, phase: Phase) {
        let now = chrono::Utc::now().timestamp_millis();
        let slot = match phase {
            Phase::ReplicationStart => &self.phases.replication_start,
            Phase::ReplicationEnd => &self.phases.replication_end,
            Phase::SourceReadStart => &self.phases.source_read_start,
            Phase::SourceReadEnd => &self.phases.source_read_end,
            Phase::DestinationWriteStart => &self.phases.destination_write_start,
            Phase::DestinationWriteEnd => &self.phases.destination_write_end,
        };
        slot.store(now, Ordering::Relaxed);
    }

    /// Returns the aggregated stats of all streams.
    ///
    /// When `has_replication_completed` is set, every emitted record is considered committed.
    pub fn total_stats(&self, has_replication_completed: bool) -> ReplicationResult<SyncStats> {
        let streams = self
            .streams
            .read()
            .map_err(|_| poisoned(ErrorKind::StatsUnavailable))?;

        let mut stats = SyncStats::default();
        for stream_stats in streams.values() {
            let stream = self.snapshot(stream_stats, has_replication_completed)?;
            stats.records_emitted += stream.records_emitted;
            stats.bytes_emitted += stream.bytes_emitted;
            stats.records_committed += stream.records_committed;
            stats.bytes_committed += stream.bytes_committed;
            stats.estimated_records = add_optional(stats.estimated_records, stream.estimated_records);
            stats.estimated_bytes = add_optional(stats.estimated_bytes, stream.estimated_bytes);
        }

        stats.source_state_messages_emitted = self.source_states.load(Ordering::Relaxed);
        stats.destination_state_messages_emitted = self.destination_states.load(Ordering::Relaxed);

        let totals = lock(&self.totals, ErrorKind::StatsUnavailable)?;
        stats.max_seconds_before_source_state_message_emitted =
            totals.before_source_state.max_seconds();
        stats.mean_seconds_before_source_state_message_emitted =
            totals.before_source_state.mean_seconds();
        stats.max_seconds_between_state_message_emitted_and_committed =
            totals.emitted_to_committed.max_seconds();
        stats.mean_seconds_between_state_message_emitted_and_committed =
            totals.emitted_to_committed.mean_seconds();

        stats.replication_start_time = load_phase(&self.phases.replication_start);
        stats.replication_end_time = load_phase(&self.phases.replication_end);
        stats.source_read_start_time = load_phase(&self.phases.source_read_start);
        stats.source_read_end_time = load_phase(&self.phases.source_read_end);
        stats.destination_write_start_time = load_phase(&self.phases.destination_write_start);
        stats.destination_write_end_time = load_phase(&self.phases.destination_write_end);

        Ok(stats)
    }

    /// Returns the stats of every named stream, ordered by stream.
    pub fn stream_stats(
        &self,
        has_replication_completed: bool,
    ) -> ReplicationResult<Vec<StreamSyncStats>> {
        let streams = self
            .streams
            .read()
            .map_err(|_| poisoned(ErrorKind::StatsUnavailable))?;

        let mut result = Vec::with_capacity(streams.len());
        for (descriptor, stream_stats) in streams.iter() {
            if descriptor.name.is_empty() {
                continue;
            }

            result.push(StreamSyncStats {
                stream_name: descriptor.name.clone(),
                stream_namespace: descriptor.namespace.clone(),
                stats: self.snapshot(stream_stats, has_replication_completed)?,
            });
        }

        Ok(result)
    }

    /// Returns the last state committed by the destination for each scope.
    pub fn output_states(&self) -> ReplicationResult<Vec<StateMessage>> {
        let states = lock(&self.output_states, ErrorKind::StatsUnavailable)?;
        Ok(states.values().cloned().collect())
    }

    fn snapshot(
        &self,
        stats: &StreamStats,
        has_replication_completed: bool,
    ) -> ReplicationResult<SyncStats> {
        let records_emitted = stats.records_emitted.load(Ordering::Relaxed);
        let bytes_emitted = stats.bytes_emitted.load(Ordering::Relaxed);
        let (records_committed, bytes_committed) = if has_replication_completed {
            (records_emitted, bytes_emitted)
        } else {
            (
                stats.records_committed.load(Ordering::Relaxed),
                stats.bytes_committed.load(Ordering::Relaxed),
            )
        };

        let checkpoints = lock(&stats.checkpoints, ErrorKind::StatsUnavailable)?;
        Ok(SyncStats {
            records_emitted,
            bytes_emitted,
            records_committed,
            bytes_committed,
            source_state_messages_emitted: stats.source_states.load(Ordering::Relaxed),
            destination_state_messages_emitted: stats.destination_states.load(Ordering::Relaxed),
            max_seconds_before_source_state_message_emitted: checkpoints
                .before_source_state
                .max_seconds(),
            mean_seconds_before_source_state_message_emitted: checkpoints
                .before_source_state
                .mean_seconds(),
            max_seconds_between_state_message_emitted_and_committed: checkpoints
                .emitted_to_committed
                .max_seconds(),
            mean_seconds_between_state_message_emitted_and_committed: checkpoints
                .emitted_to_committed
                .mean_seconds(),
            estimated_records: checkpoints.estimated_records,
            estimated_bytes: checkpoints.estimated_bytes,
            ..SyncStats::default()
        })
    }

    /// Returns the stats of `stream`, registering it on first use.
    fn stream(&self, stream: &StreamDescriptor) -> ReplicationResult<Arc<StreamStats>> {
        {
            let streams = self
                .streams
                .read()
                .map_err(|_| poisoned(ErrorKind::StatsTrackingFailed))?;
            if let Some(stats) = streams.get(stream) {
                return Ok(stats.clone());
            }
        }

        let mut streams = self
            .streams
            .write()
            .map_err(|_| poisoned(ErrorKind::StatsTrackingFailed))?;
        let stats = streams
            .entry(stream.clone())
            .or_insert_with(|| {
                debug!(%stream, "tracking new stream");
                Arc::new(StreamStats::new(Instant::now()))
            })
            .clone();

        Ok(stats)
    }

    /// Returns the streams a state applies to.
    ///
    /// A global state listing no stream and a legacy state apply to every stream known so far.
    fn covered_streams(&self, scope: &StateScope) -> ReplicationResult<Vec<Arc<StreamStats>>> {
        match scope {
            StateScope::Stream(stream) => Ok(vec![self.stream(stream)?]),
            StateScope::Global(streams) if !streams.is_empty() => streams
                .iter()
                .map(|stream| self.stream(stream))
                .collect(),
            StateScope::Global(_) | StateScope::Legacy => {
                let streams = self
                    .streams
                    .read()
                    .map_err(|_| poisoned(ErrorKind::StatsTrackingFailed))?;
                Ok(streams.values().cloned().collect())
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>, kind: ErrorKind) -> ReplicationResult<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| poisoned(kind))
}

fn poisoned(kind: ErrorKind) -> crate::error::ReplicationError {
    crate::replication_error!(kind, "Sync stats lock was poisoned")
}

fn load_phase(slot: &AtomicI64) -> Option<i64> {
    match slot.load(Ordering::Relaxed) {
        0 => None,
        value => Some(value),
    }
}

fn add_optional(total: Option<u64>, value: Option<u64>) -> Option<u64> {
    match (total, value) {
        (None, None) => None,
        (total, value) => Some(total.unwrap_or(0) + value.unwrap_or(0)),
    }
}
