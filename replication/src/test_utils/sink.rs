//! Recording destination connector.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use crate::bail;
use crate::connector::MessageSink;
use crate::error::{ErrorKind, ReplicationResult};
use crate::test_utils::lock;
use crate::test_utils::notify::TimedNotify;
use crate::types::{DestinationStartConfig, Message, RecordMessage, StateMessage};

/// How the sink handles accepted messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptBehavior {
    Accept,
    /// Accepting never completes.
    Hang,
    /// Accepting fails once the given number of messages was accepted.
    FailAfter(usize),
    /// Accepting panics once the given number of messages was accepted.
    PanicAfter(usize),
}

/// How the sink handles the end of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOfInputBehavior {
    /// The sink finishes once everything it emitted was read.
    Finish,
    /// Notifying never completes.
    Hang,
    /// Notifying fails.
    Fail,
}

struct Inner {
    accepted: Vec<Message>,
    output: VecDeque<Message>,
    state_ack_limit: Option<usize>,
    acked_states: usize,
    accept_behavior: AcceptBehavior,
    end_of_input_behavior: EndOfInputBehavior,
    end_of_input: bool,
    exit_value: i32,
    fail_start: bool,
    fail_close: bool,
    start_config: Option<DestinationStartConfig>,
    closed: bool,
    cancelled: bool,
    accepted_conditions: Vec<(usize, Arc<Notify>)>,
}

impl Inner {
    fn record(&mut self, message: Message) {
        if let Message::State(state) = &message {
            let acknowledged = self
                .state_ack_limit
                .is_none_or(|limit| self.acked_states < limit);
            if acknowledged {
                self.acked_states += 1;
                self.output.push_back(Message::State(state.clone()));
            }
        }

        self.accepted.push(message);
        self.check_conditions();
    }

    fn check_conditions(&mut self) {
        let accepted = self.accepted.len();
        self.accepted_conditions.retain(|(count, notify)| {
            let should_retain = accepted < *count;
            if !should_retain {
                notify.notify_one();
            }
            should_retain
        });
    }
}

/// A destination recording what it accepts and acknowledging every state it receives.
///
/// Clones share their state, so a test keeps a clone to inspect what the worker did.
#[derive(Clone)]
pub struct TestSink {
    inner: Arc<Mutex<Inner>>,
}

impl TestSink {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                accepted: Vec::new(),
                output: VecDeque::new(),
                state_ack_limit: None,
                acked_states: 0,
                accept_behavior: AcceptBehavior::Accept,
                end_of_input_behavior: EndOfInputBehavior::Finish,
                end_of_input: false,
                exit_value: 0,
                fail_start: false,
                fail_close: false,
                start_config: None,
                closed: false,
                cancelled: false,
                accepted_conditions: Vec::new(),
            })),
        }
    }

    /// Emits `messages` before anything else the sink produces.
    pub fn with_output(self, messages: Vec<Message>) -> Self {
        lock(&self.inner).output.extend(messages);
        self
    }

    /// Only acknowledges the first `limit` states it accepts.
    pub fn acknowledging_states(self, limit: usize) -> Self {
        lock(&self.inner).state_ack_limit = Some(limit);
        self
    }

    pub fn with_accept_behavior(self, behavior: AcceptBehavior) -> Self {
        lock(&self.inner).accept_behavior = behavior;
        self
    }

    pub fn with_end_of_input_behavior(self, behavior: EndOfInputBehavior) -> Self {
        lock(&self.inner).end_of_input_behavior = behavior;
        self
    }

    pub fn with_exit_value(self, exit_value: i32) -> Self {
        lock(&self.inner).exit_value = exit_value;
        self
    }

    pub fn failing_start(self) -> Self {
        lock(&self.inner).fail_start = true;
        self
    }

    pub fn failing_close(self) -> Self {
        lock(&self.inner).fail_close = true;
        self
    }

    /// Returns a notification fired once `count` messages were accepted.
    pub fn notify_on_accepted(&self, count: usize) -> TimedNotify {
        let notify = Arc::new(Notify::new());
        let mut inner = lock(&self.inner);
        inner.accepted_conditions.push((count, notify.clone()));
        inner.check_conditions();

        TimedNotify::new(notify)
    }

    pub fn accepted(&self) -> Vec<Message> {
        lock(&self.inner).accepted.clone()
    }

    pub fn accepted_records(&self) -> Vec<RecordMessage> {
        lock(&self.inner)
            .accepted
            .iter()
            .filter_map(|message| match message {
                Message::Record(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn accepted_states(&self) -> Vec<StateMessage> {
        lock(&self.inner)
            .accepted
            .iter()
            .filter_map(|message| match message {
                Message::State(state) => Some(state.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn start_config(&self) -> Option<DestinationStartConfig> {
        lock(&self.inner).start_config.clone()
    }

    pub fn received_end_of_input(&self) -> bool {
        lock(&self.inner).end_of_input
    }

    pub fn was_closed(&self) -> bool {
        lock(&self.inner).closed
    }

    pub fn was_cancelled(&self) -> bool {
        lock(&self.inner).cancelled
    }
}

impl Default for TestSink {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TestSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("TestSink")
            .field("accepted", &inner.accepted.len())
            .field("end_of_input", &inner.end_of_input)
            .finish()
    }
}

impl MessageSink for TestSink {
    async fn start(
        &self,
        config: &DestinationStartConfig,
        _job_root: &Path,
    ) -> ReplicationResult<()> {
        let mut inner = lock(&self.inner);
        if inner.fail_start {
            bail!(ErrorKind::DestinationStartFailed, "Test sink failed to start");
        }
        inner.start_config = Some(config.clone());

        Ok(())
    }

    async fn accept(&self, message: Message) -> ReplicationResult<()> {
        let behavior = {
            let mut inner = lock(&self.inner);
            let behavior = inner.accept_behavior;
            let accepted = inner.accepted.len();
            match behavior {
                AcceptBehavior::Hang => behavior,
                AcceptBehavior::FailAfter(limit) if accepted >= limit => {
                    bail!(ErrorKind::DestinationWriteFailed, "Test sink failed to accept")
                }
                AcceptBehavior::PanicAfter(limit) if accepted >= limit => behavior,
                _ => {
                    inner.record(message);
                    AcceptBehavior::Accept
                }
            }
        };

        match behavior {
            AcceptBehavior::Hang => std::future::pending().await,
            AcceptBehavior::PanicAfter(_) => panic!("test sink panicked while accepting"),
            _ => Ok(()),
        }
    }

    async fn notify_end_of_input(&self) -> ReplicationResult<()> {
        let behavior = lock(&self.inner).end_of_input_behavior;
        match behavior {
            EndOfInputBehavior::Finish => {
                lock(&self.inner).end_of_input = true;
                Ok(())
            }
            EndOfInputBehavior::Hang => std::future::pending().await,
            EndOfInputBehavior::Fail => bail!(
                ErrorKind::DestinationWriteFailed,
                "Test sink failed to flush on end of input"
            ),
        }
    }

    fn is_finished(&self) -> bool {
        let inner = lock(&self.inner);
        inner.end_of_input && inner.output.is_empty()
    }

    fn exit_value(&self) -> ReplicationResult<i32> {
        Ok(lock(&self.inner).exit_value)
    }

    async fn attempt_read(&self) -> ReplicationResult<Option<Message>> {
        if let Some(message) = lock(&self.inner).output.pop_front() {
            return Ok(Some(message));
        }

        tokio::time::sleep(Duration::from_millis(1)).await;
        Ok(None)
    }

    async fn close(&self) -> ReplicationResult<()> {
        let mut inner = lock(&self.inner);
        inner.closed = true;
        if inner.fail_close {
            bail!(ErrorKind::DestinationCloseFailed, "Test sink failed to close");
        }

        Ok(())
    }

    async fn cancel(&self) -> ReplicationResult<()> {
        lock(&self.inner).cancelled = true;

        Ok(())
    }
}
