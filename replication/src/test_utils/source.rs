//! Scripted source connector.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use crate::bail;
use crate::connector::MessageSource;
use crate::error::{ErrorKind, ReplicationResult};
use crate::test_utils::lock;
use crate::types::{Message, RecordMessage, SourceStartConfig, StreamDescriptor};

/// What the source does once its scripted messages are drained.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEnd {
    /// The source finishes.
    Finish,
    /// Reads never complete.
    Hang,
    /// Reads fail.
    Fail,
    /// The source emits records for the stream forever, one per millisecond.
    Endless(StreamDescriptor),
}

#[derive(Debug)]
struct Inner {
    messages: VecDeque<Message>,
    end: SourceEnd,
    exit_value: i32,
    read_delay: Option<Duration>,
    start_delay: Option<Duration>,
    close_delay: Option<Duration>,
    fail_start: bool,
    fail_close: bool,
    fail_cancel: bool,
    start_config: Option<SourceStartConfig>,
    emitted: u64,
    closed: bool,
    cancelled: bool,
}

/// A source replaying a fixed list of messages.
///
/// Clones share their state, so a test keeps a clone to inspect what the worker did.
#[derive(Debug, Clone)]
pub struct TestSource {
    inner: Arc<Mutex<Inner>>,
}

impl TestSource {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                messages: messages.into(),
                end: SourceEnd::Finish,
                exit_value: 0,
                read_delay: None,
                start_delay: None,
                close_delay: None,
                fail_start: false,
                fail_close: false,
                fail_cancel: false,
                start_config: None,
                emitted: 0,
                closed: false,
                cancelled: false,
            })),
        }
    }

    /// Creates a source emitting records for `stream` until it is closed or cancelled.
    pub fn endless(stream: StreamDescriptor) -> Self {
        Self::new(vec![]).ending_with(SourceEnd::Endless(stream))
    }

    pub fn ending_with(self, end: SourceEnd) -> Self {
        lock(&self.inner).end = end;
        self
    }

    pub fn with_exit_value(self, exit_value: i32) -> Self {
        lock(&self.inner).exit_value = exit_value;
        self
    }

    /// Delays every read by `delay`, simulating a slow source.
    pub fn with_read_delay(self, delay: Duration) -> Self {
        lock(&self.inner).read_delay = Some(delay);
        self
    }

    /// Delays `start` by `delay`, simulating a slow connector launch.
    pub fn with_start_delay(self, delay: Duration) -> Self {
        lock(&self.inner).start_delay = Some(delay);
        self
    }

    /// Delays `close` by `delay`, simulating a slow connector shutdown.
    pub fn with_close_delay(self, delay: Duration) -> Self {
        lock(&self.inner).close_delay = Some(delay);
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

    pub fn failing_cancel(self) -> Self {
        lock(&self.inner).fail_cancel = true;
        self
    }

    pub fn start_config(&self) -> Option<SourceStartConfig> {
        lock(&self.inner).start_config.clone()
    }

    /// Number of messages returned by reads so far.
    pub fn emitted(&self) -> u64 {
        lock(&self.inner).emitted
    }

    pub fn was_closed(&self) -> bool {
        lock(&self.inner).closed
    }

    pub fn was_cancelled(&self) -> bool {
        lock(&self.inner).cancelled
    }
}

impl MessageSource for TestSource {
    async fn start(&self, config: &SourceStartConfig, _job_root: &Path) -> ReplicationResult<()> {
        let start_delay = lock(&self.inner).start_delay;
        if let Some(delay) = start_delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = lock(&self.inner);
        if inner.fail_start {
            bail!(ErrorKind::SourceStartFailed, "Test source failed to start");
        }
        inner.start_config = Some(config.clone());

        Ok(())
    }

    async fn attempt_read(&self) -> ReplicationResult<Option<Message>> {
        let read_delay = lock(&self.inner).read_delay;
        if let Some(delay) = read_delay {
            tokio::time::sleep(delay).await;
        }

        let end = {
            let mut inner = lock(&self.inner);
            if let Some(message) = inner.messages.pop_front() {
                inner.emitted += 1;
                return Ok(Some(message));
            }
            inner.end.clone()
        };

        match end {
            SourceEnd::Finish => Ok(None),
            SourceEnd::Hang => std::future::pending().await,
            SourceEnd::Fail => bail!(ErrorKind::SourceReadFailed, "Test source failed to read"),
            SourceEnd::Endless(stream) => {
                tokio::time::sleep(Duration::from_millis(1)).await;

                let mut inner = lock(&self.inner);
                inner.emitted += 1;
                let record = RecordMessage::new(stream, json!({ "id": inner.emitted }));

                Ok(Some(Message::Record(record)))
            }
        }
    }

    fn is_finished(&self) -> bool {
        let inner = lock(&self.inner);
        inner.messages.is_empty() && inner.end == SourceEnd::Finish
    }

    fn exit_value(&self) -> ReplicationResult<i32> {
        Ok(lock(&self.inner).exit_value)
    }

    async fn close(&self) -> ReplicationResult<()> {
        let close_delay = lock(&self.inner).close_delay;
        if let Some(delay) = close_delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = lock(&self.inner);
        inner.closed = true;
        if inner.fail_close {
            bail!(ErrorKind::SourceCloseFailed, "Test source failed to close");
        }

        Ok(())
    }

    async fn cancel(&self) -> ReplicationResult<()> {
        let mut inner = lock(&self.inner);
        inner.cancelled = true;
        if inner.fail_cancel {
            bail!(ErrorKind::SourceCloseFailed, "Test source failed to cancel");
        }

        Ok(())
    }
}
