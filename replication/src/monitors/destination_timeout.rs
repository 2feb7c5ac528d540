use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use config::shared::DestinationTimeoutConfig;
use metrics::counter;
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{Instrument, info_span, warn};

use crate::concurrency::future::optional_future;
use crate::concurrency::shutdown::ShutdownRx;
use crate::metrics::{
    REPLICATION_DESTINATION_ACCEPT_TIMEOUTS_TOTAL,
    REPLICATION_DESTINATION_NOTIFY_END_OF_INPUT_TIMEOUTS_TOTAL,
};

/// Destination call guarded by the timeout monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationOperation {
    Accept,
    NotifyEndOfInput,
}

impl DestinationOperation {
    fn timeouts_counter(self) -> &'static str {
        match self {
            DestinationOperation::Accept => REPLICATION_DESTINATION_ACCEPT_TIMEOUTS_TOTAL,
            DestinationOperation::NotifyEndOfInput => {
                REPLICATION_DESTINATION_NOTIFY_END_OF_INPUT_TIMEOUTS_TOTAL
            }
        }
    }
}

impl fmt::Display for DestinationOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationOperation::Accept => f.write_str("accept"),
            DestinationOperation::NotifyEndOfInput => f.write_str("notify_end_of_input"),
        }
    }
}

/// A destination call ran for longer than the configured timeout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("destination {operation} did not complete after {elapsed:?}, exceeding the {threshold:?} timeout")]
pub struct DestinationTimeout {
    pub operation: DestinationOperation,
    pub threshold: Duration,
    pub elapsed: Duration,
}

/// Times the `accept` and `notify_end_of_input` calls made on the destination.
///
/// Each timer holds the offset in milliseconds, plus one, at which the running call started.
/// Zero means no call is running.
#[derive(Debug)]
pub struct DestinationTimeoutMonitor {
    enabled: bool,
    timeout: Duration,
    poll_interval: Duration,
    fail_on_timeout: bool,
    created_at: Instant,
    accept_started: AtomicU64,
    notify_end_of_input_started: AtomicU64,
    shutdown_rx: ShutdownRx,
}

impl DestinationTimeoutMonitor {
    pub fn new(config: &DestinationTimeoutConfig, shutdown_rx: ShutdownRx) -> Self {
        Self {
            enabled: config.enabled,
            timeout: config.timeout(),
            poll_interval: config.poll_interval(),
            fail_on_timeout: config.fail_on_timeout,
            created_at: Instant::now(),
            accept_started: AtomicU64::new(0),
            notify_end_of_input_started: AtomicU64::new(0),
            shutdown_rx,
        }
    }

    pub fn start_accept_timer(&self) {
        self.accept_started.store(self.now_offset(), Ordering::Release);
    }

    pub fn reset_accept_timer(&self) {
        self.accept_started.store(0, Ordering::Release);
    }

    pub fn start_notify_end_of_input_timer(&self) {
        self.notify_end_of_input_started
            .store(self.now_offset(), Ordering::Release);
    }

    pub fn reset_notify_end_of_input_timer(&self) {
        self.notify_end_of_input_started.store(0, Ordering::Release);
    }

    /// Drives `future` to completion unless a destination call exceeds the timeout first.
    ///
    /// A disabled monitor never fires.
    pub async fn run_with_timeout<F>(&self, future: F) -> Result<F::Output, DestinationTimeout>
    where
        F: Future,
    {
        let monitor = optional_future(self.enabled.then(|| {
            self.monitor_timeouts()
                .instrument(info_span!("destination_timeout_monitor"))
        }));

        tokio::pin!(future);
        tokio::pin!(monitor);

        tokio::select! {
            biased;

            output = &mut future => Ok(output),
            timeout = &mut monitor => Err(timeout),
        }
    }

    async fn monitor_timeouts(&self) -> DestinationTimeout {
        let mut checks = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        checks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Start offset of the last call reported in observe-only mode, per operation.
        let mut reported = [0u64; 2];
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.wait_for_shutdown() => {
                    std::future::pending::<()>().await;
                }
                _ = checks.tick() => {}
            }

            let timers = [
                (DestinationOperation::Accept, &self.accept_started),
                (
                    DestinationOperation::NotifyEndOfInput,
                    &self.notify_end_of_input_started,
                ),
            ];
            for (index, (operation, started)) in timers.into_iter().enumerate() {
                let started = started.load(Ordering::Acquire);
                let Some(elapsed) = self.elapsed_since(started) else {
                    continue;
                };
                if elapsed <= self.timeout {
                    continue;
                }

                let timeout = DestinationTimeout {
                    operation,
                    threshold: self.timeout,
                    elapsed,
                };

                if self.fail_on_timeout {
                    counter!(operation.timeouts_counter()).increment(1);
                    warn!(error = %timeout, "failing replication on destination timeout");

                    return timeout;
                }

                if reported[index] != started {
                    counter!(operation.timeouts_counter()).increment(1);
                    warn!(
                        error = %timeout,
                        "destination call timed out, continuing since failing on timeout is disabled"
                    );
                    reported[index] = started;
                }
            }
        }
    }

    fn now_offset(&self) -> u64 {
        self.created_at.elapsed().as_millis() as u64 + 1
    }

    fn elapsed_since(&self, started: u64) -> Option<Duration> {
        if started == 0 {
            return None;
        }

        let started_at = self.created_at + Duration::from_millis(started - 1);
        Some(Instant::now().saturating_duration_since(started_at))
    }
}
