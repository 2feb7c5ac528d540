use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use config::shared::HeartbeatConfig;
use metrics::counter;
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{Instrument, info_span, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::metrics::REPLICATION_SOURCE_HEARTBEAT_TIMEOUTS_TOTAL;

/// The source did not show any activity for longer than the configured threshold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "source heartbeat timed out after {time_since_last_beat:?} without activity, exceeding the \
     {threshold:?} threshold"
)]
pub struct HeartbeatTimeout {
    pub threshold: Duration,
    pub time_since_last_beat: Duration,
}

/// Tracks the last time the source showed activity.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    threshold: Duration,
    created_at: Instant,
    /// Milliseconds between `created_at` and the last beat, plus one. Zero means no beat yet.
    last_beat: AtomicU64,
}

impl HeartbeatMonitor {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            created_at: Instant::now(),
            last_beat: AtomicU64::new(0),
        }
    }

    /// Records activity of the source.
    pub fn beat(&self) {
        let offset = self.created_at.elapsed().as_millis() as u64 + 1;
        self.last_beat.store(offset, Ordering::Release);
    }

    /// Returns the time elapsed since the last beat, or `None` before the first beat.
    pub fn time_since_last_beat(&self) -> Option<Duration> {
        match self.last_beat.load(Ordering::Acquire) {
            0 => None,
            offset => {
                let beat_at = self.created_at + Duration::from_millis(offset - 1);
                Some(Instant::now().saturating_duration_since(beat_at))
            }
        }
    }

    /// Returns whether the last beat happened within the threshold, or `None` before the first
    /// beat.
    pub fn is_beating(&self) -> Option<bool> {
        self.time_since_last_beat()
            .map(|elapsed| elapsed < self.threshold)
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }
}

/// Runs a future while periodically checking the heartbeat of the source.
#[derive(Debug, Clone)]
pub struct HeartbeatTimeoutChaperone {
    monitor: Arc<HeartbeatMonitor>,
    check_interval: Duration,
    fail_on_timeout: bool,
    shutdown_rx: ShutdownRx,
}

impl HeartbeatTimeoutChaperone {
    pub fn new(
        monitor: Arc<HeartbeatMonitor>,
        config: &HeartbeatConfig,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            monitor,
            check_interval: config.check_interval(),
            fail_on_timeout: config.fail_on_timeout,
            shutdown_rx,
        }
    }

    /// Drives `future` to completion unless the source stops beating first.
    ///
    /// When the heartbeat times out and failing is enabled, `future` is dropped and the timeout
    /// is returned. Otherwise the timeout is only logged once per silent period.
    pub async fn run_with_heartbeat<F>(&self, future: F) -> Result<F::Output, HeartbeatTimeout>
    where
        F: Future,
    {
        let monitor = self
            .monitor_heartbeat()
            .instrument(info_span!("heartbeat_chaperone"));

        tokio::pin!(future);
        tokio::pin!(monitor);

        tokio::select! {
            biased;

            output = &mut future => Ok(output),
            timeout = &mut monitor => Err(timeout),
        }
    }

    async fn monitor_heartbeat(&self) -> HeartbeatTimeout {
        let mut checks = interval_at(Instant::now() + self.check_interval, self.check_interval);
        checks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut reported = false;
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.wait_for_shutdown() => {
                    // The guarded future observes shutdown on its own, so the watchdog only has
                    // to stop firing.
                    std::future::pending::<()>().await;
                }
                _ = checks.tick() => {}
            }

            match self.monitor.is_beating() {
                Some(false) => {
                    let time_since_last_beat =
                        self.monitor.time_since_last_beat().unwrap_or_default();
                    let timeout = HeartbeatTimeout {
                        threshold: self.monitor.threshold(),
                        time_since_last_beat,
                    };

                    if self.fail_on_timeout {
                        counter!(REPLICATION_SOURCE_HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
                        warn!(error = %timeout, "failing replication on source heartbeat timeout");

                        return timeout;
                    }

                    if !reported {
                        counter!(REPLICATION_SOURCE_HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
                        warn!(
                            error = %timeout,
                            "source heartbeat timed out, continuing since failing on timeout is disabled"
                        );
                        reported = true;
                    }
                }
                Some(true) => reported = false,
                None => {}
            }
        }
    }
}
