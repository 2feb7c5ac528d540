//! Tracing subscriber initialization.
//!
//! Replication attempts write their logs to `<root>/logs/<job>/<attempt>/replication.log` so that
//! log shipping can pick them up by job and attempt. The same events are mirrored to stdout.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Once;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

/// Name of the directory, under the job root, holding attempt logs.
const LOGS_DIR: &str = "logs";

/// Name of the log file written for each attempt.
pub const LOG_FILE_NAME: &str = "replication.log";

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "info";

/// Errors raised while installing the tracing subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    /// The attempt log directory could not be created.
    #[error("failed to create log directory `{path}`: {source}")]
    LogDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A global subscriber was already installed.
    #[error("failed to install the tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),

    /// A global `log` logger was already installed.
    #[error("failed to bridge `log` records into tracing: {0}")]
    LogBridge(#[from] tracing_log::log::SetLoggerError),
}

/// Keeps the background log writer alive.
///
/// Buffered log lines are flushed when the flusher is dropped, so it must be held until the
/// attempt is over.
#[must_use = "logs are only flushed while the flusher is alive"]
pub struct LogFlusher {
    _guard: WorkerGuard,
}

/// Returns the directory holding the logs of one attempt.
pub fn attempt_log_dir(root: &Path, job_id: i64, attempt_number: u32) -> PathBuf {
    root.join(LOGS_DIR)
        .join(job_id.to_string())
        .join(attempt_number.to_string())
}

/// Returns the log file path of one attempt.
pub fn attempt_log_path(root: &Path, job_id: i64, attempt_number: u32) -> PathBuf {
    attempt_log_dir(root, job_id, attempt_number).join(LOG_FILE_NAME)
}

/// Installs a global subscriber writing to the attempt log file and to stdout.
///
/// `log` records emitted by dependencies are forwarded to the same subscriber.
pub fn init_attempt_tracing(
    root: &Path,
    job_id: i64,
    attempt_number: u32,
) -> Result<LogFlusher, TracingError> {
    let directory = attempt_log_dir(root, job_id, attempt_number);
    std::fs::create_dir_all(&directory).map_err(|source| TracingError::LogDirectory {
        path: directory.clone(),
        source,
    })?;

    let file_appender = tracing_appender::rolling::never(&directory, LOG_FILE_NAME);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    LogTracer::init()?;

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .with(fmt::layer())
        .try_init()?;

    Ok(LogFlusher { _guard: guard })
}

/// Installs a subscriber suitable for tests.
///
/// Safe to call from every test: only the first call installs the subscriber.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // Another subscriber may already be installed by the test harness.
        let _ = tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}
