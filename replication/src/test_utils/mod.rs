//! Utilities for testing replication workers without real connectors.
//!
//! [`source::TestSource`] and [`sink::TestSink`] are scripted peers which record every call they
//! receive, [`events`] holds recording implementations of the event publisher and of the
//! connector config updater, and [`fixtures`] builds catalogs, inputs, messages and worker
//! configurations tuned for fast tests. With the `failpoints` feature, [`failpoints`] configures
//! fail points for the duration of a test.

pub mod events;
#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod fixtures;
pub mod notify;
pub mod sink;
pub mod source;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks `mutex`, ignoring poisoning caused by panics injected on purpose.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
