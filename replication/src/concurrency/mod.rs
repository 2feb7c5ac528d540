//! Concurrency primitives coordinating the tasks of a replication attempt.
//!
//! A replication attempt runs several tasks at once: the source pump, the sink pump, the
//! destination writer of the buffered strategy and the watchdogs guarding them. They share no
//! mutable state besides the stats aggregator and coordinate through:
//!
//! - [`shutdown`]: an idempotent broadcast telling every task to stop at its next suspension
//!   point. It is fired by the first failure, by a watchdog or by an external cancellation.
//! - [`future`]: adapters used to keep optional branches of `tokio::select!` pending, for example
//!   when a watchdog is disabled.

pub mod future;
pub mod shutdown;
