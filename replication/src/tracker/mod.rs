//! Accounting of the messages flowing through a replication attempt.
//!
//! [`MessageTracker`] observes every message exchanged with the peers and feeds a
//! [`SyncStatsTracker`], which keeps emitted and committed counters per stream and pairs source
//! checkpoints with their acknowledgement by the destination.

mod message;
mod stats;

pub use message::MessageTracker;
pub use stats::{Phase, SyncStatsTracker};
