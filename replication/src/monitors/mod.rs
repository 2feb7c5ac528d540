//! Watchdogs guarding the liveness of the peers.
//!
//! Both watchdogs are raced against the future they guard. They only observe atomics updated by
//! the pumps and stop checking as soon as shutdown is signalled.

mod destination_timeout;
mod heartbeat;

pub use destination_timeout::{DestinationOperation, DestinationTimeout, DestinationTimeoutMonitor};
pub use heartbeat::{HeartbeatMonitor, HeartbeatTimeout, HeartbeatTimeoutChaperone};
