//! Peers of a replication attempt.
//!
//! The engine never launches connectors itself: callers hand it a [`MessageSource`] and a
//! [`MessageSink`] which already know how to reach the connector processes.

mod sink;
mod source;

pub use sink::MessageSink;
pub use source::MessageSource;
