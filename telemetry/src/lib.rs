//! Telemetry setup shared by replication binaries and tests.

pub mod tracing;
