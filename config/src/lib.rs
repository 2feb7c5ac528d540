//! Configuration for the replication engine.
//!
//! The [`shared`] module holds the serde structures consumed by the engine, and [`load`]
//! reads them from configuration files with environment variable overrides.

pub mod load;
pub mod shared;
