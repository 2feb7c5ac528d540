pub mod concurrency;
pub mod connector;
pub mod error;
pub mod events;
#[cfg(feature = "failpoints")]
pub mod failpoints;
mod macros;
pub mod mapper;
pub mod metrics;
pub mod monitors;
pub mod selector;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod tracker;
pub mod types;
pub mod workers;
