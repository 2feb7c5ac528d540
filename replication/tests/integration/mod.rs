mod cancellation_test;
mod common;
mod failures_test;
mod replication_test;
