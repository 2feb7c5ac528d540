use fail::fail_point;

use crate::bail;
use crate::error::{ErrorKind, ReplicationResult};

/// Fails while the tracker processes a message read from the source.
pub const REPLICATION_TRACKER_ACCEPT: &str = "replication.tracker.accept";

/// Fails when the stats of a finished attempt are read.
pub const REPLICATION_OUTPUT_STATS: &str = "replication.output.stats";

/// Returns an error when the fail point `name` is configured to return.
pub fn replication_fail_point(name: &str) -> ReplicationResult<()> {
    fail_point!(name, |_| {
        bail!(
            ErrorKind::WithFailpoint,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
