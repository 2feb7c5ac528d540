use std::future::Future;

use serde_json::Value;
use uuid::Uuid;

use crate::error::ReplicationResult;

/// Persists connector configurations rotated during a sync, for example refreshed credentials.
pub trait ConnectorConfigUpdater {
    fn update_source(
        &self,
        source_id: Uuid,
        config: Value,
    ) -> impl Future<Output = ReplicationResult<()>> + Send;

    fn update_destination(
        &self,
        destination_id: Uuid,
        config: Value,
    ) -> impl Future<Output = ReplicationResult<()>> + Send;
}
