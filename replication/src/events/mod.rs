//! Collaborators notified of what happens during a replication attempt.

mod config_updater;
mod publisher;

pub use config_updater::ConnectorConfigUpdater;
pub use publisher::{EventPublisher, IncompleteCause};
pub use crate::types::MessageOrigin;
