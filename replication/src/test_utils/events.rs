//! Recording implementations of the event publisher and the connector config updater.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use uuid::Uuid;

use crate::bail;
use crate::error::{ErrorKind, ReplicationResult};
use crate::events::{ConnectorConfigUpdater, EventPublisher, IncompleteCause};
use crate::test_utils::lock;
use crate::types::{
    Message, MessageOrigin, ReplicationContext, StreamDescriptor, StreamStatus, TraceKind,
};

/// An event received by [`RecordingPublisher`].
#[derive(Debug, Clone, PartialEq)]
pub enum PublishedEvent {
    Status {
        origin: MessageOrigin,
        stream: StreamDescriptor,
        status: StreamStatus,
    },
    Complete {
        origin: MessageOrigin,
        stream: StreamDescriptor,
    },
    Incomplete {
        origin: MessageOrigin,
        stream: StreamDescriptor,
        cause: IncompleteCause,
    },
}

/// Publisher keeping every event it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    events: Arc<Mutex<Vec<PublishedEvent>>>,
    failing: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a publisher which records events and then fails to publish them.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<PublishedEvent> {
        lock(&self.events).clone()
    }

    fn publish(&self, event: PublishedEvent) -> ReplicationResult<()> {
        lock(&self.events).push(event);
        if self.failing {
            bail!(ErrorKind::EventPublishingFailed, "Test publisher failed to publish");
        }

        Ok(())
    }
}

impl EventPublisher for RecordingPublisher {
    async fn publish_status_event(
        &self,
        origin: MessageOrigin,
        message: &Message,
        _context: &ReplicationContext,
    ) -> ReplicationResult<()> {
        let Message::Trace(trace) = message else {
            bail!(ErrorKind::InvalidMessage, "Only traces can be published");
        };
        let TraceKind::StreamStatus(status) = &trace.kind else {
            bail!(ErrorKind::InvalidMessage, "Only stream statuses can be published");
        };

        self.publish(PublishedEvent::Status {
            origin,
            stream: status.stream.clone(),
            status: status.status,
        })
    }

    async fn publish_complete_status_event(
        &self,
        stream: &StreamDescriptor,
        _context: &ReplicationContext,
        origin: MessageOrigin,
    ) -> ReplicationResult<()> {
        self.publish(PublishedEvent::Complete {
            origin,
            stream: stream.clone(),
        })
    }

    async fn publish_incomplete_status_event(
        &self,
        stream: &StreamDescriptor,
        _context: &ReplicationContext,
        origin: MessageOrigin,
        cause: IncompleteCause,
    ) -> ReplicationResult<()> {
        self.publish(PublishedEvent::Incomplete {
            origin,
            stream: stream.clone(),
            cause,
        })
    }
}

/// A configuration update received by [`RecordingConfigUpdater`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigUpdate {
    Source { source_id: Uuid, config: Value },
    Destination { destination_id: Uuid, config: Value },
}

/// Config updater keeping every update it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingConfigUpdater {
    updates: Arc<Mutex<Vec<ConfigUpdate>>>,
    failing: bool,
}

impl RecordingConfigUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an updater which records updates and then fails to persist them.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn updates(&self) -> Vec<ConfigUpdate> {
        lock(&self.updates).clone()
    }

    fn update(&self, update: ConfigUpdate) -> ReplicationResult<()> {
        lock(&self.updates).push(update);
        if self.failing {
            bail!(
                ErrorKind::ConnectorConfigUpdateFailed,
                "Test config updater failed to persist the configuration"
            );
        }

        Ok(())
    }
}

impl ConnectorConfigUpdater for RecordingConfigUpdater {
    async fn update_source(&self, source_id: Uuid, config: Value) -> ReplicationResult<()> {
        self.update(ConfigUpdate::Source { source_id, config })
    }

    async fn update_destination(
        &self,
        destination_id: Uuid,
        config: Value,
    ) -> ReplicationResult<()> {
        self.update(ConfigUpdate::Destination {
            destination_id,
            config,
        })
    }
}
