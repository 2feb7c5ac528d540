use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::StreamDescriptor;

/// How the source reads a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    FullRefresh,
    Incremental,
}

/// How the destination writes a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationSyncMode {
    #[default]
    Append,
    Overwrite,
    AppendDedup,
}

/// A stream negotiated for the sync, with the JSON schema of its records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfiguredStream {
    pub stream: StreamDescriptor,
    pub json_schema: Value,
    #[serde(default)]
    pub sync_mode: SyncMode,
    #[serde(default)]
    pub destination_sync_mode: DestinationSyncMode,
}

impl ConfiguredStream {
    pub fn new(stream: StreamDescriptor, json_schema: Value) -> Self {
        Self {
            stream,
            json_schema,
            sync_mode: SyncMode::default(),
            destination_sync_mode: DestinationSyncMode::default(),
        }
    }

    /// Returns the top-level property names declared by the stream schema.
    ///
    /// Returns `None` when the schema declares no `properties` object.
    pub fn selected_fields(&self) -> Option<BTreeSet<String>> {
        self.json_schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|properties| properties.keys().cloned().collect())
    }
}

/// The set of streams a sync replicates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfiguredCatalog {
    pub streams: Vec<ConfiguredStream>,
}

impl ConfiguredCatalog {
    pub fn new(streams: Vec<ConfiguredStream>) -> Self {
        Self { streams }
    }

    /// Returns the configured stream matching `descriptor`, if any.
    pub fn stream(&self, descriptor: &StreamDescriptor) -> Option<&ConfiguredStream> {
        self.streams
            .iter()
            .find(|configured| &configured.stream == descriptor)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.streams.iter().map(|configured| &configured.stream)
    }
}
