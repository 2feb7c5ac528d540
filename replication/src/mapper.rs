//! Rewriting of stream identities between the source and the destination.
//!
//! A connection can write streams under another namespace or with a name prefix. The mapper
//! applies that rewrite to everything sent to the destination and reverts it on what the
//! destination sends back, so that the rest of the engine only deals with source identities.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{ConfiguredCatalog, Message, StateScope, StreamDescriptor, TraceKind};

/// Placeholder replaced by the source namespace in custom namespace formats.
pub const SOURCE_NAMESPACE_PLACEHOLDER: &str = "${SOURCE_NAMESPACE}";

/// Rewrites stream identities of messages exchanged with the destination.
pub trait Mapper: Send + Sync + fmt::Debug {
    /// Returns the catalog as the destination must see it.
    fn map_catalog(&self, catalog: &ConfiguredCatalog) -> ConfiguredCatalog;

    /// Rewrites a message read from the source before it is delivered to the destination.
    fn map_message(&self, message: Message) -> Message;

    /// Reverts the rewrite on a message read from the destination.
    fn revert_map(&self, message: Message) -> Message;
}

/// Mapper leaving every message untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMapper;

impl Mapper for IdentityMapper {
    fn map_catalog(&self, catalog: &ConfiguredCatalog) -> ConfiguredCatalog {
        catalog.clone()
    }

    fn map_message(&self, message: Message) -> Message {
        message
    }

    fn revert_map(&self, message: Message) -> Message {
        message
    }
}

/// Where the destination writes a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceDefinition {
    /// Keep the namespace of the source.
    #[default]
    Source,
    /// Let the destination use its default namespace.
    Destination,
    /// Derive the namespace from a format containing [`SOURCE_NAMESPACE_PLACEHOLDER`].
    CustomFormat,
}

/// Mapper applying a namespace definition and a stream name prefix.
#[derive(Debug, Clone)]
pub struct NamespacingMapper {
    definition: NamespaceDefinition,
    format: Option<String>,
    prefix: String,
    destination_to_source: HashMap<StreamDescriptor, StreamDescriptor>,
}

impl NamespacingMapper {
    /// Creates a mapper, precomputing the reverse lookups of the streams in `catalog`.
    pub fn new(
        definition: NamespaceDefinition,
        format: Option<String>,
        prefix: Option<String>,
        catalog: &ConfiguredCatalog,
    ) -> Self {
        let mut mapper = Self {
            definition,
            format,
            prefix: prefix.unwrap_or_default(),
            destination_to_source: HashMap::new(),
        };

        for source in catalog.descriptors() {
            let destination = mapper.map_descriptor(source);
            if let Some(existing) = mapper
                .destination_to_source
                .insert(destination.clone(), source.clone())
            {
                warn!(
                    %destination,
                    first = %existing,
                    second = %source,
                    "two source streams map to the same destination stream"
                );
            }
        }

        mapper
    }

    fn map_namespace(&self, namespace: Option<&str>) -> Option<String> {
        match self.definition {
            NamespaceDefinition::Source => namespace.map(str::to_string),
            NamespaceDefinition::Destination => None,
            NamespaceDefinition::CustomFormat => {
                let format = self.format.as_deref().unwrap_or_default();
                let mapped = format.replace(SOURCE_NAMESPACE_PLACEHOLDER, namespace.unwrap_or(""));
                let mapped = mapped.trim();
                (!mapped.is_empty()).then(|| mapped.to_string())
            }
        }
    }

    fn map_descriptor(&self, stream: &StreamDescriptor) -> StreamDescriptor {
        StreamDescriptor {
            name: format!("{}{}", self.prefix, stream.name),
            namespace: self.map_namespace(stream.namespace.as_deref()),
        }
    }

    fn revert_descriptor(&self, stream: &StreamDescriptor) -> StreamDescriptor {
        if let Some(source) = self.destination_to_source.get(stream) {
            return source.clone();
        }

        let name = stream
            .name
            .strip_prefix(self.prefix.as_str())
            .unwrap_or(&stream.name);
        StreamDescriptor {
            name: name.to_string(),
            namespace: stream.namespace.clone(),
        }
    }
}

impl Mapper for NamespacingMapper {
    fn map_catalog(&self, catalog: &ConfiguredCatalog) -> ConfiguredCatalog {
        let mut mapped = catalog.clone();
        for configured in &mut mapped.streams {
            configured.stream = self.map_descriptor(&configured.stream);
        }

        mapped
    }

    fn map_message(&self, message: Message) -> Message {
        rewrite_streams(message, |stream| self.map_descriptor(stream))
    }

    fn revert_map(&self, message: Message) -> Message {
        rewrite_streams(message, |stream| self.revert_descriptor(stream))
    }
}

/// Applies `rewrite` to every stream descriptor carried by `message`.
fn rewrite_streams<F>(message: Message, rewrite: F) -> Message
where
    F: Fn(&StreamDescriptor) -> StreamDescriptor,
{
    match message {
        Message::Record(mut record) => {
            record.stream = rewrite(&record.stream);
            Message::Record(record)
        }
        Message::State(mut state) => {
            state.scope = match state.scope {
                StateScope::Stream(stream) => StateScope::Stream(rewrite(&stream)),
                StateScope::Global(streams) => {
                    StateScope::Global(streams.iter().map(&rewrite).collect())
                }
                StateScope::Legacy => StateScope::Legacy,
            };
            Message::State(state)
        }
        Message::Trace(mut trace) => {
            match &mut trace.kind {
                TraceKind::Error(error) => {
                    error.stream = error.stream.as_ref().map(&rewrite);
                }
                TraceKind::StreamStatus(status) => status.stream = rewrite(&status.stream),
                TraceKind::Estimate(estimate) => estimate.stream = rewrite(&estimate.stream),
            }
            Message::Trace(trace)
        }
        message @ (Message::Log(_) | Message::Control(_)) => message,
    }
}
