//! Topic catalog built once from container metadata.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::Serialize;

use crate::{Error, Result};

/// One topic as reported by the container at open time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicDescriptor {
    pub name: String,
    pub type_name: String,
    pub serialization: String,
    pub message_count: u64,
}

impl TopicDescriptor {
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        serialization: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            serialization: serialization.into(),
            message_count: 0,
        }
    }
}

/// Immutable topic lookup table.
///
/// Keeps the order reported by the container. Names are unique; a repeated
/// name keeps the first descriptor.
#[derive(Debug, Clone, Default)]
pub struct TopicCatalog {
    topics: Vec<TopicDescriptor>,
    by_name: HashMap<String, usize>,
}

impl TopicCatalog {
    pub fn new(descriptors: impl IntoIterator<Item = TopicDescriptor>) -> Self {
        let mut catalog = Self::default();
        for descriptor in descriptors {
            if catalog.by_name.contains_key(&descriptor.name) {
                log::warn!("duplicate topic {} in container metadata, keeping first", descriptor.name);
                continue;
            }
            catalog
                .by_name
                .insert(descriptor.name.clone(), catalog.topics.len());
            catalog.topics.push(descriptor);
        }
        catalog
    }

    pub fn topics(&self) -> HashSet<&str> {
        self.topics.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn type_of(&self, topic: &str) -> Result<&str> {
        self.get(topic)
            .map(|t| t.type_name.as_str())
            .ok_or_else(|| Error::UnknownTopic {
                topic: topic.to_string(),
            })
    }

    /// Topic to type name, in container metadata order.
    pub fn type_map(&self) -> IndexMap<String, String> {
        self.topics
            .iter()
            .map(|t| (t.name.clone(), t.type_name.clone()))
            .collect()
    }

    pub fn get(&self, topic: &str) -> Option<&TopicDescriptor> {
        self.by_name.get(topic).map(|&idx| &self.topics[idx])
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.by_name.contains_key(topic)
    }

    pub fn descriptors(&self) -> &[TopicDescriptor] {
        &self.topics
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Sum of the per-topic message counts.
    pub fn message_count(&self) -> u64 {
        self.topics.iter().map(|t| t.message_count).sum()
    }
}
