use crate::catalog::TopicDescriptor;
use crate::config::StorageId;
use crate::store::{ContainerStore, RawEntry};
use crate::{Error, Result};

/// Container held entirely in memory.
///
/// Entries are returned in insertion order. Useful as a stand-in for an
/// on-disk container in tests and when entries come from another source.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    topics: Vec<TopicDescriptor>,
    entries: Vec<RawEntry>,
    position: usize,
    closed: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_topic(mut self, name: &str, type_name: &str, serialization: &str) -> Self {
        self.add_topic(TopicDescriptor::new(name, type_name, serialization));
        self
    }

    pub fn add_topic(&mut self, descriptor: TopicDescriptor) {
        self.topics.push(descriptor);
    }

    /// Append an entry. The topic's message count is bumped when known;
    /// entries for undeclared topics are kept as-is.
    pub fn push(&mut self, topic: &str, payload: Vec<u8>, time_ns: i64) {
        if let Some(descriptor) = self.topics.iter_mut().find(|t| t.name == topic) {
            descriptor.message_count += 1;
        }
        self.entries.push(RawEntry {
            topic_name: topic.to_string(),
            payload,
            time_ns,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::ReaderClosed);
        }
        Ok(())
    }
}

impl ContainerStore for MemoryStore {
    fn storage_id(&self) -> StorageId {
        StorageId::Memory
    }

    fn metadata(&self) -> Result<Vec<TopicDescriptor>> {
        self.ensure_open()?;
        Ok(self.topics.clone())
    }

    fn rewind(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.position = 0;
        Ok(())
    }

    fn next_entry(&mut self) -> Result<Option<RawEntry>> {
        self.ensure_open()?;
        let entry = self.entries.get(self.position).cloned();
        if entry.is_some() {
            self.position += 1;
        }
        Ok(entry)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.entries.clear();
        Ok(())
    }
}
