//! Container Store backends.
//!
//! A store exposes the topics recorded in a container and a sequential
//! cursor over its raw entries in container order. Stores know nothing about
//! payload encodings.

#[cfg(feature = "sqlite")]
pub mod bag_metadata;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::path::Path;

use crate::catalog::TopicDescriptor;
use crate::config::{ReaderConfig, StorageId};
use crate::{Error, Result};

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// One stored message as it comes off the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub topic_name: String,
    pub payload: Vec<u8>,
    pub time_ns: i64,
}

pub trait ContainerStore: Send {
    fn storage_id(&self) -> StorageId;

    /// Topics in the order the container reports them.
    fn metadata(&self) -> Result<Vec<TopicDescriptor>>;

    /// Reset the cursor to the first entry.
    fn rewind(&mut self) -> Result<()>;

    /// Next entry in container order, or `None` at end of stream.
    fn next_entry(&mut self) -> Result<Option<RawEntry>>;

    /// Release the underlying handle. Further cursor calls are invalid.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Open the backend selected by `config.storage` on `path`.
pub fn open_store(path: &Path, config: &ReaderConfig) -> Result<Box<dyn ContainerStore>> {
    match config.storage {
        #[cfg(feature = "sqlite")]
        StorageId::Sqlite3 => Ok(Box::new(SqliteStore::open(path, config.page_size)?)),
        #[cfg(not(feature = "sqlite"))]
        StorageId::Sqlite3 => Err(Error::open(path, "sqlite3 support not compiled in")),
        StorageId::Memory => Err(Error::open(
            path,
            "memory storage cannot be opened from a path",
        )),
    }
}
