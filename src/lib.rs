//! Read-only access to ROS 2 bag containers.
//!
//! A [`Reader`] opens a container, builds its topic catalog and yields every
//! stored message as a [`Record`]: the decoded fields of the payload merged
//! with the topic name, type name and receive time.

pub mod catalog;
pub mod config;
pub mod decode;
pub mod error;
pub mod filter;
pub mod reader;
pub mod record;
pub mod schema;
pub mod store;

pub use catalog::{TopicCatalog, TopicDescriptor};
pub use config::{MalformedPolicy, ReaderConfig, SerializationFormat, StorageId};
pub use decode::{DecodeError, Fields, Value};
pub use error::{Error, Result};
pub use filter::RecordFilter;
pub use reader::{Reader, ReaderState, Records};
pub use record::Record;
pub use schema::{FieldLayout, MsgRegistry, SchemaRegistry, StaticRegistry};
pub use store::{ContainerStore, MemoryStore, RawEntry};
#[cfg(feature = "sqlite")]
pub use store::SqliteStore;
