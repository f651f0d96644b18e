//! Reader configuration.
//!
//! Selects the container backend, the payload serialization format and the
//! cursor/decoding policies. Both identifiers are fixed for the lifetime of
//! a [`Reader`](crate::Reader).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default number of entries pulled from the container per cursor page.
pub const DEFAULT_PAGE_SIZE: usize = 256;

/// Configuration for a reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Container Store backend.
    /// Default: sqlite3
    #[serde(default)]
    pub storage: StorageId,

    /// Payload serialization format.
    /// Default: cdr
    #[serde(default)]
    pub serialization: SerializationFormat,

    /// Entries fetched per cursor page. Bounds memory held by the cursor.
    /// Default: 256
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// What to do with a record whose payload does not match its layout.
    /// Default: abort iteration
    #[serde(default)]
    pub on_malformed: MalformedPolicy,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            storage: StorageId::default(),
            serialization: SerializationFormat::default(),
            page_size: DEFAULT_PAGE_SIZE,
            on_malformed: MalformedPolicy::default(),
        }
    }
}

impl ReaderConfig {
    /// Build a config from the storage and serialization identifier strings.
    pub fn from_ids(storage_id: &str, serialization_id: &str) -> Result<Self, UnknownIdentifier> {
        Ok(Self {
            storage: storage_id.parse()?,
            serialization: serialization_id.parse()?,
            ..Self::default()
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_malformed_policy(mut self, policy: MalformedPolicy) -> Self {
        self.on_malformed = policy;
        self
    }
}

/// Container Store backend identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageId {
    /// rosbag2 sqlite3 storage plugin (`.db3` files).
    #[default]
    Sqlite3,
    /// Entries held in process memory; only constructed programmatically.
    Memory,
}

impl StorageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageId::Sqlite3 => "sqlite3",
            StorageId::Memory => "memory",
        }
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageId {
    type Err = UnknownIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite3" => Ok(StorageId::Sqlite3),
            "memory" => Ok(StorageId::Memory),
            _ => Err(UnknownIdentifier::storage(s)),
        }
    }
}

/// Payload serialization format identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    /// OMG Common Data Representation with a 4-byte encapsulation header.
    #[default]
    Cdr,
}

impl SerializationFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SerializationFormat::Cdr => "cdr",
        }
    }
}

impl fmt::Display for SerializationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SerializationFormat {
    type Err = UnknownIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cdr" => Ok(SerializationFormat::Cdr),
            _ => Err(UnknownIdentifier::serialization(s)),
        }
    }
}

/// Policy for records whose payload fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Surface the error and end the iteration.
    #[default]
    Abort,
    /// Log the error and continue with the next entry.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported {kind} identifier: {value:?}")]
pub struct UnknownIdentifier {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownIdentifier {
    fn storage(value: &str) -> Self {
        Self {
            kind: "storage",
            value: value.to_string(),
        }
    }

    fn serialization(value: &str) -> Self {
        Self {
            kind: "serialization",
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_config_default() {
        let config = ReaderConfig::default();
        assert_eq!(config.storage, StorageId::Sqlite3);
        assert_eq!(config.serialization, SerializationFormat::Cdr);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.on_malformed, MalformedPolicy::Abort);
    }

    #[test]
    fn test_from_ids() {
        let config = ReaderConfig::from_ids("sqlite3", "CDR").unwrap();
        assert_eq!(config.storage, StorageId::Sqlite3);
        assert_eq!(config.serialization, SerializationFormat::Cdr);

        let err = ReaderConfig::from_ids("mcap", "cdr").unwrap_err();
        assert_eq!(err.kind, "storage");
        assert_eq!(err.value, "mcap");

        let err = ReaderConfig::from_ids("sqlite3", "protobuf").unwrap_err();
        assert_eq!(err.kind, "serialization");
    }

    #[test]
    fn test_page_size_never_zero() {
        let config = ReaderConfig::default().with_page_size(0);
        assert_eq!(config.page_size, 1);
    }

    #[test]
    fn test_config_serialization() {
        let config = ReaderConfig::default().with_malformed_policy(MalformedPolicy::Skip);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"sqlite3\""));
        assert!(json.contains("\"skip\""));
        let deserialized: ReaderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: ReaderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ReaderConfig::default());
    }
}
