use std::path::PathBuf;

use crate::decode::DecodeError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot open container {}: {reason}", path.display())]
    ContainerOpen { path: PathBuf, reason: String },
    #[error("unknown topic: {topic}")]
    UnknownTopic { topic: String },
    #[error("unknown message type: {type_name}")]
    UnknownType { type_name: String },
    #[error("invalid definition for {type_name}: {reason}")]
    InvalidDefinition { type_name: String, reason: String },
    #[error("malformed payload on {topic} at time_ns {time_ns}: {source}")]
    MalformedPayload {
        topic: String,
        time_ns: i64,
        #[source]
        source: DecodeError,
    },
    #[error("reader closed")]
    ReaderClosed,
    #[error("another record cursor is already active on this reader")]
    ConcurrentAccess,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "sqlite")]
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl Error {
    pub(crate) fn open(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::ContainerOpen {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
