//! Payload decoding.
//!
//! A [`PayloadDecoder`] turns an opaque payload plus a resolved
//! [`FieldLayout`](crate::schema::FieldLayout) into ordered [`Fields`].
//! Decoders are pure: no I/O and no shared mutable state.

mod cdr;
mod value;

use crate::config::SerializationFormat;
use crate::schema::FieldLayout;

pub use cdr::CdrDecoder;
pub use value::{Fields, Value};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("truncated at byte {offset}: need {needed} bytes, {remaining} remaining")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
    #[error("{remaining} unconsumed bytes after byte {offset}")]
    TrailingBytes { offset: usize, remaining: usize },
    #[error("field {field}: unsupported kind {kind}")]
    UnsupportedKind { field: String, kind: String },
    #[error("invalid utf-8 in string at byte {offset}")]
    InvalidUtf8 { offset: usize },
    #[error("unsupported encapsulation 0x{id:04x}")]
    UnsupportedEncapsulation { id: u16 },
    #[error("field {field}: {len} elements exceed bound {bound}")]
    BoundExceeded {
        field: String,
        len: usize,
        bound: usize,
    },
}

pub trait PayloadDecoder: Send + Sync {
    fn decode(&self, payload: &[u8], layout: &FieldLayout) -> Result<Fields, DecodeError>;
}

/// Decoder variant for a serialization format identifier.
pub fn decoder_for(format: SerializationFormat) -> Box<dyn PayloadDecoder> {
    match format {
        SerializationFormat::Cdr => Box::new(CdrDecoder),
    }
}
