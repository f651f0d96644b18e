//! CDR payload decoder.
//!
//! Payloads start with a 4-byte encapsulation header: a big-endian
//! representation id followed by two option bytes. The id selects byte order
//! and alignment:
//!
//! | id       | encoding          | max alignment |
//! |----------|-------------------|---------------|
//! | `0x0000` | CDR, big endian   | 8             |
//! | `0x0001` | CDR, little endian| 8             |
//! | `0x0006` | CDR2, big endian  | 4             |
//! | `0x0007` | CDR2, little endian| 4            |
//!
//! Alignment is measured from the end of the header. Strings and sequences
//! carry a `u32` length prefix; fixed arrays do not. A serializer may pad the
//! payload to a 4-byte boundary, so up to 3 trailing bytes are accepted.

use super::{DecodeError, Fields, PayloadDecoder, Value};
use crate::schema::{FieldKind, FieldLayout, ScalarKind};

const HEADER_LEN: usize = 4;
const TRAILING_ALIGN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Big,
    Little,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Encapsulation {
    order: ByteOrder,
    max_align: usize,
}

impl Encapsulation {
    fn from_header(header: [u8; HEADER_LEN]) -> Result<Self, DecodeError> {
        let id = u16::from_be_bytes([header[0], header[1]]);
        let (order, max_align) = match id {
            0x0000 => (ByteOrder::Big, 8),
            0x0001 => (ByteOrder::Little, 8),
            0x0006 => (ByteOrder::Big, 4),
            0x0007 => (ByteOrder::Little, 4),
            _ => return Err(DecodeError::UnsupportedEncapsulation { id }),
        };
        Ok(Self { order, max_align })
    }
}

/// Stateless CDR decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct CdrDecoder;

impl PayloadDecoder for CdrDecoder {
    fn decode(&self, payload: &[u8], layout: &FieldLayout) -> Result<Fields, DecodeError> {
        let header: [u8; HEADER_LEN] = payload
            .get(..HEADER_LEN)
            .and_then(|h| h.try_into().ok())
            .ok_or(DecodeError::Truncated {
                offset: 0,
                needed: HEADER_LEN,
                remaining: payload.len(),
            })?;
        let encapsulation = Encapsulation::from_header(header)?;
        let mut cursor = Cursor {
            buf: &payload[HEADER_LEN..],
            pos: 0,
            encapsulation,
        };
        let fields = cursor.read_struct(layout)?;
        cursor.finish()?;
        Ok(fields)
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    encapsulation: Encapsulation,
}

macro_rules! read_num {
    ($cursor:ident, $ty:ty) => {{
        let bytes = $cursor.fixed::<{ std::mem::size_of::<$ty>() }>()?;
        match $cursor.encapsulation.order {
            ByteOrder::Big => <$ty>::from_be_bytes(bytes),
            ByteOrder::Little => <$ty>::from_le_bytes(bytes),
        }
    }};
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn truncated(&self, needed: usize) -> DecodeError {
        DecodeError::Truncated {
            offset: HEADER_LEN + self.pos,
            needed,
            remaining: self.remaining(),
        }
    }

    fn align(&mut self, width: usize) -> Result<(), DecodeError> {
        let align = width.min(self.encapsulation.max_align);
        if align <= 1 {
            return Ok(());
        }
        let pad = (align - self.pos % align) % align;
        if pad > self.remaining() {
            return Err(self.truncated(pad));
        }
        self.pos += pad;
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(self.truncated(len));
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn fixed<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        self.align(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_len(&mut self) -> Result<usize, DecodeError> {
        Ok(read_num!(self, u32) as usize)
    }

    fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_len()?;
        let start = HEADER_LEN + self.pos;
        let bytes = self.take(len)?;
        let bytes = bytes.strip_suffix(&[0]).unwrap_or(bytes);
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8 { offset: start })
    }

    fn read_scalar(&mut self, field: &str, kind: ScalarKind) -> Result<Value, DecodeError> {
        let value = match kind {
            ScalarKind::Bool => Value::Bool(self.fixed::<1>()?[0] != 0),
            ScalarKind::Byte | ScalarKind::Char | ScalarKind::UInt8 => Value::U8(self.fixed::<1>()?[0]),
            ScalarKind::Int8 => Value::I8(read_num!(self, i8)),
            ScalarKind::Int16 => Value::I16(read_num!(self, i16)),
            ScalarKind::UInt16 => Value::U16(read_num!(self, u16)),
            ScalarKind::Int32 => Value::I32(read_num!(self, i32)),
            ScalarKind::UInt32 => Value::U32(read_num!(self, u32)),
            ScalarKind::Int64 => Value::I64(read_num!(self, i64)),
            ScalarKind::UInt64 => Value::U64(read_num!(self, u64)),
            ScalarKind::Float32 => Value::F32(read_num!(self, f32)),
            ScalarKind::Float64 => Value::F64(read_num!(self, f64)),
            ScalarKind::String => Value::String(self.read_string()?),
            ScalarKind::WString => {
                return Err(DecodeError::UnsupportedKind {
                    field: field.to_string(),
                    kind: kind.name().to_string(),
                })
            }
        };
        Ok(value)
    }

    fn read_elements(
        &mut self,
        field: &str,
        element: &FieldKind,
        count: usize,
    ) -> Result<Vec<Value>, DecodeError> {
        // Reject counts the remaining bytes cannot possibly hold before allocating.
        let needed = count.saturating_mul(min_encoded_size(element).max(1));
        if needed > self.remaining() {
            return Err(self.truncated(needed));
        }
        let mut items = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            items.push(self.read_kind(field, element)?);
        }
        Ok(items)
    }

    fn read_kind(&mut self, field: &str, kind: &FieldKind) -> Result<Value, DecodeError> {
        match kind {
            FieldKind::Scalar(scalar) => self.read_scalar(field, *scalar),
            FieldKind::Nested(layout) => Ok(Value::Message(self.read_struct(layout)?)),
            FieldKind::Sequence { element, bound } => {
                let count = self.read_len()?;
                if let Some(bound) = *bound {
                    if count > bound {
                        return Err(DecodeError::BoundExceeded {
                            field: field.to_string(),
                            len: count,
                            bound,
                        });
                    }
                }
                Ok(Value::Sequence(self.read_elements(field, element, count)?))
            }
            FieldKind::Array { element, len } => {
                Ok(Value::Sequence(self.read_elements(field, element, *len)?))
            }
        }
    }

    fn read_struct(&mut self, layout: &FieldLayout) -> Result<Fields, DecodeError> {
        let mut fields = Fields::with_capacity(layout.fields.len());
        if layout.is_empty() {
            // Generated code gives empty structures a single placeholder byte.
            self.take(1)?;
            return Ok(fields);
        }
        for field in &layout.fields {
            let value = self.read_kind(&field.name, &field.kind)?;
            fields.insert(field.name.clone(), value);
        }
        Ok(fields)
    }

    fn finish(&self) -> Result<(), DecodeError> {
        let padded_end = self.pos.div_ceil(TRAILING_ALIGN) * TRAILING_ALIGN;
        if self.buf.len() > padded_end {
            return Err(DecodeError::TrailingBytes {
                offset: HEADER_LEN + self.pos,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }
}

/// Fewest bytes an encoded value of `kind` can occupy, padding ignored.
fn min_encoded_size(kind: &FieldKind) -> usize {
    match kind {
        FieldKind::Scalar(scalar) => scalar.width().unwrap_or(4),
        FieldKind::Nested(layout) if layout.is_empty() => 1,
        FieldKind::Nested(layout) => layout
            .fields
            .iter()
            .fold(0usize, |acc, f| acc.saturating_add(min_encoded_size(&f.kind))),
        FieldKind::Sequence { .. } => 4,
        FieldKind::Array { element, len } => len.saturating_mul(min_encoded_size(element)),
    }
}
