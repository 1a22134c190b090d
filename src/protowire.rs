//! Minimal protobuf wire-format reader.
//!
//! Only the two wire types that local session blobs actually use are
//! supported: varints (type 0) and length-delimited fields (type 2).
//! Everything here is a pure function over a byte slice.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Errors produced while decoding wire-format bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The buffer ended while a varint still had its continuation bit set.
    TruncatedInput,
    /// A length-delimited field declared more bytes than remain.
    TruncatedField { field: u64, declared: u64, remaining: usize },
    /// Wire types other than varint and length-delimited.
    UnsupportedWireType { field: u64, wire_type: u8 },
    /// A varint longer than ten bytes or with bits beyond 64.
    VarintOverflow,
}

impl Display for WireError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TruncatedInput => write!(f, "truncated varint"),
            Self::TruncatedField {
                field,
                declared,
                remaining,
            } => write!(
                f,
                "field {} declares {} bytes but only {} remain",
                field, declared, remaining
            ),
            Self::UnsupportedWireType { field, wire_type } => {
                write!(f, "field {} uses unsupported wire type {}", field, wire_type)
            }
            Self::VarintOverflow => write!(f, "varint exceeds 64 bits"),
        }
    }
}

impl std::error::Error for WireError {}

/// A single decoded field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireValue {
    Varint(u64),
    LengthDelimited(Vec<u8>),
}

/// Decoded record: field number to every value seen for it, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireRecord {
    fields: BTreeMap<u64, Vec<WireValue>>,
}

impl WireRecord {
    /// All values recorded for a field, in encounter order.
    pub fn values(&self, field: u64) -> &[WireValue] {
        self.fields.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Field numbers present in the record, ascending.
    pub fn field_numbers(&self) -> impl Iterator<Item = u64> + '_ {
        self.fields.keys().copied()
    }

    /// Last varint value of a field (protobuf "last one wins" for scalars).
    pub fn varint(&self, field: u64) -> Option<u64> {
        self.values(field).iter().rev().find_map(|v| match v {
            WireValue::Varint(n) => Some(*n),
            WireValue::LengthDelimited(_) => None,
        })
    }

    /// Last length-delimited payload of a field.
    pub fn bytes(&self, field: u64) -> Option<&[u8]> {
        self.values(field).iter().rev().find_map(|v| match v {
            WireValue::LengthDelimited(b) => Some(b.as_slice()),
            WireValue::Varint(_) => None,
        })
    }

    /// Length-delimited payload interpreted as UTF-8; invalid text is absent.
    pub fn string(&self, field: u64) -> Option<&str> {
        self.bytes(field).and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Decodes a length-delimited payload as a nested record.
    pub fn message(&self, field: u64) -> Result<Option<WireRecord>, WireError> {
        self.bytes(field).map(decode_record).transpose()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Reads one little-endian base-128 varint starting at `*pos`.
///
/// On success `*pos` points just past the varint.
pub fn decode_varint(buf: &[u8], pos: &mut usize) -> Result<u64, WireError> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let Some(&byte) = buf.get(*pos) else {
            return Err(WireError::TruncatedInput);
        };
        *pos += 1;

        // The tenth byte may only contribute the single remaining bit.
        if shift == 63 && byte > 1 {
            return Err(WireError::VarintOverflow);
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

/// Encodes a value as a varint. Used by tests and blob fixtures.
pub fn encode_varint(mut value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

/// Decodes a whole buffer of tag/value pairs into a [`WireRecord`].
pub fn decode_record(buf: &[u8]) -> Result<WireRecord, WireError> {
    let mut record = WireRecord::default();
    let mut pos = 0;

    while pos < buf.len() {
        let tag = decode_varint(buf, &mut pos)?;
        let field = tag >> 3;
        let wire_type = (tag & 0x7) as u8;

        let value = match wire_type {
            0 => WireValue::Varint(decode_varint(buf, &mut pos)?),
            2 => {
                let declared = decode_varint(buf, &mut pos)?;
                let remaining = buf.len() - pos;
                let truncated = WireError::TruncatedField {
                    field,
                    declared,
                    remaining,
                };
                let len = usize::try_from(declared).map_err(|_| truncated.clone())?;
                let end = pos.checked_add(len).ok_or_else(|| truncated.clone())?;
                let payload = buf.get(pos..end).ok_or(truncated)?;
                pos = end;
                WireValue::LengthDelimited(payload.to_vec())
            }
            other => {
                return Err(WireError::UnsupportedWireType {
                    field,
                    wire_type: other,
                })
            }
        };

        record.fields.entry(field).or_default().push(value);
    }

    Ok(record)
}

#[cfg(test)]
#[path = "tests/protowire_tests.rs"]
mod tests;
