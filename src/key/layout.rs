//! Structured key layout
//!
//! ```text
//! +--------+-----------------+-----------+------+-------------------------+
//! | prefix | attr len (u16BE)| attr      | type | rest                    |
//! +--------+-----------------+-----------+------+-------------------------+
//!   0x00 default: type 0x00 data    rest = uid (u64 BE)
//!                 type 0x02 index   rest = term bytes
//!                 type 0x04 reverse rest = uid (u64 BE)
//!                 type 0x08 count   rest = count (u32 BE)
//!                 type 0x0c rcount  rest = count (u32 BE)
//!   0x01 schema:  no type byte, no rest
//! ```
//!
//! Keys of one predicate share a prefix so they stay adjacent in the store.

use crate::error::{MvccError, MvccResult};

const DEFAULT_PREFIX: u8 = 0x00;
const SCHEMA_PREFIX: u8 = 0x01;

const BYTE_DATA: u8 = 0x00;
const BYTE_INDEX: u8 = 0x02;
const BYTE_REVERSE: u8 = 0x04;
const BYTE_COUNT: u8 = 0x08;
const BYTE_COUNT_REV: u8 = BYTE_COUNT | BYTE_REVERSE;

/// What a structured key addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyKind {
    Data { uid: u64 },
    Index { term: Vec<u8> },
    Reverse { uid: u64 },
    Count { count: u32, reverse: bool },
    Schema,
}

/// A decoded structured key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    /// Predicate name
    pub attr: String,
    pub kind: KeyKind,
}

impl ParsedKey {
    /// Decode a structured key. Keys that do not follow the layout are
    /// reported as `CorruptFormat`.
    pub fn parse(key: &[u8]) -> MvccResult<Self> {
        if key.len() < 3 {
            return Err(MvccError::corrupt(key, "key shorter than its header"));
        }
        let prefix = key[0];
        let attr_len = u16::from_be_bytes([key[1], key[2]]) as usize;
        let rest = &key[3..];
        if rest.len() < attr_len {
            return Err(MvccError::corrupt(key, "attribute length exceeds key"));
        }
        let attr = std::str::from_utf8(&rest[..attr_len])
            .map_err(|_| MvccError::corrupt(key, "attribute is not valid UTF-8"))?
            .to_string();
        let rest = &rest[attr_len..];

        match prefix {
            SCHEMA_PREFIX => {
                return Ok(Self {
                    attr,
                    kind: KeyKind::Schema,
                })
            }
            DEFAULT_PREFIX => {}
            other => {
                return Err(MvccError::corrupt(
                    key,
                    format!("unknown key prefix: {:#04x}", other),
                ))
            }
        }

        let (&byte_type, rest) = rest
            .split_first()
            .ok_or_else(|| MvccError::corrupt(key, "missing key type byte"))?;

        let kind = match byte_type {
            BYTE_DATA | BYTE_REVERSE => {
                let uid = read_u64(rest).ok_or_else(|| MvccError::corrupt(key, "uid truncated"))?;
                if byte_type == BYTE_DATA {
                    KeyKind::Data { uid }
                } else {
                    KeyKind::Reverse { uid }
                }
            }
            BYTE_INDEX => KeyKind::Index {
                term: rest.to_vec(),
            },
            BYTE_COUNT | BYTE_COUNT_REV => {
                let count =
                    read_u32(rest).ok_or_else(|| MvccError::corrupt(key, "count truncated"))?;
                KeyKind::Count {
                    count,
                    reverse: byte_type == BYTE_COUNT_REV,
                }
            }
            other => {
                return Err(MvccError::corrupt(
                    key,
                    format!("unknown key type: {:#04x}", other),
                ))
            }
        };

        Ok(Self { attr, kind })
    }

    pub fn is_data(&self) -> bool {
        matches!(self.kind, KeyKind::Data { .. })
    }

    pub fn is_schema(&self) -> bool {
        matches!(self.kind, KeyKind::Schema)
    }
}

fn read_u64(buf: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = buf.get(..8)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

fn read_u32(buf: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// Longest attribute name the `u16` length field can describe.
pub const MAX_ATTR_LEN: usize = u16::MAX as usize;

fn with_attr(prefix: u8, attr: &str, extra: usize) -> MvccResult<Vec<u8>> {
    let attr_len = u16::try_from(attr.len()).map_err(|_| {
        MvccError::InvalidKey(format!(
            "attribute name is {} bytes, at most {} allowed",
            attr.len(),
            MAX_ATTR_LEN
        ))
    })?;
    let mut buf = Vec::with_capacity(3 + attr.len() + extra);
    buf.push(prefix);
    buf.extend_from_slice(&attr_len.to_be_bytes());
    buf.extend_from_slice(attr.as_bytes());
    Ok(buf)
}

pub fn data_key(attr: &str, uid: u64) -> MvccResult<Vec<u8>> {
    let mut buf = with_attr(DEFAULT_PREFIX, attr, 9)?;
    buf.push(BYTE_DATA);
    buf.extend_from_slice(&uid.to_be_bytes());
    Ok(buf)
}

pub fn reverse_key(attr: &str, uid: u64) -> MvccResult<Vec<u8>> {
    let mut buf = with_attr(DEFAULT_PREFIX, attr, 9)?;
    buf.push(BYTE_REVERSE);
    buf.extend_from_slice(&uid.to_be_bytes());
    Ok(buf)
}

pub fn index_key(attr: &str, term: &[u8]) -> MvccResult<Vec<u8>> {
    let mut buf = with_attr(DEFAULT_PREFIX, attr, 1 + term.len())?;
    buf.push(BYTE_INDEX);
    buf.extend_from_slice(term);
    Ok(buf)
}

pub fn count_key(attr: &str, count: u32, reverse: bool) -> MvccResult<Vec<u8>> {
    let mut buf = with_attr(DEFAULT_PREFIX, attr, 5)?;
    buf.push(if reverse { BYTE_COUNT_REV } else { BYTE_COUNT });
    buf.extend_from_slice(&count.to_be_bytes());
    Ok(buf)
}

pub fn schema_key(attr: &str) -> MvccResult<Vec<u8>> {
    with_attr(SCHEMA_PREFIX, attr, 0)
}
