//! Record payload encoding for posting lists
//!
//! ```text
//! +------------------+
//! | Posting Count    | (u32 LE)
//! +------------------+
//! | Uid              | (u64 LE)   \
//! | Op               | (u8)        | repeated
//! | Value Length     | (u32 LE)    | per posting
//! | Value            | (bytes)    /
//! +------------------+
//! | Checksum         | (u32 LE, CRC32 of all preceding bytes)
//! +------------------+
//! ```
//!
//! An empty payload is an empty posting list.

use crc32fast::Hasher;

use super::types::{Posting, PostingList, PostingOp};
use crate::error::{MvccError, MvccResult};

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Encode the persisted part of a posting list.
pub fn encode(plist: &PostingList) -> Vec<u8> {
    let body: usize = plist
        .postings
        .iter()
        .map(|p| 8 + 1 + 4 + p.value.len())
        .sum();
    let mut buf = Vec::with_capacity(4 + body + 4);

    buf.extend_from_slice(&(plist.postings.len() as u32).to_le_bytes());
    for posting in &plist.postings {
        buf.extend_from_slice(&posting.uid.to_le_bytes());
        buf.push(posting.op.as_byte());
        buf.extend_from_slice(&(posting.value.len() as u32).to_le_bytes());
        buf.extend_from_slice(&posting.value);
    }
    let crc = checksum(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

/// Decode a record payload. `key` is only used for error context.
pub fn decode(key: &[u8], data: &[u8]) -> MvccResult<PostingList> {
    if data.is_empty() {
        return Ok(PostingList::new());
    }
    if data.len() < 8 {
        return Err(MvccError::corrupt(key, "payload shorter than header and checksum"));
    }

    let (body, crc_bytes) = data.split_at(data.len() - 4);
    let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    if checksum(body) != stored {
        return Err(MvccError::corrupt(key, "payload checksum mismatch"));
    }

    let mut cursor = Cursor { buf: body, pos: 0 };
    let count = cursor
        .read_u32()
        .ok_or_else(|| MvccError::corrupt(key, "posting count truncated"))?;

    let mut postings = Vec::with_capacity((count as usize).min(body.len() / 13));
    for _ in 0..count {
        let uid = cursor
            .read_u64()
            .ok_or_else(|| MvccError::corrupt(key, "posting uid truncated"))?;
        let op_byte = cursor
            .read_u8()
            .ok_or_else(|| MvccError::corrupt(key, "posting op truncated"))?;
        let op = PostingOp::from_byte(op_byte)
            .ok_or_else(|| MvccError::corrupt(key, format!("unknown posting op: {}", op_byte)))?;
        let len = cursor
            .read_u32()
            .ok_or_else(|| MvccError::corrupt(key, "posting value length truncated"))?;
        let value = cursor
            .read_bytes(len as usize)
            .ok_or_else(|| MvccError::corrupt(key, "posting value truncated"))?;
        postings.push(Posting {
            uid,
            value: value.to_vec(),
            op,
            start_ts: 0,
            commit_ts: 0,
        });
    }
    if cursor.pos != body.len() {
        return Err(MvccError::corrupt(key, "trailing bytes after postings"));
    }

    Ok(PostingList {
        postings,
        commit_ts: 0,
    })
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn read_bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let out = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(out)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.read_bytes(1).map(|b| b[0])
    }

    fn read_u32(&mut self) -> Option<u32> {
        let b = self.read_bytes(4)?;
        Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> Option<u64> {
        let b: [u8; 8] = self.read_bytes(8)?.try_into().ok()?;
        Some(u64::from_le_bytes(b))
    }
}
