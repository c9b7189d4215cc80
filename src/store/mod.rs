//! Versioned record store seam
//!
//! The store is append-only and multi-versioned: every write is a new
//! `(key, version)` record, iteration runs key-ascending and, within a key,
//! version-descending.
//!
//! This module provides:
//! - `VersionedStore` - The operations the posting list core consumes
//! - `VersionIterator` - Cursor over descending versions
//! - `MemoryStore` - In-process implementation
//! - `TxnWriter` - Batched append of commit records

mod memory;
mod record;
mod writer;

pub use memory::MemoryStore;
pub use record::{
    RecordKind, VersionedRecord, WriteEntry, BIT_COMPLETE_POSTING, BIT_DELTA_POSTING,
    BIT_EMPTY_POSTING, BIT_SCHEMA_POSTING,
};
pub use writer::TxnWriter;

use crate::error::MvccResult;

/// Cursor over records in store order, newest version of a key first.
///
/// The cursor starts positioned on its first record. `item` returns `None`
/// once the cursor is exhausted.
pub trait VersionIterator {
    fn item(&mut self) -> MvccResult<Option<&VersionedRecord>>;

    fn next(&mut self);
}

pub trait VersionedStore: Send + Sync {
    /// Newest record of `key` with `version <= read_ts`.
    ///
    /// Returns `None` when the key has no such record or the newest one is
    /// deleted or expired.
    fn get_at(&self, key: &[u8], read_ts: u64) -> MvccResult<Option<VersionedRecord>>;

    /// Cursor seeked to `key`, yielding versions `<= read_ts`.
    ///
    /// The cursor is not bounded to `key` and may continue into later keys.
    fn iter_versions<'a>(
        &'a self,
        key: &[u8],
        read_ts: u64,
    ) -> MvccResult<Box<dyn VersionIterator + 'a>>;

    /// Append all entries atomically.
    fn write_batch(&self, entries: Vec<WriteEntry>) -> MvccResult<()>;
}

/// A cursor over records that are already materialized.
pub struct VecIterator {
    records: Vec<VersionedRecord>,
    pos: usize,
}

impl VecIterator {
    /// `records` must be in store order.
    pub fn new(records: Vec<VersionedRecord>) -> Self {
        Self { records, pos: 0 }
    }

    /// Records the cursor has moved past.
    pub fn consumed(&self) -> usize {
        self.pos
    }
}

impl VersionIterator for VecIterator {
    fn item(&mut self) -> MvccResult<Option<&VersionedRecord>> {
        Ok(self.records.get(self.pos))
    }

    fn next(&mut self) {
        if self.pos < self.records.len() {
            self.pos += 1;
        }
    }
}
