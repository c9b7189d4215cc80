//! In-process versioned record store
//!
//! Records live in one ordered map keyed by `(key, Reverse(version))`, so a
//! forward range walk yields keys ascending and versions descending.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{RwLock, RwLockReadGuard};

use super::{VersionIterator, VersionedRecord, VersionedStore, WriteEntry};
use crate::error::{render_key, MvccError, MvccResult};

type StoreKey = (Vec<u8>, Reverse<u64>);

#[derive(Debug, Clone)]
struct StoredValue {
    user_meta: u8,
    value: Vec<u8>,
    discard_earlier_versions: bool,
    tombstone: bool,
    /// Unix seconds; zero means the record never expires.
    expires_at: u64,
}

impl StoredValue {
    fn is_deleted_or_expired(&self, now: u64) -> bool {
        self.tombstone || (self.expires_at != 0 && self.expires_at <= now)
    }

    fn to_record(&self, key: &[u8], version: u64, now: u64) -> VersionedRecord {
        VersionedRecord {
            key: key.to_vec(),
            version,
            user_meta: self.user_meta,
            value: self.value.clone(),
            discard_earlier_versions: self.discard_earlier_versions,
            deleted_or_expired: self.is_deleted_or_expired(now),
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Multi-version store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<StoreKey, StoredValue>>,
    /// Number of upcoming `write_batch` calls that fail without writing.
    failing_writes: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record as-is, including its discard and deleted flags.
    pub fn insert(&self, record: VersionedRecord) {
        let stored = StoredValue {
            user_meta: record.user_meta,
            value: record.value,
            discard_earlier_versions: record.discard_earlier_versions,
            tombstone: record.deleted_or_expired,
            expires_at: 0,
        };
        self.data
            .write()
            .insert((record.key, Reverse(record.version)), stored);
    }

    /// Write a tombstone for `key` at `version`.
    pub fn delete_at(&self, key: &[u8], version: u64) {
        let stored = StoredValue {
            user_meta: 0,
            value: Vec::new(),
            discard_earlier_versions: false,
            tombstone: true,
            expires_at: 0,
        };
        self.data
            .write()
            .insert((key.to_vec(), Reverse(version)), stored);
    }

    /// Set the expiry (unix seconds) of an existing record.
    pub fn set_expiry(&self, key: &[u8], version: u64, expires_at: u64) -> MvccResult<()> {
        let mut data = self.data.write();
        let stored = data
            .get_mut(&(key.to_vec(), Reverse(version)))
            .ok_or_else(|| missing(key, version))?;
        stored.expires_at = expires_at;
        Ok(())
    }

    /// Mark an existing record as the oldest version ever needed for its key.
    pub fn set_discard_earlier_versions(&self, key: &[u8], version: u64) -> MvccResult<()> {
        let mut data = self.data.write();
        let stored = data
            .get_mut(&(key.to_vec(), Reverse(version)))
            .ok_or_else(|| missing(key, version))?;
        stored.discard_earlier_versions = true;
        Ok(())
    }

    /// All versions of `key`, newest first.
    pub fn versions(&self, key: &[u8]) -> Vec<VersionedRecord> {
        let now = now_secs();
        let data = self.data.read();
        let start: StoreKey = (key.to_vec(), Reverse(u64::MAX));
        data.range((Bound::Included(start), Bound::Unbounded))
            .take_while(|((k, _), _)| k.as_slice() == key)
            .map(|((k, Reverse(v)), stored)| stored.to_record(k, *v, now))
            .collect()
    }

    /// Total number of records across all keys.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Make the next `count` batch writes fail with a storage error.
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    fn take_write_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn missing(key: &[u8], version: u64) -> MvccError {
    MvccError::storage(format!(
        "no record for key {} at version {}",
        render_key(key),
        version
    ))
}

impl VersionedStore for MemoryStore {
    fn get_at(&self, key: &[u8], read_ts: u64) -> MvccResult<Option<VersionedRecord>> {
        let now = now_secs();
        let data = self.data.read();
        let start: StoreKey = (key.to_vec(), Reverse(read_ts));
        let newest = data
            .range((Bound::Included(start), Bound::Unbounded))
            .next()
            .filter(|((k, _), _)| k.as_slice() == key);

        Ok(match newest {
            Some(((k, Reverse(v)), stored)) if !stored.is_deleted_or_expired(now) => {
                Some(stored.to_record(k, *v, now))
            }
            _ => None,
        })
    }

    fn iter_versions<'a>(
        &'a self,
        key: &[u8],
        read_ts: u64,
    ) -> MvccResult<Box<dyn VersionIterator + 'a>> {
        let mut it = MemoryIterator {
            data: self.data.read(),
            read_ts,
            now: now_secs(),
            current: None,
        };
        it.current = it.seek(Bound::Included((key.to_vec(), Reverse(read_ts))));
        Ok(Box::new(it))
    }

    fn write_batch(&self, entries: Vec<WriteEntry>) -> MvccResult<()> {
        if self.take_write_failure() {
            return Err(MvccError::storage("injected write failure"));
        }
        let mut data = self.data.write();
        for entry in entries {
            let stored = StoredValue {
                user_meta: entry.user_meta,
                value: entry.value,
                discard_earlier_versions: false,
                tombstone: false,
                expires_at: 0,
            };
            data.insert((entry.key, Reverse(entry.version)), stored);
        }
        Ok(())
    }
}

/// Cursor holding a read snapshot of the store for its whole lifetime.
struct MemoryIterator<'a> {
    data: RwLockReadGuard<'a, BTreeMap<StoreKey, StoredValue>>,
    read_ts: u64,
    now: u64,
    current: Option<VersionedRecord>,
}

impl MemoryIterator<'_> {
    fn seek(&self, from: Bound<StoreKey>) -> Option<VersionedRecord> {
        self.data
            .range((from, Bound::Unbounded))
            .find(|((_, Reverse(v)), _)| *v <= self.read_ts)
            .map(|((k, Reverse(v)), stored)| stored.to_record(k, *v, self.now))
    }
}

impl VersionIterator for MemoryIterator<'_> {
    fn item(&mut self) -> MvccResult<Option<&VersionedRecord>> {
        Ok(self.current.as_ref())
    }

    fn next(&mut self) {
        if let Some(current) = self.current.take() {
            let from = Bound::Excluded((current.key, Reverse(current.version)));
            self.current = self.seek(from);
        }
    }
}
