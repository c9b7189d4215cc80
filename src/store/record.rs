//! Versioned record types
//!
//! A record is one `(key, version)` entry in the store. Its `user_meta` byte
//! says how the payload relates to older versions of the key.

/// Schema entry, never part of a posting list chain.
pub const BIT_SCHEMA_POSTING: u8 = 0x01;
/// Incremental postings layered on top of every older version.
pub const BIT_DELTA_POSTING: u8 = 0x04;
/// Full snapshot of the list as of the record's version.
pub const BIT_COMPLETE_POSTING: u8 = 0x08;
/// Complete snapshot with no postings.
pub const BIT_EMPTY_POSTING: u8 = 0x10 | BIT_COMPLETE_POSTING;

/// How a record participates in list reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Complete,
    Delta,
    /// Neither bit set: the log's structural contract is violated.
    Unknown(u8),
}

impl RecordKind {
    /// Classify a metadata byte. Complete wins when both bits are present.
    pub fn from_meta(user_meta: u8) -> Self {
        if user_meta & BIT_COMPLETE_POSTING > 0 {
            RecordKind::Complete
        } else if user_meta & BIT_DELTA_POSTING > 0 {
            RecordKind::Delta
        } else {
            RecordKind::Unknown(user_meta)
        }
    }
}

/// One version of one key as returned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedRecord {
    pub key: Vec<u8>,
    pub version: u64,
    pub user_meta: u8,
    pub value: Vec<u8>,
    /// No version older than this one is needed for the key.
    pub discard_earlier_versions: bool,
    /// Tombstoned or past its expiry; history ends here.
    pub deleted_or_expired: bool,
}

impl VersionedRecord {
    pub fn new(key: impl Into<Vec<u8>>, version: u64, user_meta: u8, value: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            version,
            user_meta,
            value,
            discard_earlier_versions: false,
            deleted_or_expired: false,
        }
    }

    pub fn complete(key: impl Into<Vec<u8>>, version: u64, value: Vec<u8>) -> Self {
        Self::new(key, version, BIT_COMPLETE_POSTING, value)
    }

    pub fn delta(key: impl Into<Vec<u8>>, version: u64, value: Vec<u8>) -> Self {
        Self::new(key, version, BIT_DELTA_POSTING, value)
    }

    pub fn with_discard_earlier_versions(mut self) -> Self {
        self.discard_earlier_versions = true;
        self
    }

    pub fn deleted(mut self) -> Self {
        self.deleted_or_expired = true;
        self
    }

    #[inline]
    pub fn kind(&self) -> RecordKind {
        RecordKind::from_meta(self.user_meta)
    }
}

/// A record to append, tagged with an explicit version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub user_meta: u8,
    pub version: u64,
}
