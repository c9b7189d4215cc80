//! Observable events of the posting list core
//!
//! Events are explicit and typed.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A posting list was reconstructed from the store
    ListRead,
    /// A record with an unrecognized layout was found (FATAL)
    CorruptRecord,
    /// A delta record was queued for a commit timestamp
    DeltaWritten,
    /// A writer batch reached the store
    BatchFlushed,
    /// The store rejected a writer batch
    BatchFlushFailed,
    /// A fold into memory hit a restructuring list and will be retried
    CommitRetry,
    /// A fold into memory failed for a non-transient reason
    CommitToMemoryFailed,
    /// A commit was refused because the abort flag was set
    CommitRefused,
    /// A written key could not be parsed while filling the txn context
    UnparseableKey,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ListRead => "LIST_READ",
            Event::CorruptRecord => "CORRUPT_RECORD",
            Event::DeltaWritten => "DELTA_WRITTEN",
            Event::BatchFlushed => "BATCH_FLUSHED",
            Event::BatchFlushFailed => "BATCH_FLUSH_FAILED",
            Event::CommitRetry => "COMMIT_RETRY",
            Event::CommitToMemoryFailed => "COMMIT_TO_MEMORY_FAILED",
            Event::CommitRefused => "COMMIT_REFUSED",
            Event::UnparseableKey => "UNPARSEABLE_KEY",
        }
    }

    /// Returns true if this event indicates structural corruption
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::CorruptRecord)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
