//! Error types for posting list reconstruction and transaction commit
//!
//! Error codes:
//! - POSTING_STALE_TRANSACTION (ERROR severity)
//! - POSTING_STALE_COMMIT (ERROR severity)
//! - POSTING_RETRY (ERROR severity, transient, never surfaced by commit)
//! - POSTING_RETRIES_EXHAUSTED (ERROR severity)
//! - POSTING_STORAGE_IO (ERROR severity)
//! - POSTING_CORRUPT_FORMAT (FATAL severity)
//! - POSTING_TXN_ABORTED (ERROR severity)
//! - POSTING_INVALID_CONFIG (ERROR severity)
//! - POSTING_INVALID_KEY (ERROR severity)

use std::fmt;
use std::io;

use thiserror::Error;

/// Result type for posting list and transaction operations
pub type MvccResult<T> = Result<T, MvccError>;

/// Severity of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, the engine continues
    Error,
    /// On-disk structure is violated, the operation must not continue
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Errors raised by the MVCC core.
#[derive(Debug, Error)]
pub enum MvccError {
    /// The transaction reads below the oldest retained complete snapshot.
    #[error("transaction is too old: start_ts {start_ts} is below min_ts {min_ts}")]
    StaleTransaction { start_ts: u64, min_ts: u64 },

    /// A fold was asked to commit at or below the list's complete snapshot.
    #[error("commit_ts {commit_ts} of transaction {start_ts} is not above min_ts {min_ts}")]
    StaleCommit {
        start_ts: u64,
        commit_ts: u64,
        min_ts: u64,
    },

    /// The list was restructured concurrently; the attempt may be repeated.
    #[error("posting list is being restructured, retry")]
    Retry,

    /// A bounded retry policy gave up.
    #[error("gave up after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// Failure reported by the versioned record store.
    #[error("storage I/O failure: {message}")]
    StorageIo {
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    /// Unrecognized record layout or metadata combination.
    #[error("corrupt record for key {key}: {detail}")]
    CorruptFormat { key: String, detail: String },

    /// The transaction was flagged to abort and may not buffer or commit.
    #[error("transaction {start_ts} has been aborted")]
    Aborted { start_ts: u64 },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A key could not be built in the structured layout.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

impl MvccError {
    /// Create a storage failure without an underlying I/O error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageIo {
            message: message.into(),
            source: None,
        }
    }

    /// Create a storage failure caused by an I/O error
    pub fn storage_io(message: impl Into<String>, source: io::Error) -> Self {
        Self::StorageIo {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a corrupt-format error for the given raw key
    pub fn corrupt(key: &[u8], detail: impl Into<String>) -> Self {
        Self::CorruptFormat {
            key: render_key(key),
            detail: detail.into(),
        }
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::StaleTransaction { .. } => "POSTING_STALE_TRANSACTION",
            Self::StaleCommit { .. } => "POSTING_STALE_COMMIT",
            Self::Retry => "POSTING_RETRY",
            Self::RetriesExhausted { .. } => "POSTING_RETRIES_EXHAUSTED",
            Self::StorageIo { .. } => "POSTING_STORAGE_IO",
            Self::CorruptFormat { .. } => "POSTING_CORRUPT_FORMAT",
            Self::Aborted { .. } => "POSTING_TXN_ABORTED",
            Self::InvalidConfig(_) => "POSTING_INVALID_CONFIG",
            Self::InvalidKey(_) => "POSTING_INVALID_KEY",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::CorruptFormat { .. } => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// Returns true if this error signals on-disk corruption
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Returns true for the transient restructuring signal
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::Retry)
    }
}

impl From<io::Error> for MvccError {
    fn from(e: io::Error) -> Self {
        MvccError::storage_io("store operation failed", e)
    }
}

/// Renders a raw key for error messages and logs.
///
/// Printable ASCII is kept, everything else is hex-escaped.
pub(crate) fn render_key(key: &[u8]) -> String {
    let mut out = String::with_capacity(key.len());
    for &b in key {
        if b.is_ascii_graphic() {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{:02x}", b));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrupt_format_is_fatal() {
        let err = MvccError::corrupt(b"k1", "unexpected meta: 0");
        assert!(err.is_fatal());
        assert_eq!(err.severity(), Severity::Fatal);
        assert_eq!(err.code(), "POSTING_CORRUPT_FORMAT");
    }

    #[test]
    fn test_other_errors_are_not_fatal() {
        let errors = vec![
            MvccError::StaleTransaction { start_ts: 1, min_ts: 5 },
            MvccError::Retry,
            MvccError::RetriesExhausted { attempts: 3 },
            MvccError::storage("disk gone"),
            MvccError::Aborted { start_ts: 7 },
            MvccError::InvalidConfig("x".into()),
            MvccError::InvalidKey("x".into()),
            MvccError::StaleCommit {
                start_ts: 1,
                commit_ts: 2,
                min_ts: 5,
            },
        ];
        for err in errors {
            assert!(!err.is_fatal(), "{} should not be fatal", err.code());
        }
    }

    #[test]
    fn test_retry_detection() {
        assert!(MvccError::Retry.is_retry());
        assert!(!MvccError::storage("x").is_retry());
    }

    #[test]
    fn test_io_error_conversion_keeps_source() {
        use std::error::Error as _;

        let err: MvccError = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert_eq!(err.code(), "POSTING_STORAGE_IO");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_render_key_escapes_binary() {
        assert_eq!(render_key(b"k1"), "k1");
        assert_eq!(render_key(&[0x00, b'a', 0xff]), "\\x00a\\xff");
    }

    #[test]
    fn test_display_mentions_timestamps() {
        let err = MvccError::StaleTransaction { start_ts: 3, min_ts: 9 };
        let msg = err.to_string();
        assert!(msg.contains('3'));
        assert!(msg.contains('9'));
    }

    #[test]
    fn test_stale_commit_reports_commit_ts() {
        let err = MvccError::StaleCommit {
            start_ts: 100,
            commit_ts: 90,
            min_ts: 100,
        };
        assert_eq!(
            err.to_string(),
            "commit_ts 90 of transaction 100 is not above min_ts 100"
        );
        assert_eq!(err.code(), "POSTING_STALE_COMMIT");
    }
}
