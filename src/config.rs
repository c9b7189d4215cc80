//! Configuration for the commit protocol
//!
//! Configured externally (file, env), immutable once handed to a transaction.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MvccError, MvccResult};
use crate::txn::RetryPolicy;

/// Default pause between fold attempts on a restructuring list.
pub const DEFAULT_COMMIT_RETRY_DELAY_MS: u64 = 5;

/// Default number of records a `TxnWriter` buffers before flushing.
pub const DEFAULT_WRITER_MAX_BATCH: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MvccConfig {
    /// Pause between `commit_to_memory` attempts on one key.
    ///
    /// Must be non-zero: the retry loop never spins.
    pub commit_retry_delay_ms: u64,

    /// Upper bound on attempts per key. `None` retries until the fold succeeds.
    pub max_commit_attempts: Option<u32>,

    /// Records buffered by a writer before it flushes on its own.
    pub writer_max_batch: usize,
}

impl Default for MvccConfig {
    fn default() -> Self {
        Self {
            commit_retry_delay_ms: DEFAULT_COMMIT_RETRY_DELAY_MS,
            max_commit_attempts: None,
            writer_max_batch: DEFAULT_WRITER_MAX_BATCH,
        }
    }
}

impl MvccConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(input: &str) -> MvccResult<Self> {
        let config: Self = serde_json::from_str(input)
            .map_err(|e| MvccError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MvccResult<()> {
        if self.commit_retry_delay_ms == 0 {
            return Err(MvccError::InvalidConfig(
                "commit_retry_delay_ms must be greater than zero".into(),
            ));
        }
        if self.max_commit_attempts == Some(0) {
            return Err(MvccError::InvalidConfig(
                "max_commit_attempts must allow at least one attempt".into(),
            ));
        }
        if self.writer_max_batch == 0 {
            return Err(MvccError::InvalidConfig(
                "writer_max_batch must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn commit_retry_delay(&self) -> Duration {
        Duration::from_millis(self.commit_retry_delay_ms)
    }

    /// Retry policy used by `commit_to_memory`
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.commit_retry_delay(), self.max_commit_attempts)
    }
}
