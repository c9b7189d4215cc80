//! Write-side transaction bookkeeping and the two-phase commit protocol
//!
//! A transaction records which posting lists it wrote (delta keys) and
//! which values it touched (conflict keys). Committing happens in two
//! phases:
//! 1. `commit_to_disk` writes each pending delta as a record at `commit_ts`
//! 2. `commit_to_memory` folds each pending delta into its list's chain
//!
//! The record layout written in phase 1 is what `read_posting_list` folds
//! back, so a list replaced between the phases is rebuilt already containing
//! the commit.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::context::{conflict_fingerprint, TxnContext};
use super::retry::RetryPolicy;
use crate::config::MvccConfig;
use crate::error::{render_key, MvccError, MvccResult};
use crate::key::ParsedKey;
use crate::observability::{log_event_at, metrics, Event, Severity};
use crate::posting::{codec, List, ListSource, Posting};
use crate::store::{TxnWriter, BIT_DELTA_POSTING};

#[derive(Debug, Default)]
struct TxnKeys {
    /// Keys of posting lists holding a pending delta of this transaction
    deltas: HashSet<Vec<u8>>,
    /// Value-specific keys reported to the coordinator
    conflicts: HashSet<Vec<u8>>,
}

pub struct Txn {
    start_ts: u64,
    source: Arc<dyn ListSource>,
    retry: RetryPolicy,
    keys: Mutex<TxnKeys>,
    /// Held for the whole of `commit_to_memory`. Never taken by a list.
    commit_lock: Mutex<()>,
    should_abort: AtomicBool,
}

impl Txn {
    pub fn new(start_ts: u64, source: Arc<dyn ListSource>) -> Self {
        Self::with_config(start_ts, source, &MvccConfig::default())
    }

    pub fn with_config(start_ts: u64, source: Arc<dyn ListSource>, config: &MvccConfig) -> Self {
        Self {
            start_ts,
            source,
            retry: config.retry_policy(),
            keys: Mutex::new(TxnKeys::default()),
            commit_lock: Mutex::new(()),
            should_abort: AtomicBool::new(false),
        }
    }

    pub fn start_ts(&self) -> u64 {
        self.start_ts
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Refuse any further writes and commits.
    pub fn set_abort(&self) {
        self.should_abort.store(true, Ordering::Release);
    }

    pub fn should_abort(&self) -> bool {
        self.should_abort.load(Ordering::Acquire)
    }

    /// Record that this transaction wrote `key`, touching `conflict_key`.
    ///
    /// Idempotent. An empty `conflict_key` records only the delta key.
    pub fn add_keys(&self, key: &[u8], conflict_key: &[u8]) {
        let mut keys = self.keys.lock();
        if !keys.deltas.contains(key) {
            keys.deltas.insert(key.to_vec());
        }
        if !conflict_key.is_empty() && !keys.conflicts.contains(conflict_key) {
            keys.conflicts.insert(conflict_key.to_vec());
        }
    }

    pub fn delta_count(&self) -> usize {
        self.keys.lock().deltas.len()
    }

    pub fn conflict_count(&self) -> usize {
        self.keys.lock().conflicts.len()
    }

    pub fn has_delta(&self, key: &[u8]) -> bool {
        self.keys.lock().deltas.contains(key)
    }

    /// The list for `key`, as resolved by this transaction's source.
    pub fn get(&self, key: &[u8]) -> MvccResult<Arc<List>> {
        self.source.get(key)
    }

    /// Resolve the list for `key` and buffer `posting` on it.
    ///
    /// A list removed from the source after it was resolved is fetched
    /// again under the retry policy.
    pub fn add_mutation(&self, key: &[u8], posting: Posting) -> MvccResult<()> {
        self.retry.run(|_| {
            let list = self.get(key)?;
            list.add_mutation(self, posting.clone())
        })
    }

    /// Populate `ctx` for the coordinator.
    ///
    /// Conflict keys are added as base-36 fingerprints and delta keys as
    /// the predicate they belong to, skipping values already present. A
    /// delta key that does not parse is logged and skipped.
    pub fn fill(&self, ctx: &mut TxnContext) {
        let keys = self.keys.lock();
        ctx.start_ts = self.start_ts;

        for conflict in &keys.conflicts {
            ctx.push_key(conflict_fingerprint(conflict));
        }

        for key in &keys.deltas {
            match ParsedKey::parse(key) {
                Ok(parsed) => ctx.push_pred(&parsed.attr),
                Err(e) => log_event_at(
                    Severity::Warn,
                    Event::UnparseableKey,
                    &[
                        ("key", &render_key(key)),
                        ("start_ts", &self.start_ts.to_string()),
                        ("error", &e.to_string()),
                    ],
                ),
            }
        }
    }

    /// Phase 1: queue every pending delta on `writer` at `commit_ts`.
    ///
    /// `commit_ts == 0` is a no-op. The key set is copied under the lock and
    /// the lock released before any list or store is touched. The caller
    /// flushes the writer.
    pub fn commit_to_disk(&self, writer: &mut TxnWriter, commit_ts: u64) -> MvccResult<()> {
        if commit_ts == 0 {
            return Ok(());
        }

        for key in self.delta_keys() {
            let list = self.source.get(&key)?;
            let Some(delta) = list.get_mutation(self.start_ts) else {
                continue;
            };
            let data = codec::encode(&delta);
            let bytes = data.len();
            writer.set_at(&key, data, BIT_DELTA_POSTING, commit_ts)?;

            metrics().increment_deltas_written();
            log_event_at(
                Severity::Trace,
                Event::DeltaWritten,
                &[
                    ("key", &render_key(&key)),
                    ("commit_ts", &commit_ts.to_string()),
                    ("bytes", &bytes.to_string()),
                ],
            );
        }
        Ok(())
    }

    /// Phase 2: fold every pending delta into its list at `commit_ts`.
    ///
    /// `commit_ts == 0` drops the deltas instead. A list that answers
    /// `Retry` is fetched again from the source after the policy's delay;
    /// any other error ends the call.
    pub fn commit_to_memory(&self, commit_ts: u64) -> MvccResult<()> {
        let _guard = self.commit_lock.lock();

        for key in self.delta_keys() {
            let result = self.retry.run(|attempt| {
                let list = self.source.get(&key)?;
                let outcome = list.commit_mutation(self.start_ts, commit_ts);
                if matches!(outcome, Err(MvccError::Retry)) {
                    metrics().increment_commit_retries();
                    log_event_at(
                        Severity::Trace,
                        Event::CommitRetry,
                        &[
                            ("key", &render_key(&key)),
                            ("start_ts", &self.start_ts.to_string()),
                            ("attempt", &attempt.to_string()),
                        ],
                    );
                }
                outcome
            });

            if let Err(e) = result {
                let severity = if e.is_fatal() {
                    Severity::Error
                } else {
                    Severity::Warn
                };
                log_event_at(
                    severity,
                    Event::CommitToMemoryFailed,
                    &[
                        ("key", &render_key(&key)),
                        ("start_ts", &self.start_ts.to_string()),
                        ("commit_ts", &commit_ts.to_string()),
                        ("error", &e.to_string()),
                    ],
                );
                return Err(e);
            }
        }
        Ok(())
    }

    /// Run both phases, flushing the writer in between.
    ///
    /// Refused with `Aborted` once the abort flag is set. Nothing is folded
    /// into memory unless every record reached the store.
    pub fn commit(&self, writer: &mut TxnWriter, commit_ts: u64) -> MvccResult<()> {
        if self.should_abort() {
            log_event_at(
                Severity::Warn,
                Event::CommitRefused,
                &[("start_ts", &self.start_ts.to_string())],
            );
            return Err(MvccError::Aborted {
                start_ts: self.start_ts,
            });
        }
        self.commit_to_disk(writer, commit_ts)?;
        writer.flush()?;
        self.commit_to_memory(commit_ts)
    }

    /// Drop every pending delta of this transaction.
    pub fn discard(&self) -> MvccResult<()> {
        self.commit_to_memory(0)
    }

    fn delta_keys(&self) -> Vec<Vec<u8>> {
        let mut keys: Vec<Vec<u8>> = self.keys.lock().deltas.iter().cloned().collect();
        keys.sort();
        keys
    }
}

impl std::fmt::Debug for Txn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Txn")
            .field("start_ts", &self.start_ts)
            .field("should_abort", &self.should_abort())
            .finish_non_exhaustive()
    }
}

/// Whether an optional transaction has been told to abort. `None` never is.
pub fn should_abort(txn: Option<&Txn>) -> bool {
    txn.map_or(false, Txn::should_abort)
}
