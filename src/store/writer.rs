//! Batched writer for commit records
//!
//! Records of one commit are buffered and reach the store in atomic
//! batches. A failed flush drops its batch: the store is append-only, so a
//! partial commit leaves only records no acknowledged transaction refers to.

use std::sync::Arc;

use super::{VersionedStore, WriteEntry};
use crate::config::{MvccConfig, DEFAULT_WRITER_MAX_BATCH};
use crate::error::MvccResult;
use crate::observability::{log_event_at, Event, Severity};

pub struct TxnWriter {
    store: Arc<dyn VersionedStore>,
    pending: Vec<WriteEntry>,
    max_batch: usize,
    /// Records successfully handed to the store so far
    written: usize,
}

impl TxnWriter {
    pub fn new(store: Arc<dyn VersionedStore>) -> Self {
        Self::with_max_batch(store, DEFAULT_WRITER_MAX_BATCH)
    }

    /// Flushes on its own every `config.writer_max_batch` records.
    pub fn with_config(store: Arc<dyn VersionedStore>, config: &MvccConfig) -> Self {
        Self::with_max_batch(store, config.writer_max_batch)
    }

    /// A zero `max_batch` is treated as one.
    pub fn with_max_batch(store: Arc<dyn VersionedStore>, max_batch: usize) -> Self {
        Self {
            store,
            pending: Vec::new(),
            max_batch: max_batch.max(1),
            written: 0,
        }
    }

    /// Queue `value` for `key` at an explicit `version`.
    ///
    /// Flushes once the batch is full; the error of that flush is returned.
    pub fn set_at(
        &mut self,
        key: &[u8],
        value: Vec<u8>,
        user_meta: u8,
        version: u64,
    ) -> MvccResult<()> {
        self.pending.push(WriteEntry {
            key: key.to_vec(),
            value,
            user_meta,
            version,
        });
        if self.pending.len() >= self.max_batch {
            self.flush()?;
        }
        Ok(())
    }

    /// Send every queued record to the store in one batch.
    pub fn flush(&mut self) -> MvccResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.pending);
        let count = batch.len();
        if let Err(e) = self.store.write_batch(batch) {
            log_event_at(
                Severity::Error,
                Event::BatchFlushFailed,
                &[("records", &count.to_string()), ("error", &e.to_string())],
            );
            return Err(e);
        }
        self.written += count;
        log_event_at(
            Severity::Trace,
            Event::BatchFlushed,
            &[("records", &count.to_string())],
        );
        Ok(())
    }

    /// Records queued but not yet flushed
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn written(&self) -> usize {
        self.written
    }
}
