//! Counters for list reconstruction and commit
//!
//! - Counters only, monotonic
//! - Relaxed atomics, no locks

use std::sync::atomic::{AtomicU64, Ordering};

/// Registry of operational counters.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Estimated bytes of posting lists reconstructed from the store
    bytes_read: AtomicU64,
    /// Posting lists reconstructed from the store
    lists_read: AtomicU64,
    /// Delta records handed to a writer
    deltas_written: AtomicU64,
    /// Fold attempts that hit a restructuring list
    commit_retries: AtomicU64,
    /// Records with an unrecognized layout
    corrupt_records: AtomicU64,
}

static GLOBAL: MetricsRegistry = MetricsRegistry::new();

/// The process-wide registry.
pub fn metrics() -> &'static MetricsRegistry {
    &GLOBAL
}

impl MetricsRegistry {
    pub const fn new() -> Self {
        Self {
            bytes_read: AtomicU64::new(0),
            lists_read: AtomicU64::new(0),
            deltas_written: AtomicU64::new(0),
            commit_retries: AtomicU64::new(0),
            corrupt_records: AtomicU64::new(0),
        }
    }

    /// Record one reconstructed list of the given estimated size
    pub fn record_list_read(&self, bytes: u64) {
        self.lists_read.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn increment_deltas_written(&self) {
        self.deltas_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_commit_retries(&self) {
        self.commit_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_corrupt_records(&self) {
        self.corrupt_records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    pub fn commit_retries(&self) -> u64 {
        self.commit_retries.load(Ordering::Relaxed)
    }

    /// Take a point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            lists_read: self.lists_read.load(Ordering::Relaxed),
            deltas_written: self.deltas_written.load(Ordering::Relaxed),
            commit_retries: self.commit_retries.load(Ordering::Relaxed),
            corrupt_records: self.corrupt_records.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub bytes_read: u64,
    pub lists_read: u64,
    pub deltas_written: u64,
    pub commit_retries: u64,
    pub corrupt_records: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_is_zeroed() {
        let registry = MetricsRegistry::new();
        assert_eq!(registry.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_list_read_counts_bytes_and_lists() {
        let registry = MetricsRegistry::new();
        registry.record_list_read(100);
        registry.record_list_read(28);

        let snap = registry.snapshot();
        assert_eq!(snap.lists_read, 2);
        assert_eq!(snap.bytes_read, 128);
    }

    #[test]
    fn test_counters_are_independent() {
        let registry = MetricsRegistry::new();
        registry.increment_commit_retries();
        registry.increment_commit_retries();
        registry.increment_deltas_written();

        let snap = registry.snapshot();
        assert_eq!(snap.commit_retries, 2);
        assert_eq!(snap.deltas_written, 1);
        assert_eq!(snap.corrupt_records, 0);
    }

    #[test]
    fn test_concurrent_increments() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let r = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..250 {
                        r.increment_corrupt_records();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.snapshot().corrupt_records, 1000);
    }
}
