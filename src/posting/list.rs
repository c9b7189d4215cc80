//! In-memory posting list
//!
//! A `List` is a complete snapshot (`plist`, taken at `min_ts`) plus every
//! committed delta newer than it (`mutation_map`, keyed by commit
//! timestamp). Uncommitted writes wait in `pending`, keyed by the writing
//! transaction's start timestamp, until `commit_mutation` folds them in.
//!
//! Lock discipline:
//! - One mutex guards the snapshot, the delta chain and the pending buffer
//! - `estimated_size` and the restructuring flags are atomics, readable
//!   without the mutex
//! - The list never calls into a transaction while holding its mutex

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use super::types::{Posting, PostingList, PostingOp};
use crate::error::{MvccError, MvccResult};
use crate::key::Key;
use crate::txn::Txn;

#[derive(Debug, Default)]
struct ListState {
    plist: PostingList,
    min_ts: Option<u64>,
    max_ts: u64,
    mutation_map: BTreeMap<u64, PostingList>,
    pending: HashMap<u64, PostingList>,
}

impl ListState {
    fn calculate_size(&self, key: &Key) -> u64 {
        let committed: usize = self
            .mutation_map
            .values()
            .map(PostingList::estimated_size)
            .sum();
        let pending: usize = self.pending.values().map(PostingList::estimated_size).sum();
        (key.len() + self.plist.estimated_size() + committed + pending) as u64
    }
}

#[derive(Debug)]
pub struct List {
    key: Key,
    state: Mutex<ListState>,
    estimated_size: AtomicU64,
    /// Set by the cache when the list is evicted; a fresh copy must be fetched.
    removed: AtomicBool,
    /// Set while a rollup rewrites the list.
    restructuring: AtomicBool,
}

impl List {
    /// An empty list with no history. Takes ownership of `key`.
    pub fn new(key: Key) -> Self {
        Self::from_parts(key, PostingList::new(), None, BTreeMap::new())
    }

    pub(crate) fn from_parts(
        key: Key,
        plist: PostingList,
        min_ts: Option<u64>,
        mutation_map: BTreeMap<u64, PostingList>,
    ) -> Self {
        let max_ts = mutation_map
            .keys()
            .next_back()
            .copied()
            .or(min_ts)
            .unwrap_or(0);
        Self {
            key,
            state: Mutex::new(ListState {
                plist,
                min_ts,
                max_ts,
                mutation_map,
                pending: HashMap::new(),
            }),
            estimated_size: AtomicU64::new(0),
            removed: AtomicBool::new(false),
            restructuring: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Version of the complete snapshot the list was built on, if any.
    pub fn min_ts(&self) -> Option<u64> {
        self.state.lock().min_ts
    }

    /// Highest timestamp folded into the list.
    pub fn max_ts(&self) -> u64 {
        self.state.lock().max_ts
    }

    /// Commit timestamps of the delta chain, ascending.
    pub fn committed_versions(&self) -> Vec<u64> {
        self.state.lock().mutation_map.keys().copied().collect()
    }

    pub fn committed_delta(&self, commit_ts: u64) -> Option<PostingList> {
        self.state.lock().mutation_map.get(&commit_ts).cloned()
    }

    pub fn base_snapshot(&self) -> PostingList {
        self.state.lock().plist.clone()
    }

    /// Last published size estimate. Never takes the list's lock.
    #[inline]
    pub fn estimated_size(&self) -> u64 {
        self.estimated_size.load(Ordering::Acquire)
    }

    /// Recompute the size estimate under the lock and publish it.
    pub fn publish_size(&self) -> u64 {
        let state = self.state.lock();
        self.store_size(&state)
    }

    fn store_size(&self, state: &ListState) -> u64 {
        let size = state.calculate_size(&self.key);
        self.estimated_size.store(size, Ordering::Release);
        size
    }

    /// Buffer `posting` as part of `txn`'s pending delta.
    ///
    /// A later posting for the same uid within one transaction replaces the
    /// earlier one. The key and a value-specific conflict key are recorded
    /// on the transaction once the list's lock is released. A list already
    /// marked for removal answers `Retry`; fetch a fresh one.
    pub fn add_mutation(&self, txn: &Txn, mut posting: Posting) -> MvccResult<()> {
        let start_ts = txn.start_ts();
        if txn.should_abort() {
            return Err(MvccError::Aborted { start_ts });
        }
        let uid = posting.uid;

        let mut state = self.state.lock();
        if self.is_marked_for_removal() {
            return Err(MvccError::Retry);
        }
        if let Some(min_ts) = state.min_ts {
            if start_ts < min_ts {
                return Err(MvccError::StaleTransaction { start_ts, min_ts });
            }
        }
        posting.start_ts = start_ts;
        posting.commit_ts = 0;
        state.pending.entry(start_ts).or_default().upsert(posting);
        self.store_size(&state);
        drop(state);

        let mut conflict_key = self.key.to_vec();
        conflict_key.extend_from_slice(&uid.to_be_bytes());
        txn.add_keys(self.key.as_bytes(), &conflict_key);
        Ok(())
    }

    /// The uncommitted delta written at `start_ts`, if any.
    pub fn get_mutation(&self, start_ts: u64) -> Option<PostingList> {
        self.state.lock().pending.get(&start_ts).cloned()
    }

    /// Move the delta buffered at `start_ts` into the chain at `commit_ts`.
    ///
    /// - No buffered delta: nothing to do (already committed, or replay)
    /// - `commit_ts == 0`: the transaction aborted, the delta is dropped
    /// - List evicted or being restructured: `Retry`
    /// - `commit_ts` not above the snapshot: `StaleCommit`
    pub fn commit_mutation(&self, start_ts: u64, commit_ts: u64) -> MvccResult<()> {
        let mut state = self.state.lock();
        if self.is_marked_for_removal() || self.is_restructuring() {
            return Err(MvccError::Retry);
        }

        let Some(mut delta) = state.pending.remove(&start_ts) else {
            return Ok(());
        };

        if commit_ts == 0 {
            self.store_size(&state);
            return Ok(());
        }

        if let Some(min_ts) = state.min_ts {
            if commit_ts <= min_ts {
                state.pending.insert(start_ts, delta);
                return Err(MvccError::StaleCommit {
                    start_ts,
                    commit_ts,
                    min_ts,
                });
            }
        }

        delta.stamp_commit_ts(commit_ts);
        match state.mutation_map.get_mut(&commit_ts) {
            Some(existing) => {
                for posting in delta.postings {
                    existing.upsert(posting);
                }
            }
            None => {
                state.mutation_map.insert(commit_ts, delta);
            }
        }
        if commit_ts > state.max_ts {
            state.max_ts = commit_ts;
        }
        self.store_size(&state);
        Ok(())
    }

    /// Postings visible at `read_ts`, sorted by uid.
    ///
    /// The snapshot is overlaid with every committed delta at or below
    /// `read_ts` in commit order, then with the reader's own pending delta
    /// (a transaction reads at its start timestamp).
    pub fn postings_at(&self, read_ts: u64) -> MvccResult<Vec<Posting>> {
        let state = self.state.lock();
        if let Some(min_ts) = state.min_ts {
            if read_ts < min_ts {
                return Err(MvccError::StaleTransaction {
                    start_ts: read_ts,
                    min_ts,
                });
            }
        }

        let mut visible: BTreeMap<u64, Posting> = state
            .plist
            .postings
            .iter()
            .filter(|p| !p.is_delete())
            .map(|p| (p.uid, p.clone()))
            .collect();

        let deltas = state.mutation_map.range(..=read_ts).map(|(_, pl)| pl);
        for delta in deltas.chain(state.pending.get(&read_ts)) {
            for posting in &delta.postings {
                match posting.op {
                    PostingOp::Set => {
                        visible.insert(posting.uid, posting.clone());
                    }
                    PostingOp::Del => {
                        visible.remove(&posting.uid);
                    }
                }
            }
        }

        Ok(visible.into_values().collect())
    }

    /// Number of transactions with an uncommitted delta on this list.
    pub fn pending_txns(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Flag the list as replaced; writes and folds report `Retry` from now on.
    pub fn mark_for_removal(&self) {
        self.removed.store(true, Ordering::Release);
    }

    /// Mark the list for removal unless a transaction still has an
    /// uncommitted delta on it. Returns whether the list was marked.
    ///
    /// The check and the mark happen under the list's lock, so no write can
    /// be buffered in between.
    pub fn try_mark_for_removal(&self) -> bool {
        let state = self.state.lock();
        if !state.pending.is_empty() {
            return false;
        }
        self.removed.store(true, Ordering::Release);
        true
    }

    pub fn is_marked_for_removal(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Called by a rollup before it rewrites the list.
    pub fn begin_restructure(&self) {
        self.restructuring.store(true, Ordering::Release);
    }

    pub fn end_restructure(&self) {
        self.restructuring.store(false, Ordering::Release);
    }

    pub fn is_restructuring(&self) -> bool {
        self.restructuring.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posting::ListSource;
    use std::sync::Arc;

    struct NoLists;

    impl ListSource for NoLists {
        fn get(&self, key: &[u8]) -> MvccResult<Arc<List>> {
            Err(MvccError::storage(format!("unexpected lookup of {:?}", key)))
        }
    }

    fn txn(start_ts: u64) -> Txn {
        Txn::new(start_ts, Arc::new(NoLists))
    }

    fn snapshot_list(min_ts: u64, uids: &[u64]) -> List {
        let mut plist = PostingList::new();
        for &uid in uids {
            plist.upsert(Posting::set(uid, Vec::new()));
        }
        List::from_parts(Key::new(b"k".to_vec()), plist, Some(min_ts), BTreeMap::new())
    }

    fn uids(postings: &[Posting]) -> Vec<u64> {
        postings.iter().map(|p| p.uid).collect()
    }

    #[test]
    fn test_new_list_is_empty() {
        let list = List::new(Key::new(b"k".to_vec()));
        assert_eq!(list.min_ts(), None);
        assert!(list.committed_versions().is_empty());
        assert!(list.postings_at(100).unwrap().is_empty());
    }

    #[test]
    fn test_add_mutation_buffers_at_start_ts() {
        let list = List::new(Key::new(b"k".to_vec()));
        let t = txn(5);
        list.add_mutation(&t, Posting::set(1, b"a".to_vec())).unwrap();

        let pending = list.get_mutation(5).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.postings[0].start_ts, 5);
        assert!(list.get_mutation(6).is_none());
        assert_eq!(t.delta_count(), 1);
        assert_eq!(t.conflict_count(), 1);
    }

    #[test]
    fn test_add_mutation_refused_after_abort() {
        let list = List::new(Key::new(b"k".to_vec()));
        let t = txn(5);
        t.set_abort();

        let err = list.add_mutation(&t, Posting::set(1, Vec::new())).unwrap_err();
        assert!(matches!(err, MvccError::Aborted { start_ts: 5 }));
        assert!(list.get_mutation(5).is_none());
        assert_eq!(t.delta_count(), 0);
    }

    #[test]
    fn test_add_mutation_below_snapshot_is_stale() {
        let list = snapshot_list(100, &[1]);
        let err = list.add_mutation(&txn(50), Posting::set(2, Vec::new())).unwrap_err();
        assert!(matches!(
            err,
            MvccError::StaleTransaction {
                start_ts: 50,
                min_ts: 100
            }
        ));
    }

    #[test]
    fn test_commit_mutation_moves_delta() {
        let list = List::new(Key::new(b"k".to_vec()));
        let t = txn(5);
        list.add_mutation(&t, Posting::set(1, Vec::new())).unwrap();

        list.commit_mutation(5, 10).unwrap();

        assert!(list.get_mutation(5).is_none());
        assert_eq!(list.committed_versions(), vec![10]);
        let delta = list.committed_delta(10).unwrap();
        assert_eq!(delta.commit_ts, 10);
        assert_eq!(delta.postings[0].commit_ts, 10);
        assert_eq!(list.max_ts(), 10);
    }

    #[test]
    fn test_commit_mutation_without_pending_is_noop() {
        let list = List::new(Key::new(b"k".to_vec()));
        list.commit_mutation(5, 10).unwrap();
        assert!(list.committed_versions().is_empty());
    }

    #[test]
    fn test_commit_ts_zero_discards() {
        let list = List::new(Key::new(b"k".to_vec()));
        list.add_mutation(&txn(5), Posting::set(1, Vec::new())).unwrap();

        list.commit_mutation(5, 0).unwrap();

        assert!(list.get_mutation(5).is_none());
        assert!(list.committed_versions().is_empty());
        assert_eq!(list.pending_txns(), 0);
    }

    #[test]
    fn test_commit_mutation_retries_while_restructuring() {
        let list = List::new(Key::new(b"k".to_vec()));
        list.add_mutation(&txn(5), Posting::set(1, Vec::new())).unwrap();

        list.begin_restructure();
        assert!(list.commit_mutation(5, 10).unwrap_err().is_retry());
        // The buffered delta survives the refused attempt.
        assert!(list.get_mutation(5).is_some());

        list.end_restructure();
        list.commit_mutation(5, 10).unwrap();
        assert_eq!(list.committed_versions(), vec![10]);
    }

    #[test]
    fn test_commit_mutation_retries_after_removal() {
        let list = List::new(Key::new(b"k".to_vec()));
        list.mark_for_removal();
        assert!(list.commit_mutation(5, 10).unwrap_err().is_retry());
    }

    #[test]
    fn test_commit_below_snapshot_is_stale_and_keeps_delta() {
        let list = snapshot_list(100, &[]);
        list.add_mutation(&txn(100), Posting::set(1, Vec::new())).unwrap();

        let err = list.commit_mutation(100, 90).unwrap_err();
        assert!(matches!(
            err,
            MvccError::StaleCommit {
                start_ts: 100,
                commit_ts: 90,
                min_ts: 100
            }
        ));
        assert!(list.get_mutation(100).is_some());
    }

    #[test]
    fn test_removal_refused_while_writes_pending() {
        let list = List::new(Key::new(b"k".to_vec()));
        list.add_mutation(&txn(5), Posting::set(1, Vec::new())).unwrap();

        assert!(!list.try_mark_for_removal());
        assert!(!list.is_marked_for_removal());

        list.commit_mutation(5, 6).unwrap();
        assert!(list.try_mark_for_removal());
        assert!(list.is_marked_for_removal());
    }

    #[test]
    fn test_add_mutation_on_removed_list_retries() {
        let list = List::new(Key::new(b"k".to_vec()));
        assert!(list.try_mark_for_removal());

        let t = txn(5);
        let err = list.add_mutation(&t, Posting::set(1, Vec::new())).unwrap_err();
        assert!(err.is_retry());
        assert!(list.get_mutation(5).is_none());
        assert_eq!(t.delta_count(), 0);
    }

    #[test]
    fn test_postings_at_respects_commit_order_and_read_ts() {
        let list = snapshot_list(10, &[1, 2]);
        let t1 = txn(11);
        list.add_mutation(&t1, Posting::set(3, Vec::new())).unwrap();
        list.add_mutation(&t1, Posting::delete(1)).unwrap();
        list.commit_mutation(11, 12).unwrap();

        let t2 = txn(13);
        list.add_mutation(&t2, Posting::set(1, Vec::new())).unwrap();
        list.commit_mutation(13, 15).unwrap();

        assert_eq!(uids(&list.postings_at(10).unwrap()), vec![1, 2]);
        assert_eq!(uids(&list.postings_at(12).unwrap()), vec![2, 3]);
        assert_eq!(uids(&list.postings_at(20).unwrap()), vec![1, 2, 3]);
    }

    #[test]
    fn test_postings_at_sees_own_pending_writes_only() {
        let list = List::new(Key::new(b"k".to_vec()));
        list.add_mutation(&txn(5), Posting::set(1, Vec::new())).unwrap();
        list.add_mutation(&txn(6), Posting::set(2, Vec::new())).unwrap();

        assert_eq!(uids(&list.postings_at(5).unwrap()), vec![1]);
        assert_eq!(uids(&list.postings_at(6).unwrap()), vec![2]);
        assert!(list.postings_at(7).unwrap().is_empty());
    }

    #[test]
    fn test_postings_at_below_snapshot_is_stale() {
        let list = snapshot_list(100, &[1]);
        assert!(matches!(
            list.postings_at(99),
            Err(MvccError::StaleTransaction { .. })
        ));
    }

    #[test]
    fn test_estimated_size_tracks_mutations() {
        let list = List::new(Key::new(b"k".to_vec()));
        let before = list.publish_size();

        list.add_mutation(&txn(5), Posting::set(1, vec![0u8; 64])).unwrap();
        let buffered = list.estimated_size();
        assert!(buffered >= before + 64);

        list.commit_mutation(5, 0).unwrap();
        assert_eq!(list.estimated_size(), before);
    }

    #[test]
    fn test_lists_can_be_mutated_in_parallel() {
        use std::thread;

        let lists: Vec<Arc<List>> = (0..4u8)
            .map(|i| Arc::new(List::new(Key::new(vec![i]))))
            .collect();
        let t = Arc::new(txn(5));

        let handles: Vec<_> = lists
            .iter()
            .cloned()
            .map(|list| {
                let t = Arc::clone(&t);
                thread::spawn(move || {
                    for uid in 0..50 {
                        list.add_mutation(&t, Posting::set(uid, Vec::new())).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(t.delta_count(), 4);
        assert_eq!(t.conflict_count(), 200);
        for list in &lists {
            assert_eq!(list.get_mutation(5).unwrap().len(), 50);
        }
    }
}
