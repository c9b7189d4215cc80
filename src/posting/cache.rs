//! Resolution of keys to shared posting lists

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::list::List;
use super::reader::get_new;
use crate::error::MvccResult;
use crate::key::Key;
use crate::store::VersionedStore;

/// Where a transaction obtains the list for a key.
pub trait ListSource: Send + Sync {
    fn get(&self, key: &[u8]) -> MvccResult<Arc<List>>;
}

/// A non-evicting map of reconstructed lists.
///
/// Misses are reconstructed from the store without holding the map's lock.
/// A cached list that has been marked for removal is replaced on the next
/// lookup.
pub struct LocalCache {
    store: Arc<dyn VersionedStore>,
    lists: Mutex<HashMap<Vec<u8>, Arc<List>>>,
}

impl LocalCache {
    pub fn new(store: Arc<dyn VersionedStore>) -> Self {
        Self {
            store,
            lists: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.lists.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.lock().is_empty()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.lists.lock().contains_key(key)
    }

    /// Drop the cached list; holders of the old `Arc` see it as removed.
    ///
    /// Refused, leaving the entry cached, while any transaction still has an
    /// uncommitted delta on the list.
    pub fn evict(&self, key: &[u8]) -> Option<Arc<List>> {
        let mut lists = self.lists.lock();
        if !lists.get(key)?.try_mark_for_removal() {
            return None;
        }
        lists.remove(key)
    }

    /// Sum of published size estimates of every cached list.
    pub fn estimated_size(&self) -> u64 {
        self.lists
            .lock()
            .values()
            .map(|list| list.estimated_size())
            .sum()
    }
}

impl ListSource for LocalCache {
    fn get(&self, key: &[u8]) -> MvccResult<Arc<List>> {
        if let Some(list) = self.lists.lock().get(key) {
            if !list.is_marked_for_removal() {
                return Ok(Arc::clone(list));
            }
        }

        let fresh = Arc::new(get_new(Key::new(key.to_vec()), self.store.as_ref())?);

        let mut lists = self.lists.lock();
        match lists.entry(key.to_vec()) {
            Entry::Occupied(entry) if !entry.get().is_marked_for_removal() => {
                Ok(Arc::clone(entry.get()))
            }
            Entry::Occupied(mut entry) => {
                entry.insert(Arc::clone(&fresh));
                Ok(fresh)
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&fresh));
                Ok(fresh)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posting::{codec, Posting, PostingList};
    use crate::store::{MemoryStore, VersionedRecord};

    fn store_with_delta() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let mut pl = PostingList::new();
        pl.upsert(Posting::set(1, Vec::new()));
        store.insert(VersionedRecord::delta("k", 3, codec::encode(&pl)));
        store
    }

    #[test]
    fn test_get_reconstructs_and_caches() {
        let cache = LocalCache::new(store_with_delta());
        let a = cache.get(b"k").unwrap();
        let b = cache.get(b"k").unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.committed_versions(), vec![3]);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(b"k"));
    }

    #[test]
    fn test_evicted_list_is_replaced() {
        let cache = LocalCache::new(store_with_delta());
        let old = cache.get(b"k").unwrap();

        let evicted = cache.evict(b"k").unwrap();
        assert!(evicted.is_marked_for_removal());
        assert!(cache.is_empty());

        let fresh = cache.get(b"k").unwrap();
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert!(!fresh.is_marked_for_removal());
    }

    #[test]
    fn test_evict_refused_with_uncommitted_writes() {
        let cache = Arc::new(LocalCache::new(store_with_delta()));
        let txn = crate::txn::Txn::new(5, cache.clone());
        txn.add_mutation(b"k", Posting::set(2, Vec::new())).unwrap();

        assert!(cache.evict(b"k").is_none());
        assert!(cache.contains(b"k"));
        let list = cache.get(b"k").unwrap();
        assert!(!list.is_marked_for_removal());
        assert!(list.get_mutation(5).is_some());

        txn.discard().unwrap();
        assert!(cache.evict(b"k").is_some());
    }

    #[test]
    fn test_evict_missing_key() {
        let cache = LocalCache::new(store_with_delta());
        assert!(cache.evict(b"nope").is_none());
    }

    #[test]
    fn test_removed_list_in_map_is_replaced() {
        let cache = LocalCache::new(store_with_delta());
        let old = cache.get(b"k").unwrap();
        old.mark_for_removal();

        let fresh = cache.get(b"k").unwrap();
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_estimated_size_sums_lists() {
        let cache = LocalCache::new(store_with_delta());
        let list = cache.get(b"k").unwrap();
        cache.get(b"missing").unwrap();
        assert!(cache.estimated_size() >= list.estimated_size());
    }
}
