//! Posting list content
//!
//! `start_ts` and `commit_ts` exist only in memory. The codec never writes
//! them; a delta read back from the store is stamped with its record version.

/// Whether a posting adds or removes its uid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostingOp {
    Set,
    Del,
}

impl PostingOp {
    pub(crate) fn as_byte(self) -> u8 {
        match self {
            PostingOp::Set => 1,
            PostingOp::Del => 2,
        }
    }

    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(PostingOp::Set),
            2 => Some(PostingOp::Del),
            _ => None,
        }
    }
}

/// One edge or value of a posting list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub uid: u64,
    pub value: Vec<u8>,
    pub op: PostingOp,
    pub start_ts: u64,
    pub commit_ts: u64,
}

/// Fixed per-posting overhead counted by size estimates.
const POSTING_OVERHEAD: usize = 8 + 1 + 8 + 8;

impl Posting {
    pub fn set(uid: u64, value: impl Into<Vec<u8>>) -> Self {
        Self {
            uid,
            value: value.into(),
            op: PostingOp::Set,
            start_ts: 0,
            commit_ts: 0,
        }
    }

    pub fn delete(uid: u64) -> Self {
        Self {
            uid,
            value: Vec::new(),
            op: PostingOp::Del,
            start_ts: 0,
            commit_ts: 0,
        }
    }

    #[inline]
    pub fn is_delete(&self) -> bool {
        self.op == PostingOp::Del
    }

    pub fn estimated_size(&self) -> usize {
        POSTING_OVERHEAD + self.value.len()
    }
}

/// An ordered collection of postings: a complete snapshot or a delta.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingList {
    /// Sorted by uid, at most one posting per uid
    pub postings: Vec<Posting>,
    pub commit_ts: u64,
}

impl PostingList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Insert `posting`, replacing any posting with the same uid.
    pub fn upsert(&mut self, posting: Posting) {
        match self.postings.binary_search_by_key(&posting.uid, |p| p.uid) {
            Ok(idx) => self.postings[idx] = posting,
            Err(idx) => self.postings.insert(idx, posting),
        }
    }

    pub fn get(&self, uid: u64) -> Option<&Posting> {
        self.postings
            .binary_search_by_key(&uid, |p| p.uid)
            .ok()
            .map(|idx| &self.postings[idx])
    }

    /// Stamp the list and every posting with the commit timestamp.
    pub fn stamp_commit_ts(&mut self, commit_ts: u64) {
        self.commit_ts = commit_ts;
        for posting in &mut self.postings {
            posting.commit_ts = commit_ts;
        }
    }

    pub fn estimated_size(&self) -> usize {
        8 + self
            .postings
            .iter()
            .map(Posting::estimated_size)
            .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_keeps_uid_order() {
        let mut pl = PostingList::new();
        pl.upsert(Posting::set(5, b"e".to_vec()));
        pl.upsert(Posting::set(1, b"a".to_vec()));
        pl.upsert(Posting::set(3, b"c".to_vec()));

        let uids: Vec<u64> = pl.postings.iter().map(|p| p.uid).collect();
        assert_eq!(uids, vec![1, 3, 5]);
    }

    #[test]
    fn test_upsert_replaces_same_uid() {
        let mut pl = PostingList::new();
        pl.upsert(Posting::set(7, b"old".to_vec()));
        pl.upsert(Posting::delete(7));

        assert_eq!(pl.len(), 1);
        assert!(pl.get(7).unwrap().is_delete());
    }

    #[test]
    fn test_stamp_commit_ts() {
        let mut pl = PostingList::new();
        pl.upsert(Posting::set(1, Vec::new()));
        pl.upsert(Posting::set(2, Vec::new()));
        pl.stamp_commit_ts(42);

        assert_eq!(pl.commit_ts, 42);
        assert!(pl.postings.iter().all(|p| p.commit_ts == 42));
    }

    #[test]
    fn test_estimated_size_grows_with_values() {
        let mut pl = PostingList::new();
        let empty = pl.estimated_size();
        pl.upsert(Posting::set(1, vec![0u8; 100]));
        assert!(pl.estimated_size() >= empty + 100);
    }

    #[test]
    fn test_op_byte_mapping() {
        assert_eq!(PostingOp::from_byte(PostingOp::Set.as_byte()), Some(PostingOp::Set));
        assert_eq!(PostingOp::from_byte(PostingOp::Del.as_byte()), Some(PostingOp::Del));
        assert_eq!(PostingOp::from_byte(0), None);
    }
}
