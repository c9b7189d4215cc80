//! postingdb - MVCC posting lists over a versioned key-value store
//!
//! A posting list is a complete snapshot plus a chain of committed deltas,
//! rebuilt from the store by walking versions newest to oldest. Writers
//! buffer deltas per transaction and commit them in two phases: records to
//! disk, then folds into memory.

pub mod config;
pub mod error;
pub mod key;
pub mod observability;
pub mod posting;
pub mod store;
pub mod txn;

pub use config::MvccConfig;
pub use error::{MvccError, MvccResult};
pub use key::{Key, ParsedKey};
pub use posting::{get_new, read_posting_list, List, ListSource, LocalCache, Posting, PostingList};
pub use store::{MemoryStore, TxnWriter, VersionIterator, VersionedStore};
pub use txn::{should_abort, Txn, TxnContext};
