//! Posting lists under MVCC
//!
//! This module provides:
//! - `Posting`, `PostingList` - List content
//! - `codec` - Record payload encoding
//! - `List` - Snapshot plus delta chain plus pending transaction writes
//! - `read_posting_list`, `get_new` - Reconstruction from the store
//! - `ListSource`, `LocalCache` - Key to list resolution

pub mod codec;
mod cache;
mod list;
mod reader;
mod types;

pub use cache::{ListSource, LocalCache};
pub use list::List;
pub use reader::{get_new, read_posting_list};
pub use types::{Posting, PostingList, PostingOp};
