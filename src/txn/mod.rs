//! Transactions over posting lists
//!
//! This module provides:
//! - `Txn` - Delta and conflict key tracking, two-phase commit
//! - `TxnContext` - What the timestamp coordinator is told
//! - `RetryPolicy` - Bounded or unbounded retry of restructuring conflicts

mod context;
mod retry;
mod transaction;

pub use context::{conflict_fingerprint, fingerprint, format_base36, TxnContext};
pub use retry::RetryPolicy;
pub use transaction::{should_abort, Txn};
