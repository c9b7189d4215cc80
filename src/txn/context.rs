//! Transaction context reported to the timestamp coordinator

use serde::{Deserialize, Serialize};

/// What the coordinator needs to detect conflicts and route writes.
///
/// `keys` holds base-36 fingerprints of conflict keys, `preds` the names of
/// written predicates. Neither list has a meaningful order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnContext {
    pub start_ts: u64,
    pub keys: Vec<String>,
    pub preds: Vec<String>,
}

impl TxnContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort both lists, for consumers that compare contexts.
    pub fn normalize(&mut self) {
        self.keys.sort();
        self.preds.sort();
    }

    pub(crate) fn push_key(&mut self, fingerprint: String) {
        if !self.keys.contains(&fingerprint) {
            self.keys.push(fingerprint);
        }
    }

    pub(crate) fn push_pred(&mut self, pred: &str) {
        if !self.preds.iter().any(|p| p == pred) {
            self.preds.push(pred.to_string());
        }
    }
}

/// 64-bit fingerprint of a conflict key.
pub fn fingerprint(conflict_key: &[u8]) -> u64 {
    farmhash::fingerprint64(conflict_key)
}

/// Lowercase base-36 rendering of `n`, without padding.
pub fn format_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    // u64::MAX needs 13 base-36 digits
    let mut buf = [0u8; 13];
    let mut i = buf.len();
    while n > 0 {
        i -= 1;
        buf[i] = DIGITS[(n % 36) as usize];
        n /= 36;
    }
    buf[i..].iter().map(|&b| b as char).collect()
}

/// The string the coordinator receives for a conflict key.
pub fn conflict_fingerprint(conflict_key: &[u8]) -> String {
    format_base36(fingerprint(conflict_key))
}
