//! Posting list keys
//!
//! - `Key` - Owned, move-only key buffer held by a posting list
//! - `ParsedKey` - Structured view of a key (predicate, type, uid/term/count)

mod layout;

pub use layout::{
    count_key, data_key, index_key, reverse_key, schema_key, KeyKind, ParsedKey, MAX_ATTR_LEN,
};

use std::fmt;

use crate::error::render_key;

/// The byte sequence identifying one posting list.
///
/// A `Key` is built by moving a `Vec<u8>` into it and deliberately does not
/// implement `Clone`: whoever constructs a list with it gives the buffer up.
/// Components that need the bytes afterwards copy them out with `to_vec`.
#[derive(PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Vec<u8>);

impl Key {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of the key bytes for components that outlive the borrow.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.clone()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", render_key(&self.0))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", render_key(&self.0))
    }
}
