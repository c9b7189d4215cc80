//! Posting list reconstruction from the versioned store
//!
//! Records are walked newest to oldest. The walk stops at the first
//! complete snapshot, at a record marked `discard_earlier_versions`, at a
//! deleted or expired record, or when the cursor leaves the key. The number
//! of deltas folded is therefore bounded by how often the key is rolled up,
//! not by the length of its history.

use std::collections::BTreeMap;

use super::codec;
use super::list::List;
use super::types::PostingList;
use crate::error::{render_key, MvccError, MvccResult};
use crate::key::Key;
use crate::observability::{log_event, log_event_at, metrics, Event, Severity};
use crate::store::{RecordKind, VersionIterator, VersionedStore};

/// Reconstruct the list for `key` from a cursor positioned at its newest
/// record. The list takes ownership of `key`.
pub fn read_posting_list(key: Key, it: &mut dyn VersionIterator) -> MvccResult<List> {
    let (plist, min_ts, mutation_map) = walk_versions(&key, it)?;
    let list = List::from_parts(key, plist, min_ts, mutation_map);
    list.publish_size();
    Ok(list)
}

/// Load the list for `key` as of the newest data in the store.
///
/// A key that is absent, or whose newest record is deleted or expired,
/// yields an empty list. A newest record that is already complete is
/// decoded directly without iterating.
pub fn get_new(key: Key, store: &dyn VersionedStore) -> MvccResult<List> {
    let newest = store.get_at(key.as_bytes(), u64::MAX)?;

    let list = match newest {
        None => List::new(key),
        Some(record) if record.kind() == RecordKind::Complete => {
            let plist = codec::decode(key.as_bytes(), &record.value)?;
            List::from_parts(key, plist, Some(record.version), BTreeMap::new())
        }
        Some(_) => {
            let (plist, min_ts, mutation_map) = {
                let mut it = store.iter_versions(key.as_bytes(), u64::MAX)?;
                walk_versions(&key, it.as_mut())?
            };
            List::from_parts(key, plist, min_ts, mutation_map)
        }
    };

    let size = list.publish_size();
    metrics().record_list_read(size);
    log_event_at(
        Severity::Trace,
        Event::ListRead,
        &[
            ("key", &list.key().to_string()),
            ("size", &size.to_string()),
        ],
    );
    Ok(list)
}

type ListParts = (PostingList, Option<u64>, BTreeMap<u64, PostingList>);

fn walk_versions(key: &Key, it: &mut dyn VersionIterator) -> MvccResult<ListParts> {
    let mut plist = PostingList::new();
    let mut min_ts = None;
    let mut mutation_map = BTreeMap::new();

    while let Some(item) = it.item()? {
        if item.deleted_or_expired || item.key != key.as_bytes() {
            break;
        }

        match item.kind() {
            RecordKind::Complete => {
                plist = codec::decode(&item.key, &item.value)?;
                min_ts = Some(item.version);
                break;
            }
            RecordKind::Delta => {
                let mut delta = codec::decode(&item.key, &item.value)?;
                delta.stamp_commit_ts(item.version);
                mutation_map.insert(item.version, delta);
            }
            RecordKind::Unknown(meta) => {
                metrics().increment_corrupt_records();
                log_event(
                    Event::CorruptRecord,
                    &[
                        ("key", &render_key(&item.key)),
                        ("meta", &meta.to_string()),
                        ("version", &item.version.to_string()),
                    ],
                );
                return Err(MvccError::corrupt(
                    &item.key,
                    format!("unexpected meta: {}", meta),
                ));
            }
        }

        if item.discard_earlier_versions {
            break;
        }
        it.next();
    }

    Ok((plist, min_ts, mutation_map))
}
