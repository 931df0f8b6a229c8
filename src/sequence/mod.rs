//! Ordered diff between two `_id`-keyed document sequences.
//!
//! Used on both sides of a binding: the in-memory store replays result-set
//! changes to cursor observers through it, and the bound array uses it to
//! find client-side additions, removals and edits.

use std::collections::HashSet;

use serde_json::Value;

use crate::query::operators::deep_equals;
use crate::types::DocId;

/// Receiver of ordered sequence changes. Every method defaults to a no-op.
///
/// Indices are positions in the sequence as it looks when the callback
/// fires, so replaying the calls in order on the old sequence produces the
/// new one.
pub trait SequenceObserver {
    fn added_at(&self, _doc: &Value, _index: usize) {}
    fn changed_at(&self, _doc: &Value, _old: &Value, _index: usize) {}
    fn moved_to(&self, _doc: &Value, _from: usize, _to: usize) {}
    fn removed_at(&self, _doc: &Value, _index: usize) {}
}

fn sequence_keys(docs: &[Value], side: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    docs.iter()
        .enumerate()
        .map(|(i, doc)| {
            let key = DocId::of_document(doc)
                .map(|id| id.key())
                .unwrap_or_else(|| format!("{side}:{i}"));
            // A repeated id is treated as a distinct, unkeyed entry.
            if seen.insert(key.clone()) {
                key
            } else {
                format!("{side}:{i}")
            }
        })
        .collect()
}

/// Diff `old` against `new`, reporting removals first, then moves, additions
/// and in-place changes in the order of `new`.
///
/// Documents without an `_id` never match anything on the other side.
pub fn diff_sequences(old: &[Value], new: &[Value], observer: &dyn SequenceObserver) {
    let old_keys = sequence_keys(old, "old");
    let new_keys = sequence_keys(new, "new");
    let wanted: HashSet<&str> = new_keys.iter().map(String::as_str).collect();

    let mut working: Vec<(&str, &Value)> = old_keys
        .iter()
        .map(String::as_str)
        .zip(old.iter())
        .collect();

    let mut i = 0;
    while i < working.len() {
        if wanted.contains(working[i].0) {
            i += 1;
        } else {
            let (_, doc) = working.remove(i);
            observer.removed_at(doc, i);
        }
    }

    for (pos, (key, doc)) in new_keys.iter().zip(new.iter()).enumerate() {
        let key = key.as_str();
        let in_place = working.get(pos).is_some_and(|(k, _)| *k == key);
        if !in_place {
            let found = working
                .iter()
                .skip(pos + 1)
                .position(|(k, _)| *k == key)
                .map(|offset| offset + pos + 1);
            match found {
                Some(from) => {
                    let entry = working.remove(from);
                    working.insert(pos, entry);
                    observer.moved_to(doc, from, pos);
                }
                None => {
                    working.insert(pos, (key, doc));
                    observer.added_at(doc, pos);
                    continue;
                }
            }
        }
        let old_doc = working[pos].1;
        if !deep_equals(old_doc, doc) {
            observer.changed_at(doc, old_doc, pos);
            working[pos].1 = doc;
        }
    }
}
