//! Client-side change detection for bound arrays.

use parking_lot::Mutex;
use serde_json::Value;

use crate::patch::{get_updates, DiffMode, Modifier};
use crate::sequence::{diff_sequences, SequenceObserver};
use crate::types::DocId;

/// What the client did to a bound array since a previous snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientChanges {
    /// New items with their index in the current array, ascending.
    pub added: Vec<(usize, Value)>,
    /// Items that disappeared, in their previous order.
    pub removed: Vec<Value>,
    /// Per-document update operators for edited items.
    pub changed: Vec<(DocId, Modifier)>,
}

impl ClientChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

struct Collector {
    mode: DiffMode,
    changes: Mutex<ClientChanges>,
}

impl SequenceObserver for Collector {
    fn added_at(&self, doc: &Value, index: usize) {
        self.changes.lock().added.push((index, doc.clone()));
    }

    fn changed_at(&self, doc: &Value, old: &Value, _index: usize) {
        let Some(id) = DocId::of_document(doc) else {
            return;
        };
        let updates = get_updates(old, doc, self.mode);
        if !updates.is_empty() {
            self.changes.lock().changed.push((id, updates));
        }
    }

    fn removed_at(&self, doc: &Value, _index: usize) {
        self.changes.lock().removed.push(doc.clone());
    }
}

/// Compare the `current` array with a `previous` snapshot.
///
/// Moves are ignored: order is owned by the store's cursor.
pub fn client_changes(current: &[Value], previous: &[Value], mode: DiffMode) -> ClientChanges {
    let collector = Collector {
        mode,
        changes: Mutex::new(ClientChanges::default()),
    };
    diff_sequences(previous, current, &collector);
    collector.changes.into_inner()
}
