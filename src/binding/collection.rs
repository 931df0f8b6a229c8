//! BoundCollection: a live array kept in sync with a store cursor.
//!
//! # Lock discipline
//!
//! All mutable binding state lives behind one `parking_lot::Mutex`. The store
//! calls our cursor observer synchronously from inside `insert`, `update`,
//! `remove` and `observe`, so the state lock is never held across a store
//! call. Scope calls (`watch`, `unwatch`, `timeout`, `cancel`) may happen
//! under the lock because the scope never runs callbacks while holding its
//! own locks.
//!
//! Callbacks registered with the store, the scope and dependencies hold a
//! `Weak` reference, so dropping every [`BoundCollection`] handle tears the
//! binding down.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;

use crate::{
    ejson::strip_hash_keys,
    error::{BindError, Result, StoreError},
    patch::{deep_copy_changes, split_pulls, Modifier},
    query::Selector,
    reactive::Unsubscribe,
    scope::{Scope, TimeoutId, WatchId},
    sequence::SequenceObserver,
    store::{DocumentStore, ObserveHandle},
    types::{Action, DocAction, DocId, ID_FIELD},
};

use super::changes::{client_changes, ClientChanges};
use super::options::{BindOptions, BindingBuilder, CursorSource};

#[derive(Default)]
struct BindingState {
    items: Vec<Value>,
    /// The cursor's documents as last reported by the store.
    server_backup: Vec<Value>,
    /// Bumped on every cursor (re)start; stale observers compare against it.
    generation: u64,
    observe: Option<ObserveHandle>,
    server_mode: bool,
    unset_timeout: Option<TimeoutId>,
    watch: Option<WatchId>,
    dependency_subs: Vec<Unsubscribe>,
    stopped: bool,
}

impl BindingState {
    fn accepts(&self, generation: u64) -> bool {
        !self.stopped && self.generation == generation
    }
}

struct BindingInner<S: DocumentStore + 'static> {
    store: Arc<S>,
    scope: Scope,
    options: BindOptions,
    source: CursorSource,
    state: Mutex<BindingState>,
}

/// A digest-watched array bound to a [`DocumentStore`] cursor.
///
/// Clones share the same array.
pub struct BoundCollection<S: DocumentStore + 'static> {
    inner: Arc<BindingInner<S>>,
}

impl<S: DocumentStore + 'static> Clone for BoundCollection<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn position_of(items: &[Value], id: &DocId) -> Option<usize> {
    items
        .iter()
        .position(|doc| DocId::of_document(doc).as_ref() == Some(id))
}

/// Remove client-added items from `items`, highest index first.
fn splice_out_added(items: &mut Vec<Value>, changes: &ClientChanges) {
    for (index, _) in changes.added.iter().rev() {
        if *index < items.len() {
            items.remove(*index);
        }
    }
}

fn removal_id(key: &Value) -> Result<DocId> {
    let raw = key.get(ID_FIELD).unwrap_or(key);
    DocId::from_value(raw).ok_or_else(|| BindError::InvalidRemoveKey(key.clone()).into())
}

// ============================================================================
// Public API
// ============================================================================

impl<S: DocumentStore + 'static> BoundCollection<S> {
    pub fn builder(store: Arc<S>) -> BindingBuilder<S> {
        BindingBuilder::new(store)
    }

    pub(crate) fn start(builder: BindingBuilder<S>, scope: Scope) -> Result<Self> {
        let BindingBuilder {
            store,
            source,
            options,
            dependencies,
        } = builder;

        let inner = Arc::new(BindingInner {
            store,
            scope,
            options,
            source,
            state: Mutex::new(BindingState::default()),
        });

        for dependency in &dependencies {
            let weak = Arc::downgrade(&inner);
            let unsubscribe = dependency.on_changed(move || {
                let Some(binding) = weak.upgrade() else {
                    return;
                };
                if let Err(e) = binding.restart() {
                    tracing::warn!(collection = binding.store.name(), error = %e, "cursor re-run failed");
                }
            });
            inner.state.lock().dependency_subs.push(unsubscribe);
        }

        inner.restart()?;
        tracing::debug!(collection = inner.store.name(), options = ?inner.options, "collection bound");
        Ok(Self { inner })
    }

    // -----------------------------------------------------------------------
    // Array access
    // -----------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner.state.lock().items.get(index).cloned()
    }

    /// Snapshot of the array, `$$` keys included.
    pub fn items(&self) -> Vec<Value> {
        self.inner.state.lock().items.clone()
    }

    pub fn push(&self, doc: Value) {
        self.inner.state.lock().items.push(doc);
    }

    pub fn pop(&self) -> Option<Value> {
        self.inner.state.lock().items.pop()
    }

    /// Array-style splice. Out-of-range bounds are clamped.
    pub fn splice(&self, start: usize, delete_count: usize, insert: Vec<Value>) -> Vec<Value> {
        let mut state = self.inner.state.lock();
        let start = start.min(state.items.len());
        let end = start.saturating_add(delete_count).min(state.items.len());
        state.items.splice(start..end, insert).collect()
    }

    /// Replace the element at `index`, returning the previous one.
    pub fn set(&self, index: usize, doc: Value) -> Option<Value> {
        let mut state = self.inner.state.lock();
        state
            .items
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, doc))
    }

    /// Edit the element at `index` in place. Returns false when out of range.
    pub fn update(&self, index: usize, f: impl FnOnce(&mut Value)) -> bool {
        let Some(mut doc) = self.get(index) else {
            return false;
        };
        f(&mut doc);
        self.set(index, doc).is_some()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Upsert `docs`, or every array element when `None`.
    ///
    /// Documents whose `_id` already exists get a `$set` (or `$unset` when
    /// `use_unset`) of their other fields; the rest are inserted.
    pub fn save(&self, docs: Option<Vec<Value>>, use_unset: bool) -> Result<Vec<DocAction>> {
        self.inner.save(docs, use_unset)
    }

    /// Remove by document, string id or `$oid`, or every element when `None`.
    pub fn remove(&self, keys: Option<Vec<Value>>) -> Result<Vec<DocAction>> {
        self.inner.remove(keys)
    }

    /// Apply `modifier` to document `id`, issuing each `$pull` separately.
    pub fn update_diff(&self, id: &DocId, modifier: &Modifier, done: impl FnOnce(Result<usize>)) {
        self.inner.update_diff(id, modifier, done)
    }

    /// Issue every update in `updates` against document `id`.
    ///
    /// `done` runs once: with the first error, or with the affected count of
    /// the last update.
    pub fn update_parallel(&self, id: &DocId, updates: &[Modifier], done: impl FnOnce(Result<usize>)) {
        self.inner.update_parallel(id, updates, done)
    }

    /// Detach from the store and the scope and clear the array.
    pub fn stop(&self) {
        self.inner.stop()
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    pub fn options(&self) -> BindOptions {
        self.inner.options
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.state.lock().stopped
    }

    /// True between a store event and the deferred resync that follows it.
    pub fn is_server_update_mode(&self) -> bool {
        self.inner.state.lock().server_mode
    }
}

impl<S: DocumentStore + 'static> std::fmt::Debug for BoundCollection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("BoundCollection")
            .field("collection", &self.inner.store.name())
            .field("len", &state.items.len())
            .field("server_mode", &state.server_mode)
            .field("stopped", &state.stopped)
            .finish()
    }
}

// ============================================================================
// Cursor lifecycle
// ============================================================================

impl<S: DocumentStore + 'static> BindingInner<S> {
    fn ensure_active(&self) -> Result<()> {
        if self.state.lock().stopped {
            return Err(BindError::Stopped.into());
        }
        Ok(())
    }

    /// Drop the current observation and observe the source's query afresh.
    fn restart(self: &Arc<Self>) -> Result<()> {
        let (generation, previous) = {
            let mut state = self.state.lock();
            if state.stopped {
                return Err(BindError::Stopped.into());
            }
            state.generation += 1;
            state.items.clear();
            state.server_backup.clear();
            state.server_mode = false;
            if let Some(id) = state.unset_timeout.take() {
                self.scope.cancel(id);
            }
            (state.generation, state.observe.take())
        };
        drop(previous);

        self.unset_auto_client_save();
        if self.options.auto_client_save {
            self.set_auto_client_save();
        }

        let query = self.source.query();
        tracing::debug!(collection = self.store.name(), generation, ?query, "observing cursor");
        let observer = Arc::new(CursorObserver {
            binding: Arc::downgrade(self),
            generation,
        });
        let handle = self.store.observe(query, observer)?;

        let stale = {
            let mut state = self.state.lock();
            if state.accepts(generation) {
                state.observe = Some(handle);
                None
            } else {
                Some(handle)
            }
        };
        drop(stale);
        Ok(())
    }

    fn stop(&self) {
        let (observe, subs) = {
            let mut state = self.state.lock();
            if state.stopped {
                return;
            }
            state.stopped = true;
            state.items.clear();
            state.server_backup.clear();
            state.server_mode = false;
            if let Some(id) = state.watch.take() {
                self.scope.unwatch(id);
            }
            if let Some(id) = state.unset_timeout.take() {
                self.scope.cancel(id);
            }
            (state.observe.take(), std::mem::take(&mut state.dependency_subs))
        };
        drop(observe);
        for unsubscribe in subs {
            unsubscribe();
        }
        tracing::debug!(collection = self.store.name(), "binding stopped");
    }

    // -----------------------------------------------------------------------
    // Store -> array
    // -----------------------------------------------------------------------

    fn server_added(self: &Arc<Self>, generation: u64, doc: &Value, index: usize) {
        {
            let mut state = self.state.lock();
            if !state.accepts(generation) {
                return;
            }
            let at = index.min(state.items.len());
            state.items.insert(at, doc.clone());
            let at = index.min(state.server_backup.len());
            state.server_backup.insert(at, doc.clone());
        }
        tracing::trace!(collection = self.store.name(), index, "server added");
        self.enter_server_mode();
    }

    fn server_changed(self: &Arc<Self>, generation: u64, doc: &Value, index: usize) {
        {
            let mut state = self.state.lock();
            if !state.accepts(generation) {
                return;
            }
            let slot = match DocId::of_document(doc) {
                Some(id) => position_of(&state.items, &id),
                None => (index < state.items.len()).then_some(index),
            };
            if let Some(i) = slot {
                deep_copy_changes(&mut state.items[i], doc);
            }
            let slot = match DocId::of_document(doc) {
                Some(id) => position_of(&state.server_backup, &id),
                None => (index < state.server_backup.len()).then_some(index),
            };
            if let Some(i) = slot {
                state.server_backup[i] = doc.clone();
            }
        }
        tracing::trace!(collection = self.store.name(), index, "server changed");
        self.enter_server_mode();
    }

    fn server_moved(self: &Arc<Self>, generation: u64, doc: &Value, to: usize) {
        let Some(id) = DocId::of_document(doc) else {
            return;
        };
        {
            let mut guard = self.state.lock();
            if !guard.accepts(generation) {
                return;
            }
            let state = &mut *guard;
            for items in [&mut state.items, &mut state.server_backup] {
                if let Some(from) = position_of(items, &id) {
                    let moved = items.remove(from);
                    items.insert(to.min(items.len()), moved);
                }
            }
        }
        tracing::trace!(collection = self.store.name(), id = %id, to, "server moved");
        self.enter_server_mode();
    }

    fn server_removed(self: &Arc<Self>, generation: u64, doc: &Value) {
        let Some(id) = DocId::of_document(doc) else {
            return;
        };
        let in_array = {
            let mut state = self.state.lock();
            if !state.accepts(generation) {
                return;
            }
            if let Some(i) = position_of(&state.server_backup, &id) {
                state.server_backup.remove(i);
            }
            match position_of(&state.items, &id) {
                Some(i) => {
                    state.items.remove(i);
                    true
                }
                None => false,
            }
        };
        tracing::trace!(collection = self.store.name(), id = %id, in_array, "server removed");
        if in_array {
            self.enter_server_mode();
        }
    }

    /// Suspend client saving and (re)schedule the resync timeout.
    fn enter_server_mode(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let mut state = self.state.lock();
        if state.stopped {
            return;
        }
        state.server_mode = true;
        if let Some(id) = state.watch.take() {
            self.scope.unwatch(id);
        }
        if let Some(id) = state.unset_timeout.take() {
            self.scope.cancel(id);
        }
        state.unset_timeout = Some(self.scope.timeout(move || {
            if let Some(binding) = weak.upgrade() {
                binding.leave_server_mode();
            }
        }));
    }

    /// Save client edits made while server updates were arriving, then resume
    /// auto client save.
    fn leave_server_mode(self: &Arc<Self>) {
        let changes = {
            let mut state = self.state.lock();
            state.unset_timeout = None;
            if state.stopped {
                return;
            }
            state.server_mode = false;
            let changes = client_changes(&state.items, &state.server_backup, self.options.diff_mode);
            splice_out_added(&mut state.items, &changes);
            changes
        };
        if !changes.is_empty() {
            tracing::debug!(collection = self.store.name(), "saving changes made during server update");
            self.save_changes(changes);
        }
        if self.options.auto_client_save {
            self.set_auto_client_save();
        }
    }

    // -----------------------------------------------------------------------
    // Array -> store
    // -----------------------------------------------------------------------

    fn set_auto_client_save(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let mut state = self.state.lock();
        // Server update mode re-registers the watcher when it ends.
        if state.stopped || state.server_mode {
            return;
        }
        if let Some(id) = state.watch.take() {
            self.scope.unwatch(id);
        }
        // Edits made before the next digest count against this baseline.
        let baseline: Vec<Value> = state.items.iter().map(strip_hash_keys).collect();
        let snapshot = Mutex::new(baseline);
        state.watch = Some(self.scope.watch(move || {
            weak.upgrade()
                .is_some_and(|binding| binding.check_client_changes(&snapshot))
        }));
    }

    fn unset_auto_client_save(&self) {
        let watch = self.state.lock().watch.take();
        if let Some(id) = watch {
            self.scope.unwatch(id);
        }
    }

    /// Watcher body: save whatever changed since `snapshot`.
    fn check_client_changes(self: &Arc<Self>, snapshot: &Mutex<Vec<Value>>) -> bool {
        let changes = {
            let mut state = self.state.lock();
            if state.stopped || state.server_mode {
                return false;
            }
            let current: Vec<Value> = state.items.iter().map(strip_hash_keys).collect();
            let previous = {
                let mut last = snapshot.lock();
                if *last == current {
                    return false;
                }
                std::mem::replace(&mut *last, current)
            };
            let changes = client_changes(&state.items, &previous, self.options.diff_mode);
            splice_out_added(&mut state.items, &changes);
            changes
        };
        if changes.is_empty() {
            return false;
        }

        tracing::debug!(
            collection = self.store.name(),
            added = changes.added.len(),
            removed = changes.removed.len(),
            changed = changes.changed.len(),
            "saving client changes"
        );
        self.unset_auto_client_save();
        self.save_changes(changes);
        self.set_auto_client_save();
        true
    }

    fn save_changes(&self, changes: ClientChanges) {
        let ClientChanges {
            added,
            removed,
            changed,
        } = changes;
        let collection = self.store.name();

        if !added.is_empty() {
            let docs = added.into_iter().map(|(_, doc)| doc).collect();
            if let Err(e) = self.save(Some(docs), false) {
                tracing::warn!(collection, error = %e, "failed to save added documents");
            }
        }

        // Unsaved client items have nothing to remove.
        let removed: Vec<Value> = removed
            .into_iter()
            .filter(|doc| DocId::of_document(doc).is_some())
            .collect();
        if !removed.is_empty() {
            if let Err(e) = self.remove(Some(removed)) {
                tracing::warn!(collection, error = %e, "failed to remove documents");
            }
        }

        for (id, modifier) in changed {
            self.update_diff(&id, &modifier, |result| {
                if let Err(e) = result {
                    tracing::warn!(collection, id = %id, error = %e, "failed to save document changes");
                }
            });
        }
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    fn save(&self, docs: Option<Vec<Value>>, use_unset: bool) -> Result<Vec<DocAction>> {
        self.ensure_active()?;
        let docs = match docs {
            Some(docs) => docs,
            None => self.state.lock().items.clone(),
        };
        docs.into_iter()
            .map(|doc| self.upsert(doc, use_unset))
            .collect()
    }

    fn upsert(&self, doc: Value, use_unset: bool) -> Result<DocAction> {
        let Value::Object(mut fields) = strip_hash_keys(&doc) else {
            return Err(StoreError::InvalidDocument(format!(
                "cannot save {doc} into \"{}\": documents must be objects",
                self.store.name()
            ))
            .into());
        };

        if let Some(id) = fields.get(ID_FIELD).and_then(DocId::from_value) {
            let selector = Selector::Id(id.clone());
            if self.store.find_one(&selector)?.is_some() {
                fields.remove(ID_FIELD);
                let mut modifier = Modifier::new();
                for (field, value) in fields {
                    if use_unset {
                        modifier.unset(field);
                    } else {
                        modifier.set(field, value);
                    }
                }
                // Nothing but `_id` to save; an empty modifier would replace.
                if !modifier.is_replacement() {
                    self.store.update(&selector, &modifier)?;
                }
                return Ok(DocAction::new(id, Action::Updated));
            }
        }

        let id = self.store.insert(Value::Object(fields))?;
        Ok(DocAction::new(id, Action::Inserted))
    }

    fn remove(&self, keys: Option<Vec<Value>>) -> Result<Vec<DocAction>> {
        self.ensure_active()?;
        let keys = match keys {
            Some(keys) => keys,
            None => self
                .state
                .lock()
                .items
                .iter()
                .filter_map(|doc| doc.get(ID_FIELD).cloned())
                .collect(),
        };
        let ids = keys.iter().map(removal_id).collect::<Result<Vec<_>>>()?;

        let mut actions = Vec::with_capacity(ids.len());
        for id in ids {
            self.store.remove(&Selector::Id(id.clone()))?;
            actions.push(DocAction::new(id, Action::Removed));
        }
        Ok(actions)
    }

    fn update_diff(&self, id: &DocId, modifier: &Modifier, done: impl FnOnce(Result<usize>)) {
        let updates = split_pulls(modifier);
        self.update_parallel(id, &updates, done);
    }

    fn update_parallel(&self, id: &DocId, updates: &[Modifier], done: impl FnOnce(Result<usize>)) {
        if let Err(e) = self.ensure_active() {
            done(Err(e));
            return;
        }

        let selector = Selector::Id(id.clone());
        let mut affected = 0;
        let mut first_error = None;
        for update in updates {
            match self.store.update(&selector, update) {
                Ok(n) => affected = n,
                Err(e) => {
                    tracing::debug!(collection = self.store.name(), id = %id, error = %e, "update failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        done(match first_error {
            Some(e) => Err(e),
            None => Ok(affected),
        });
    }
}

impl<S: DocumentStore + 'static> Drop for BindingInner<S> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(id) = state.watch.take() {
            self.scope.unwatch(id);
        }
        if let Some(id) = state.unset_timeout.take() {
            self.scope.cancel(id);
        }
        for unsubscribe in state.dependency_subs.drain(..) {
            unsubscribe();
        }
    }
}

// ============================================================================
// CursorObserver
// ============================================================================

/// Forwards store events for one cursor generation to the binding.
struct CursorObserver<S: DocumentStore + 'static> {
    binding: Weak<BindingInner<S>>,
    generation: u64,
}

impl<S: DocumentStore + 'static> SequenceObserver for CursorObserver<S> {
    fn added_at(&self, doc: &Value, index: usize) {
        if let Some(binding) = self.binding.upgrade() {
            binding.server_added(self.generation, doc, index);
        }
    }

    fn changed_at(&self, doc: &Value, _old: &Value, index: usize) {
        if let Some(binding) = self.binding.upgrade() {
            binding.server_changed(self.generation, doc, index);
        }
    }

    fn moved_to(&self, doc: &Value, _from: usize, to: usize) {
        if let Some(binding) = self.binding.upgrade() {
            binding.server_moved(self.generation, doc, to);
        }
    }

    fn removed_at(&self, doc: &Value, _index: usize) {
        if let Some(binding) = self.binding.upgrade() {
            binding.server_removed(self.generation, doc);
        }
    }
}
