//! MemoryCollection: an insertion-ordered in-memory [`DocumentStore`].
//!
//! # Observation model
//!
//! Every successful write re-evaluates each live observer's query and replays
//! the difference from the observer's previous result set through
//! [`diff_sequences`]. Deliveries are serialized: a write made from inside an
//! observer callback is picked up by the delivery loop already running
//! instead of interleaving a second one.
//!
//! Two locks are used and never held together with a callback in flight:
//!   - `docs`: the documents, in insertion order.
//!   - `observers`: registered observer entries (shared with stop closures).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::{
    error::{Result, StoreError},
    patch::{apply_modifier, Modifier},
    query::{execute_query, Query, Selector},
    sequence::{diff_sequences, SequenceObserver},
    types::{DocId, ID_FIELD},
};

use super::traits::{DocumentStore, ObserveHandle};

struct ObserverEntry {
    id: u64,
    query: Query,
    observer: Arc<dyn SequenceObserver + Send + Sync>,
    /// Result set as last delivered.
    last: Mutex<Vec<Value>>,
    stopped: AtomicBool,
}

pub struct MemoryCollection {
    name: String,
    docs: Mutex<Vec<Value>>,
    observers: Arc<Mutex<Vec<Arc<ObserverEntry>>>>,
    next_observer_id: AtomicU64,
    delivering: AtomicBool,
    dirty: AtomicBool,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docs: Mutex::new(Vec::new()),
            observers: Arc::new(Mutex::new(Vec::new())),
            next_observer_id: AtomicU64::new(1),
            delivering: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.docs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.lock().is_empty()
    }

    /// Every document, in insertion order.
    pub fn all(&self) -> Vec<Value> {
        self.docs.lock().clone()
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    // -----------------------------------------------------------------------
    // Delivery
    // -----------------------------------------------------------------------

    fn notify(&self) {
        self.dirty.store(true, Ordering::SeqCst);
        loop {
            if self.delivering.swap(true, Ordering::SeqCst) {
                // The running loop will see `dirty`.
                return;
            }
            while self.dirty.swap(false, Ordering::SeqCst) {
                self.deliver_once();
            }
            self.delivering.store(false, Ordering::SeqCst);
            if !self.dirty.load(Ordering::SeqCst) {
                return;
            }
        }
    }

    fn deliver_once(&self) {
        let docs = self.docs.lock().clone();
        let observers: Vec<Arc<ObserverEntry>> = self.observers.lock().iter().cloned().collect();

        for entry in observers {
            if entry.stopped.load(Ordering::SeqCst) {
                continue;
            }
            let next = match execute_query(&docs, &entry.query) {
                Ok(next) => next,
                Err(e) => {
                    tracing::warn!(collection = %self.name, observer = entry.id, error = %e, "observer query failed");
                    continue;
                }
            };
            let previous = std::mem::replace(&mut *entry.last.lock(), next.clone());
            let delivered = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                diff_sequences(&previous, &next, entry.observer.as_ref());
            }));
            if delivered.is_err() {
                tracing::warn!(collection = %self.name, observer = entry.id, "observer callback panicked");
            }
        }
    }

    fn normalize_new_doc(&self, doc: Value) -> Result<(DocId, Value)> {
        let Value::Object(mut fields) = doc else {
            return Err(StoreError::InvalidDocument(format!(
                "documents inserted into \"{}\" must be objects",
                self.name
            ))
            .into());
        };
        let id = match fields.remove(ID_FIELD) {
            None => DocId::random(),
            Some(raw) => DocId::from_value(&raw).ok_or_else(|| {
                StoreError::InvalidDocument(format!("_id must be a string or ObjectID, got {raw}"))
            })?,
        };
        let mut out = Map::new();
        out.insert(ID_FIELD.to_string(), id.to_value());
        out.extend(fields);
        Ok((id, Value::Object(out)))
    }
}

impl DocumentStore for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn find(&self, query: &Query) -> Result<Vec<Value>> {
        let docs = self.docs.lock();
        execute_query(docs.iter(), query)
    }

    fn insert(&self, doc: Value) -> Result<DocId> {
        let (id, doc) = self.normalize_new_doc(doc)?;
        {
            let mut docs = self.docs.lock();
            if docs.iter().any(|d| DocId::of_document(d).as_ref() == Some(&id)) {
                return Err(StoreError::DuplicateId {
                    collection: self.name.clone(),
                    id: id.to_string(),
                }
                .into());
            }
            docs.push(doc);
        }
        tracing::trace!(collection = %self.name, id = %id, "inserted");
        self.notify();
        Ok(id)
    }

    fn update(&self, selector: &Selector, modifier: &Modifier) -> Result<usize> {
        let affected = {
            let mut docs = self.docs.lock();
            let position = match selector.as_id() {
                Some(id) => docs
                    .iter()
                    .position(|doc| DocId::of_document(doc).as_ref() == Some(id)),
                None => {
                    let mut found = None;
                    for (i, doc) in docs.iter().enumerate() {
                        if selector.matches(doc)? {
                            found = Some(i);
                            break;
                        }
                    }
                    found
                }
            };
            match position {
                None => 0,
                Some(i) => {
                    let mut updated = docs[i].clone();
                    apply_modifier(&mut updated, modifier, &self.name)?;
                    docs[i] = updated;
                    1
                }
            }
        };
        if affected > 0 {
            tracing::trace!(collection = %self.name, ?selector, "updated");
            self.notify();
        }
        Ok(affected)
    }

    fn remove(&self, selector: &Selector) -> Result<usize> {
        let removed = {
            let mut docs = self.docs.lock();
            let mut doomed = Vec::with_capacity(docs.len());
            for doc in docs.iter() {
                doomed.push(selector.matches(doc)?);
            }
            let before = docs.len();
            let mut flags = doomed.into_iter();
            docs.retain(|_| !flags.next().unwrap_or(false));
            before - docs.len()
        };
        if removed > 0 {
            tracing::trace!(collection = %self.name, removed, "removed");
            self.notify();
        }
        Ok(removed)
    }

    fn observe(
        &self,
        query: Query,
        observer: Arc<dyn SequenceObserver + Send + Sync>,
    ) -> Result<ObserveHandle> {
        let initial = self.find(&query)?;
        let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(ObserverEntry {
            id,
            query,
            observer: Arc::clone(&observer),
            last: Mutex::new(initial.clone()),
            stopped: AtomicBool::new(false),
        });
        self.observers.lock().push(Arc::clone(&entry));
        tracing::debug!(collection = %self.name, observer = id, initial = initial.len(), "observe started");

        diff_sequences(&[], &initial, observer.as_ref());

        let observers = Arc::clone(&self.observers);
        let name = self.name.clone();
        Ok(ObserveHandle::new(Box::new(move || {
            entry.stopped.store(true, Ordering::SeqCst);
            observers.lock().retain(|e| e.id != id);
            tracing::debug!(collection = %name, observer = id, "observe stopped");
        })))
    }
}

impl std::fmt::Debug for MemoryCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCollection")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("observers", &self.observer_count())
            .finish()
    }
}
