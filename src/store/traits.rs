use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::patch::Modifier;
use crate::query::{Query, Selector};
use crate::reactive::Unsubscribe;
use crate::sequence::SequenceObserver;
use crate::types::DocId;

/// A document collection whose cursors can be observed.
///
/// Implementors must be `Send + Sync`; observers registered through
/// [`observe`](Self::observe) must be called without any internal lock held
/// so they may call back into the store.
pub trait DocumentStore: Send + Sync {
    /// Collection name, used in logs and error messages.
    fn name(&self) -> &str;

    /// Documents matching `query`, in cursor order.
    fn find(&self, query: &Query) -> Result<Vec<Value>>;

    /// First document matching `selector`.
    fn find_one(&self, selector: &Selector) -> Result<Option<Value>> {
        let query = Query::new(selector.clone()).limit(1);
        Ok(self.find(&query)?.into_iter().next())
    }

    /// Insert a document, generating an `_id` when it has none.
    fn insert(&self, doc: Value) -> Result<DocId>;

    /// Apply `modifier` to the first document matching `selector`.
    /// Returns the number of documents affected (0 or 1).
    fn update(&self, selector: &Selector, modifier: &Modifier) -> Result<usize>;

    /// Remove every document matching `selector`. Returns how many went.
    fn remove(&self, selector: &Selector) -> Result<usize>;

    /// Observe the result set of `query`.
    ///
    /// The current results are delivered as `added_at` calls before this
    /// returns; afterwards every change to the result set is reported in
    /// order.
    fn observe(
        &self,
        query: Query,
        observer: Arc<dyn SequenceObserver + Send + Sync>,
    ) -> Result<ObserveHandle>;
}

/// Live cursor observation. Stops on [`stop`](Self::stop) or drop.
pub struct ObserveHandle {
    stop: Option<Unsubscribe>,
}

impl ObserveHandle {
    pub fn new(stop: Unsubscribe) -> Self {
        Self { stop: Some(stop) }
    }

    /// Detach the observer. Calling it again does nothing.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_none()
    }
}

impl Drop for ObserveHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ObserveHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserveHandle")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
