//! Binding configuration and construction.

use std::sync::Arc;

use serde::Deserialize;

use crate::error::Result;
use crate::patch::DiffMode;
use crate::query::Query;
use crate::reactive::Dependency;
use crate::scope::Scope;
use crate::store::DocumentStore;

use super::collection::BoundCollection;

// ============================================================================
// BindOptions
// ============================================================================

/// Knobs of a binding. Deserializable so bindings can be configured from JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BindOptions {
    /// Push client edits of the array back to the store on digest.
    pub auto_client_save: bool,
    /// How edited documents are turned into update operators.
    pub diff_mode: DiffMode,
}

impl Default for BindOptions {
    fn default() -> Self {
        Self {
            auto_client_save: true,
            diff_mode: DiffMode::Deep,
        }
    }
}

// ============================================================================
// CursorSource
// ============================================================================

/// Where a binding's cursor comes from.
#[derive(Clone)]
pub enum CursorSource {
    /// A fixed query.
    Query(Query),
    /// A factory re-run whenever a bound [`Dependency`] changes.
    Reactive(Arc<dyn Fn() -> Query + Send + Sync>),
}

impl CursorSource {
    pub fn query(&self) -> Query {
        match self {
            Self::Query(q) => q.clone(),
            Self::Reactive(factory) => factory(),
        }
    }
}

impl std::fmt::Debug for CursorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Query(q) => f.debug_tuple("Query").field(q).finish(),
            Self::Reactive(_) => f.write_str("Reactive(..)"),
        }
    }
}

// ============================================================================
// BindingBuilder
// ============================================================================

/// Builder returned by [`BoundCollection::builder`].
///
/// ```ignore
/// let todos = BoundCollection::builder(store)
///     .query(Query::all().limit(10))
///     .auto_client_save(false)
///     .bind(&scope)?;
/// ```
pub struct BindingBuilder<S: DocumentStore + 'static> {
    pub(crate) store: Arc<S>,
    pub(crate) source: CursorSource,
    pub(crate) options: BindOptions,
    pub(crate) dependencies: Vec<Dependency>,
}

impl<S: DocumentStore + 'static> BindingBuilder<S> {
    pub(crate) fn new(store: Arc<S>) -> Self {
        Self {
            store,
            source: CursorSource::Query(Query::all()),
            options: BindOptions::default(),
            dependencies: Vec::new(),
        }
    }

    /// Bind a fixed cursor instead of the whole collection.
    pub fn query(mut self, query: Query) -> Self {
        self.source = CursorSource::Query(query);
        self
    }

    /// Bind a cursor factory; pair with [`depends_on`](Self::depends_on).
    pub fn reactive(mut self, factory: impl Fn() -> Query + Send + Sync + 'static) -> Self {
        self.source = CursorSource::Reactive(Arc::new(factory));
        self
    }

    /// Re-run the cursor whenever `dependency` changes.
    pub fn depends_on(mut self, dependency: &Dependency) -> Self {
        self.dependencies.push(dependency.clone());
        self
    }

    pub fn auto_client_save(mut self, enabled: bool) -> Self {
        self.options.auto_client_save = enabled;
        self
    }

    pub fn diff_mode(mut self, mode: DiffMode) -> Self {
        self.options.diff_mode = mode;
        self
    }

    pub fn options(mut self, options: BindOptions) -> Self {
        self.options = options;
        self
    }

    /// Start observing and return the live array.
    pub fn bind(self, scope: &Scope) -> Result<BoundCollection<S>> {
        BoundCollection::start(self, scope.clone())
    }
}
