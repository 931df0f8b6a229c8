use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Duplicate _id in collection \"{collection}\": {id}")]
    DuplicateId { collection: String, id: String },

    #[error("Cannot modify _id of a document in collection \"{collection}\"")]
    ImmutableId { collection: String },

    #[error("Cannot create field \"{path}\" inside a non-container value")]
    CannotCreateField { path: String },

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Invalid modifier: {0}")]
    InvalidModifier(String),

    #[error("Unknown update operator: {0}")]
    UnknownOperator(String),
}

// ---------------------------------------------------------------------------
// QueryError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
}

// ---------------------------------------------------------------------------
// ScopeError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("Digest did not stabilise after {iterations} iterations")]
    DigestLimit { iterations: usize },
}

// ---------------------------------------------------------------------------
// BindError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum BindError {
    /// A removal key was neither a string id, an object id, nor a document
    /// carrying one.
    #[error("Invalid remove key {0}: expected a string id, an ObjectID or a document with _id")]
    InvalidRemoveKey(Value),

    #[error("Bound collection has been stopped")]
    Stopped,
}

// ---------------------------------------------------------------------------
// LiveCollectionError: top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LiveCollectionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience alias. The default error type is `LiveCollectionError`.
pub type Result<T, E = LiveCollectionError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
