//! Selector and cursor query definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{QueryError, Result};
use crate::types::{DocId, ObjectId};

use super::operators::matches_filter;

// ============================================================================
// Selector
// ============================================================================

/// Which documents an operation applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// Every document.
    All,
    /// The document with this `_id`.
    Id(DocId),
    /// A MongoDB-style filter object.
    Filter(Value),
}

impl Selector {
    /// Interpret a JSON value as a selector.
    ///
    /// Strings and `$oid` objects select by id, other objects are filters and
    /// `null` selects everything. Anything else is rejected.
    pub fn from_value(value: Value) -> Result<Self> {
        if let Some(id) = DocId::from_value(&value) {
            return Ok(Self::Id(id));
        }
        match value {
            Value::Null => Ok(Self::All),
            Value::Object(_) => Ok(Self::Filter(value)),
            other => Err(QueryError::InvalidSelector(other.to_string()).into()),
        }
    }

    pub fn matches(&self, doc: &Value) -> Result<bool> {
        match self {
            Self::All => Ok(true),
            Self::Id(id) => Ok(DocId::of_document(doc).as_ref() == Some(id)),
            Self::Filter(filter) => matches_filter(doc, filter),
        }
    }

    /// The single id this selector pins, if any.
    pub fn as_id(&self) -> Option<&DocId> {
        match self {
            Self::Id(id) => Some(id),
            _ => None,
        }
    }
}

impl From<&str> for Selector {
    fn from(id: &str) -> Self {
        Self::Id(DocId::from(id))
    }
}

impl From<DocId> for Selector {
    fn from(id: DocId) -> Self {
        Self::Id(id)
    }
}

impl From<&DocId> for Selector {
    fn from(id: &DocId) -> Self {
        Self::Id(id.clone())
    }
}

impl From<ObjectId> for Selector {
    fn from(oid: ObjectId) -> Self {
        Self::Id(DocId::Oid(oid))
    }
}

impl TryFrom<Value> for Selector {
    type Error = crate::error::LiveCollectionError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

// ============================================================================
// Sort Types
// ============================================================================

/// Sort direction for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sort order for a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortEntry {
    pub field: String,
    pub direction: SortDirection,
}

// ============================================================================
// Query Type
// ============================================================================

/// A cursor definition: selector, sort and pagination.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub selector: Selector,
    /// Sort entries in priority order. Empty keeps insertion order.
    pub sort: Vec<SortEntry>,
    /// Maximum number of results to return.
    pub limit: Option<usize>,
    /// Number of results to skip.
    pub offset: Option<usize>,
}

impl Query {
    /// Query over every document.
    pub fn all() -> Self {
        Self::new(Selector::All)
    }

    pub fn new(selector: impl Into<Selector>) -> Self {
        Self {
            selector: selector.into(),
            sort: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(SortEntry {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::all()
    }
}

impl From<Selector> for Query {
    fn from(selector: Selector) -> Self {
        Self::new(selector)
    }
}
