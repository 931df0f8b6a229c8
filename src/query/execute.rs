//! Query execution: scan-and-filter with sorting and pagination.

use serde_json::Value;

use crate::error::Result;

use super::operators::{compare_values, get_field_value};
use super::types::{Query, SortDirection, SortEntry};

// ============================================================================
// Sorting
// ============================================================================

/// Sort documents by multiple fields with cascading priority.
/// The sort is stable, so ties keep their incoming (insertion) order.
pub fn sort_documents(mut docs: Vec<Value>, sort: &[SortEntry]) -> Vec<Value> {
    if sort.is_empty() {
        return docs;
    }

    docs.sort_by(|a, b| {
        for entry in sort {
            let va = get_field_value(a, &entry.field).unwrap_or(&Value::Null);
            let vb = get_field_value(b, &entry.field).unwrap_or(&Value::Null);
            let cmp = compare_values(va, vb);
            if cmp != std::cmp::Ordering::Equal {
                return if entry.direction == SortDirection::Desc {
                    cmp.reverse()
                } else {
                    cmp
                };
            }
        }
        std::cmp::Ordering::Equal
    });

    docs
}

// ============================================================================
// Query Execution
// ============================================================================

/// Execute a query against documents in insertion order.
///
/// 1. Apply the selector.
/// 2. Sort.
/// 3. Paginate (offset then limit).
pub fn execute_query<'a>(docs: impl IntoIterator<Item = &'a Value>, query: &Query) -> Result<Vec<Value>> {
    let mut matched = Vec::new();
    for doc in docs {
        if query.selector.matches(doc)? {
            matched.push(doc.clone());
        }
    }

    let sorted = sort_documents(matched, &query.sort);

    let start = query.offset.unwrap_or(0);
    let paged = sorted.into_iter().skip(start);
    Ok(match query.limit {
        Some(n) => paged.take(n).collect(),
        None => paged.collect(),
    })
}

// ============================================================================
// Tests
// ============================================================================
