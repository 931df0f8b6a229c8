//! Selector matching and cursor evaluation for in-memory document sets.

pub mod execute;
pub mod operators;
pub mod types;

pub use execute::{execute_query, sort_documents};
pub use operators::{compare_values, deep_equals, get_field_value, is_operator, matches_filter};
pub use types::{Query, Selector, SortDirection, SortEntry};
