//! Two-way binding between a [`DocumentStore`](crate::store::DocumentStore)
//! cursor and a digest-watched array.
//!
//! # Overview
//!
//! [`BoundCollection`] mirrors a cursor's result set into an array. Store
//! changes are copied into the array as they are observed; client edits to
//! the array are detected on [`Scope::apply`](crate::scope::Scope::apply) and
//! written back as minimal update operators when auto client save is on.
//!
//! # Modules
//!
//! - [`options`]: [`BindOptions`], [`CursorSource`] and [`BindingBuilder`].
//! - [`changes`]: client-side change detection ([`ClientChanges`]).
//! - [`collection`]: [`BoundCollection`] itself.

pub mod changes;
pub mod collection;
pub mod options;

pub use changes::{client_changes, ClientChanges};
pub use collection::BoundCollection;
pub use options::{BindOptions, BindingBuilder, CursorSource};
