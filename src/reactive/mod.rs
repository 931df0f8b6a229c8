//! Reactive primitives shared by the store and the binding layer.
//!
//! [`Dependency`] is an invalidation signal that re-runs reactive cursor
//! factories.

pub mod dependency;

pub use dependency::Dependency;

/// An owned one-shot closure that removes a subscription when called.
pub type Unsubscribe = Box<dyn FnOnce() + Send + Sync>;
