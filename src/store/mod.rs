//! Reactive document collections.
//!
//! [`DocumentStore`] is the seam the binding layer talks to;
//! [`MemoryCollection`] is the in-process implementation.

pub mod memory;
pub mod traits;

pub use memory::MemoryCollection;
pub use traits::{DocumentStore, ObserveHandle};
