//! Dependency: an invalidation signal.
//!
//! A reactive cursor factory is re-run whenever one of the dependencies it
//! was bound with reports [`Dependency::changed`]. Clones share dependents.
//!
//! `changed` works on a snapshot of the dependents, taken with the lock held
//! and run after releasing it: a dependent removed mid-notification still
//! runs for that change, one added mid-notification waits for the next.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::Unsubscribe;

type Dependent = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Dependents {
    entries: Mutex<Vec<(u64, Dependent)>>,
    next_id: AtomicU64,
}

impl Dependents {
    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(eid, _)| *eid != id);
        entries.len() != before
    }
}

#[derive(Clone, Default)]
pub struct Dependency {
    dependents: Arc<Dependents>,
}

impl Dependency {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `callback` on every later [`changed`](Self::changed). Dropping the
    /// returned closure without calling it keeps the subscription.
    pub fn on_changed(&self, callback: impl Fn() + Send + Sync + 'static) -> Unsubscribe {
        let id = self.dependents.next_id.fetch_add(1, Ordering::Relaxed);
        self.dependents
            .entries
            .lock()
            .push((id, Arc::new(callback)));
        let dependents = Arc::clone(&self.dependents);
        Box::new(move || {
            dependents.remove(id);
        })
    }

    /// Invalidate every dependent. Dependents re-run synchronously.
    pub fn changed(&self) {
        let snapshot: Vec<Dependent> = self
            .dependents
            .entries
            .lock()
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();
        tracing::trace!(dependents = snapshot.len(), "dependency changed");
        for dependent in snapshot {
            dependent();
        }
    }

    pub fn has_dependents(&self) -> bool {
        !self.dependents.entries.lock().is_empty()
    }

    pub fn dependent_count(&self) -> usize {
        self.dependents.entries.lock().len()
    }
}

impl std::fmt::Debug for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependency")
            .field("dependents", &self.dependent_count())
            .finish()
    }
}
