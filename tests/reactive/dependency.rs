//! Tests for `Dependency`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use live_collection::reactive::Dependency;

#[test]
fn changed_runs_every_dependent() {
    let dep = Dependency::new();
    let hits = Arc::new(AtomicUsize::new(0));
    for _ in 0..2 {
        let hits = Arc::clone(&hits);
        // Dropping the returned handle keeps the subscription.
        let _keep = dep.on_changed(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        });
    }

    dep.changed();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn unsubscribe_stops_notifications() {
    let dep = Dependency::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    let unsubscribe = dep.on_changed(move || {
        h.fetch_add(1, Ordering::SeqCst);
    });

    dep.changed();
    unsubscribe();
    dep.changed();

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!dep.has_dependents());
}

#[test]
fn clones_share_dependents() {
    let dep = Dependency::new();
    let alias = dep.clone();
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    let _keep = dep.on_changed(move || {
        h.fetch_add(1, Ordering::SeqCst);
    });

    alias.changed();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(alias.has_dependents());
}

// ============================================================================
// Re-entrancy
// ============================================================================

#[test]
fn dependent_removed_mid_change_still_runs_that_round() {
    let dep = Dependency::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let second: Arc<std::sync::Mutex<Option<Box<dyn FnOnce() + Send + Sync>>>> =
        Arc::new(std::sync::Mutex::new(None));

    {
        let second = Arc::clone(&second);
        let _keep = dep.on_changed(move || {
            if let Some(unsubscribe) = second.lock().unwrap().take() {
                unsubscribe();
            }
        });
    }
    {
        let hits = Arc::clone(&hits);
        let unsubscribe = dep.on_changed(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        *second.lock().unwrap() = Some(unsubscribe);
    }

    dep.changed();
    dep.changed();

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(dep.dependent_count(), 1);
}

#[test]
fn dependent_added_mid_change_waits_for_the_next() {
    let dep = Dependency::new();
    let hits = Arc::new(AtomicUsize::new(0));
    {
        let inner_dep = dep.clone();
        let hits = Arc::clone(&hits);
        let added = std::sync::atomic::AtomicBool::new(false);
        let _keep = dep.on_changed(move || {
            if !added.swap(true, Ordering::SeqCst) {
                let hits = Arc::clone(&hits);
                let _keep = inner_dep.on_changed(move || {
                    hits.fetch_add(1, Ordering::SeqCst);
                });
            }
        });
    }

    dep.changed();
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    dep.changed();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
