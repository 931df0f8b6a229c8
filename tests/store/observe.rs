//! Cursor observation on `MemoryCollection`.

use std::sync::{Arc, Mutex, Weak};

use live_collection::{
    patch::Modifier,
    query::{Query, Selector, SortDirection},
    sequence::SequenceObserver,
    store::{DocumentStore, MemoryCollection},
};
use serde_json::{json, Value};

/// Records every callback as a short string.
#[derive(Default)]
struct Log {
    events: Mutex<Vec<String>>,
}

impl Log {
    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl SequenceObserver for Log {
    fn added_at(&self, doc: &Value, index: usize) {
        self.events.lock().unwrap().push(format!("added {} @{index}", doc["_id"]));
    }
    fn changed_at(&self, doc: &Value, _old: &Value, index: usize) {
        self.events.lock().unwrap().push(format!("changed {} @{index}", doc["_id"]));
    }
    fn moved_to(&self, doc: &Value, from: usize, to: usize) {
        self.events.lock().unwrap().push(format!("moved {} {from}->{to}", doc["_id"]));
    }
    fn removed_at(&self, doc: &Value, index: usize) {
        self.events.lock().unwrap().push(format!("removed {} @{index}", doc["_id"]));
    }
}

fn set(value: Value) -> Modifier {
    Modifier::from_value(json!({ "$set": value })).unwrap()
}

#[test]
fn initial_results_arrive_as_additions() {
    let store = MemoryCollection::new("obs");
    store.insert(json!({"_id": "a"})).unwrap();
    store.insert(json!({"_id": "b"})).unwrap();

    let log = Arc::new(Log::default());
    let _handle = store.observe(Query::all(), log.clone()).unwrap();

    assert_eq!(log.take(), vec![r#"added "a" @0"#, r#"added "b" @1"#]);
}

#[test]
fn writes_are_reported_in_cursor_terms() {
    let store = MemoryCollection::new("obs");
    for (id, rank) in [("a", 1), ("b", 2)] {
        store.insert(json!({"_id": id, "rank": rank})).unwrap();
    }
    let log = Arc::new(Log::default());
    let _handle = store
        .observe(Query::all().sort_by("rank", SortDirection::Asc), log.clone())
        .unwrap();
    log.take();

    store.insert(json!({"_id": "c", "rank": 0})).unwrap();
    assert_eq!(log.take(), vec![r#"added "c" @0"#]);

    store.update(&Selector::from("c"), &set(json!({"rank": 5}))).unwrap();
    assert_eq!(
        log.take(),
        vec![r#"moved "a" 1->0"#, r#"moved "b" 2->1"#, r#"changed "c" @2"#]
    );

    store.remove(&Selector::from("a")).unwrap();
    assert_eq!(log.take(), vec![r#"removed "a" @0"#]);
}

#[test]
fn writes_outside_the_cursor_are_silent() {
    let store = MemoryCollection::new("obs");
    let log = Arc::new(Log::default());
    let _handle = store
        .observe(Query::new(Selector::Filter(json!({"kind": "x"}))), log.clone())
        .unwrap();

    store.insert(json!({"_id": "y", "kind": "y"})).unwrap();
    assert!(log.take().is_empty());
}

#[test]
fn stopped_handles_hear_nothing() {
    let store = MemoryCollection::new("obs");
    let log = Arc::new(Log::default());
    let mut handle = store.observe(Query::all(), log.clone()).unwrap();

    handle.stop();
    handle.stop();
    assert!(handle.is_stopped());
    assert_eq!(store.observer_count(), 0);

    store.insert(json!({"_id": "late"})).unwrap();
    assert!(log.take().is_empty());
}

#[test]
fn dropping_the_handle_stops_observation() {
    let store = MemoryCollection::new("obs");
    let log = Arc::new(Log::default());
    drop(store.observe(Query::all(), log.clone()).unwrap());

    store.insert(json!({"_id": "late"})).unwrap();
    assert!(log.take().is_empty());
}

// ============================================================================
// Re-entrancy
// ============================================================================

/// Inserts a follow-up document the first time it sees `trigger`.
struct Echo {
    store: Weak<MemoryCollection>,
    seen: Mutex<Vec<String>>,
}

impl SequenceObserver for Echo {
    fn added_at(&self, doc: &Value, _index: usize) {
        let id = doc["_id"].as_str().unwrap_or_default().to_string();
        self.seen.lock().unwrap().push(id.clone());
        if id == "trigger" {
            if let Some(store) = self.store.upgrade() {
                store.insert(json!({"_id": "echo"})).unwrap();
            }
        }
    }
}

#[test]
fn observers_may_write_back_into_the_store() {
    let store = Arc::new(MemoryCollection::new("obs"));
    let echo = Arc::new(Echo {
        store: Arc::downgrade(&store),
        seen: Mutex::new(Vec::new()),
    });
    let _handle = store.observe(Query::all(), echo.clone()).unwrap();

    store.insert(json!({"_id": "trigger"})).unwrap();

    assert_eq!(*echo.seen.lock().unwrap(), vec!["trigger", "echo"]);
    assert_eq!(store.len(), 2);
}

struct Panics;

impl SequenceObserver for Panics {
    fn added_at(&self, _doc: &Value, _index: usize) {
        panic!("observer bug");
    }
}

#[test]
fn a_panicking_observer_does_not_starve_others() {
    let store = MemoryCollection::new("obs");
    let _bad = store.observe(Query::all(), Arc::new(Panics)).unwrap();
    let log = Arc::new(Log::default());
    let _good = store.observe(Query::all(), log.clone()).unwrap();

    store.insert(json!({"_id": "z"})).unwrap();
    assert_eq!(log.take(), vec![r#"added "z" @0"#]);
}
