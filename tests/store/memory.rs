//! CRUD behaviour of `MemoryCollection`.

use live_collection::{
    error::{LiveCollectionError, StoreError},
    patch::Modifier,
    query::{Query, Selector, SortDirection},
    store::{DocumentStore, MemoryCollection},
    types::{DocId, ObjectId},
};
use serde_json::{json, Value};

fn m(value: Value) -> Modifier {
    Modifier::from_value(value).expect("modifier")
}

fn seeded() -> MemoryCollection {
    let store = MemoryCollection::new("items");
    for (id, n) in [("a", 3), ("b", 1), ("c", 2)] {
        store.insert(json!({"_id": id, "n": n})).unwrap();
    }
    store
}

// ============================================================================
// insert
// ============================================================================

#[test]
fn insert_generates_a_string_id() {
    let store = MemoryCollection::new("items");
    let id = store.insert(json!({"n": 1})).unwrap();

    let DocId::Str(raw) = &id else {
        panic!("expected a string id, got {id:?}");
    };
    assert_eq!(raw.len(), 17);
    assert_eq!(store.find_one(&Selector::Id(id.clone())).unwrap().unwrap()["n"], json!(1));
}

#[test]
fn insert_puts_the_id_first() {
    let store = MemoryCollection::new("items");
    store.insert(json!({"n": 1, "_id": "x"})).unwrap();
    let doc = &store.all()[0];
    assert_eq!(doc.as_object().unwrap().keys().next().unwrap(), "_id");
}

#[test]
fn insert_accepts_object_ids() {
    let store = MemoryCollection::new("items");
    let oid = ObjectId::new();
    let id = store.insert(json!({"_id": oid.to_value()})).unwrap();
    assert_eq!(id, DocId::Oid(oid));
}

#[test]
fn insert_rejects_duplicates_and_bad_ids() {
    let store = seeded();
    let err = store.insert(json!({"_id": "a"})).unwrap_err();
    assert!(matches!(err, LiveCollectionError::Store(StoreError::DuplicateId { .. })));

    let err = store.insert(json!({"_id": 7})).unwrap_err();
    assert!(matches!(err, LiveCollectionError::Store(StoreError::InvalidDocument(_))));

    let err = store.insert(json!([1, 2])).unwrap_err();
    assert!(matches!(err, LiveCollectionError::Store(StoreError::InvalidDocument(_))));
    assert_eq!(store.len(), 3);
}

// ============================================================================
// find / update / remove
// ============================================================================

#[test]
fn find_honours_sort_and_window() {
    let store = seeded();
    let docs = store
        .find(&Query::all().sort_by("n", SortDirection::Asc).offset(1).limit(1))
        .unwrap();
    assert_eq!(docs, vec![json!({"_id": "c", "n": 2})]);
}

#[test]
fn update_touches_only_the_first_match() {
    let store = seeded();
    let affected = store
        .update(&Selector::Filter(json!({"n": {"$gte": 1}})), &m(json!({"$inc": {"n": 10}})))
        .unwrap();

    assert_eq!(affected, 1);
    let ns: Vec<_> = store.all().iter().map(|d| d["n"].clone()).collect();
    assert_eq!(ns, vec![json!(13), json!(1), json!(2)]);
}

#[test]
fn update_without_match_affects_nothing() {
    let store = seeded();
    assert_eq!(store.update(&Selector::from("zzz"), &m(json!({"$set": {"n": 0}}))).unwrap(), 0);
}

#[test]
fn failed_update_leaves_the_document_alone() {
    let store = seeded();
    let err = store
        .update(&Selector::from("a"), &m(json!({"$set": {"n.deep": 1}})))
        .unwrap_err();
    assert!(matches!(err, LiveCollectionError::Store(StoreError::CannotCreateField { .. })));
    assert_eq!(store.find_one(&Selector::from("a")).unwrap().unwrap()["n"], json!(3));
}

#[test]
fn inc_beyond_the_integer_range_does_not_fail() {
    let store = MemoryCollection::new("counters");
    store.insert(json!({"_id": "big", "n": i64::MAX})).unwrap();

    let affected = store
        .update(&Selector::from("big"), &m(json!({"$inc": {"n": 1}})))
        .unwrap();

    assert_eq!(affected, 1);
    let n = &store.find_one(&Selector::from("big")).unwrap().unwrap()["n"];
    assert!(n.is_f64(), "{n}");
}

#[test]
fn update_by_id_skips_earlier_documents() {
    let store = seeded();
    store.update(&Selector::from("c"), &m(json!({"$set": {"hit": true}}))).unwrap();
    let hits: Vec<_> = store.all().iter().map(|d| d.get("hit").is_some()).collect();
    assert_eq!(hits, vec![false, false, true]);
}

#[test]
fn remove_by_filter_removes_every_match() {
    let store = seeded();
    let removed = store
        .remove(&Selector::Filter(json!({"n": {"$lt": 3}})))
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(store.all(), vec![json!({"_id": "a", "n": 3})]);
}

#[test]
fn bad_filters_are_reported() {
    let store = seeded();
    assert!(store.remove(&Selector::Filter(json!({"$where": "1"}))).is_err());
    assert_eq!(store.len(), 3);
}
