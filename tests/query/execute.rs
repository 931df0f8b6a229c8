use live_collection::query::{execute_query, Query, Selector, SortDirection};
use live_collection::types::ObjectId;
use serde_json::{json, Value};

fn people() -> Vec<Value> {
    vec![
        json!({"_id": "p1", "name": "Ada", "age": 36, "tags": ["math"]}),
        json!({"_id": "p2", "name": "Grace", "age": 45, "tags": ["navy", "cobol"]}),
        json!({"_id": "p3", "name": "Linus", "age": 21}),
        json!({"_id": "p4", "name": "Barbara", "age": 45, "address": {"city": "Boston"}}),
    ]
}

fn ids(docs: &[Value]) -> Vec<&str> {
    docs.iter().filter_map(|d| d["_id"].as_str()).collect()
}

// ============================================================================
// Selectors
// ============================================================================

#[test]
fn selects_by_id() {
    let docs = people();
    let out = execute_query(&docs, &Query::new("p3")).unwrap();
    assert_eq!(ids(&out), vec!["p3"]);
}

#[test]
fn selects_by_object_id() {
    let oid = ObjectId::new();
    let docs = vec![json!({"_id": oid.to_value()}), json!({"_id": "plain"})];
    let out = execute_query(&docs, &Query::new(oid.clone())).unwrap();
    assert_eq!(out, vec![json!({"_id": oid.to_value()})]);
}

#[test]
fn filters_with_operators_and_paths() {
    let docs = people();
    let query = Query::new(Selector::Filter(json!({
        "$or": [{"age": {"$lt": 30}}, {"address.city": "Boston"}],
    })));
    assert_eq!(ids(&execute_query(&docs, &query).unwrap()), vec!["p3", "p4"]);
}

#[test]
fn array_fields_match_any_element() {
    let docs = people();
    let query = Query::new(Selector::Filter(json!({"tags": "cobol"})));
    assert_eq!(ids(&execute_query(&docs, &query).unwrap()), vec!["p2"]);
}

#[test]
fn exists_checks_presence() {
    let docs = people();
    let query = Query::new(Selector::Filter(json!({"tags": {"$exists": false}})));
    assert_eq!(ids(&execute_query(&docs, &query).unwrap()), vec!["p3", "p4"]);
}

// ============================================================================
// Sort and window
// ============================================================================

#[test]
fn sorts_by_several_keys() {
    let docs = people();
    let query = Query::all()
        .sort_by("age", SortDirection::Desc)
        .sort_by("name", SortDirection::Asc);
    assert_eq!(ids(&execute_query(&docs, &query).unwrap()), vec!["p4", "p2", "p1", "p3"]);
}

#[test]
fn equal_keys_keep_insertion_order() {
    let docs = people();
    let query = Query::all().sort_by("age", SortDirection::Desc);
    assert_eq!(ids(&execute_query(&docs, &query).unwrap())[..2], ["p2", "p4"]);
}

#[test]
fn offset_and_limit_apply_after_sorting() {
    let docs = people();
    let query = Query::all().sort_by("age", SortDirection::Asc).offset(1).limit(2);
    assert_eq!(ids(&execute_query(&docs, &query).unwrap()), vec!["p1", "p2"]);
}

#[test]
fn unknown_operators_fail_the_query() {
    let docs = people();
    let query = Query::new(Selector::Filter(json!({"age": {"$near": 3}})));
    assert!(execute_query(&docs, &query).is_err());
}
