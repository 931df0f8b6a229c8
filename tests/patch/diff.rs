use live_collection::ejson::strip_hash_keys;
use live_collection::patch::{
    apply_modifier, deep_copy_changes, get_updates, split_pulls, DiffMode, Modifier,
};
use serde_json::{json, Value};

// ============================================================================
// Helpers
// ============================================================================

fn m(value: Value) -> Modifier {
    Modifier::from_value(value).expect("modifier")
}

/// Run the diff of `old -> new` through a store-style apply and check it
/// lands on `new` (minus `$$` keys).
fn assert_round_trip(old: Value, new: Value) {
    let updates = get_updates(&old, &new, DiffMode::Deep);
    let mut doc = old.clone();
    for update in split_pulls(&updates) {
        apply_modifier(&mut doc, &update, "diff").expect("apply");
    }
    assert_eq!(strip_hash_keys(&doc), strip_hash_keys(&new), "updates: {updates:?}");
}

// ============================================================================
// Update operators
// ============================================================================

#[test]
fn changed_scalar_is_set_by_path() {
    let updates = get_updates(
        &json!({"_id": 1, "a": {"b": 1, "c": 2}}),
        &json!({"_id": 1, "a": {"b": 5, "c": 2}}),
        DiffMode::Deep,
    );
    assert_eq!(updates, m(json!({"$set": {"a.b": 5}})));
}

#[test]
fn vanished_fields_are_unset() {
    let updates = get_updates(
        &json!({"a": 1, "b": {"c": 1, "d": 2}}),
        &json!({"b": {"c": 1}}),
        DiffMode::Deep,
    );
    assert_eq!(updates, m(json!({"$unset": {"b.d": true, "a": true}})));
}

#[test]
fn shrinking_array_unsets_and_pulls() {
    let updates = get_updates(
        &json!({"data": [1, 2, 3]}),
        &json!({"data": [1, 3]}),
        DiffMode::Deep,
    );
    assert_eq!(
        updates,
        m(json!({"$set": {"data.1": 3}, "$unset": {"data.2": true}, "$pull": {"data": null}}))
    );
}

#[test]
fn shrinking_array_with_nulls_is_replaced() {
    let updates = get_updates(
        &json!({"data": [1, null, 3]}),
        &json!({"data": [null, 3]}),
        DiffMode::Deep,
    );
    assert_eq!(updates, m(json!({"$set": {"data": [null, 3]}})));
}

#[test]
fn kind_change_sets_the_whole_field() {
    let updates = get_updates(&json!({"a": {"b": 1}}), &json!({"a": [1]}), DiffMode::Deep);
    assert_eq!(updates, m(json!({"$set": {"a": [1]}})));
}

#[test]
fn dates_are_compared_as_values() {
    let old = json!({"at": {"$date": 1000}});
    let new = json!({"at": {"$date": 2000}});
    assert_eq!(
        get_updates(&old, &new, DiffMode::Deep),
        m(json!({"$set": {"at": {"$date": 2000}}}))
    );
}

#[test]
fn shallow_mode_sets_top_level_fields() {
    let updates = get_updates(
        &json!({"a": {"b": 1, "c": 1}}),
        &json!({"a": {"b": 2, "c": 1}}),
        DiffMode::Shallow,
    );
    assert_eq!(updates, m(json!({"$set": {"a": {"b": 2, "c": 1}}})));
}

#[test]
fn new_values_are_stripped() {
    let updates = get_updates(
        &json!({}),
        &json!({"tags": [{"v": 1, "$$hashKey": "object:4"}]}),
        DiffMode::Deep,
    );
    assert_eq!(updates, m(json!({"$set": {"tags": [{"v": 1}]}})));
}

// ============================================================================
// Round trips through the store
// ============================================================================

#[test]
fn updates_reproduce_the_new_document() {
    let cases = [
        (json!({"a": 1}), json!({"a": 2})),
        (json!({"a": [1, 2, 3]}), json!({"a": [1, 3]})),
        (json!({"a": [1, 2, 3, 4]}), json!({"a": [4]})),
        (json!({"a": [{"b": 1}, {"b": 2}]}), json!({"a": [{"b": 2}]})),
        (json!({"a": [[1, 2], [3]]}), json!({"a": [[1], [3, 4]]})),
        (json!({"a": {"b": [1]}}), json!({"a": {"b": {"c": 1}}})),
        (json!({"a": null}), json!({"a": {"b": 1}})),
        (json!({"a": 1, "b": 2}), json!({"c": 3})),
        (json!({"a": [1, 2]}), json!({"a": [1, 2, {"c": [5]}]})),
    ];
    for (old, new) in cases {
        assert_round_trip(old, new);
    }
}

// ============================================================================
// deep_copy_changes
// ============================================================================

#[test]
fn deep_copy_keeps_hash_keys_at_every_level() {
    let mut target = json!({
        "$$hashKey": "object:1",
        "list": [{"v": 1, "$$hashKey": "object:2"}, {"v": 2}],
        "gone": true,
    });
    deep_copy_changes(&mut target, &json!({"list": [{"v": 9}], "fresh": 1}));
    assert_eq!(
        target,
        json!({"$$hashKey": "object:1", "list": [{"v": 9, "$$hashKey": "object:2"}], "fresh": 1})
    );
}

#[test]
fn deep_copy_extends_arrays() {
    let mut target = json!({"a": [1]});
    deep_copy_changes(&mut target, &json!({"a": [1, {"b": 2}]}));
    assert_eq!(target, json!({"a": [1, {"b": 2}]}));
}
