use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ejson::{is_hash_key, is_plain_object, strip_hash_keys};
use crate::query::operators::deep_equals;
use crate::types::ID_FIELD;

use super::modifier::Modifier;

const MAX_DIFF_DEPTH: usize = 100;

/// How far `get_updates` descends into changed fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffMode {
    /// Recurse into nested objects and arrays, emitting dot-path operators.
    #[default]
    Deep,
    /// Compare top-level fields only; a changed field is `$set` whole.
    Shallow,
}

// ============================================================================
// Public API
// ============================================================================

/// Compute the update operators that turn `old` into `new`.
///
/// `_id` and `$$`-prefixed keys are ignored on both sides. New fields are
/// `$set` whole, vanished fields are `$unset`, and a field whose kind changes
/// (null, primitive, object, array, EJSON atom) is `$set` whole so the store
/// never has to create a path inside a non-container. Array elements dropped
/// from the tail are `$unset` and then `$pull`ed as `null`.
pub fn get_updates(old: &Value, new: &Value, mode: DiffMode) -> Modifier {
    let mut updates = Modifier::new();
    let (Some(old_obj), Some(new_obj)) = (old.as_object(), new.as_object()) else {
        return updates;
    };

    for (key, new_val) in new_obj {
        if key == ID_FIELD || is_hash_key(key) {
            continue;
        }
        match old_obj.get(key) {
            None => updates.set(key.clone(), strip_hash_keys(new_val)),
            Some(old_val) => match mode {
                DiffMode::Deep => diff_value(key, old_val, new_val, &mut updates, 0),
                DiffMode::Shallow => {
                    let new_val = strip_hash_keys(new_val);
                    if !deep_equals(&strip_hash_keys(old_val), &new_val) {
                        updates.set(key.clone(), new_val);
                    }
                }
            },
        }
    }

    for key in old_obj.keys() {
        if key == ID_FIELD || is_hash_key(key) || new_obj.contains_key(key) {
            continue;
        }
        updates.unset(key.clone());
    }

    updates
}

/// Copy `source` into `target` in place.
///
/// Same-kind containers are updated recursively so `$$` keys attached to
/// `target` (at any depth) survive; keys missing from `source` are removed and
/// arrays are truncated or extended to `source`'s length.
pub fn deep_copy_changes(target: &mut Value, source: &Value) {
    if is_plain_object(target) && is_plain_object(source) {
        if let (Value::Object(t), Value::Object(s)) = (&mut *target, source) {
            t.retain(|k, _| is_hash_key(k) || s.contains_key(k));
            for (key, s_val) in s {
                match t.get_mut(key) {
                    Some(t_val) => deep_copy_changes(t_val, s_val),
                    None => {
                        t.insert(key.clone(), s_val.clone());
                    }
                }
            }
        }
        return;
    }

    if let (Value::Array(t), Value::Array(s)) = (&mut *target, source) {
        t.truncate(s.len());
        for (i, s_val) in s.iter().enumerate() {
            match t.get_mut(i) {
                Some(t_val) => deep_copy_changes(t_val, s_val),
                None => t.push(s_val.clone()),
            }
        }
        return;
    }

    if *target != *source {
        *target = source.clone();
    }
}

// ============================================================================
// Core diff logic
// ============================================================================

fn child_path(path: &str, key: &str) -> String {
    format!("{path}.{key}")
}

fn diff_value(path: &str, old_val: &Value, new_val: &Value, updates: &mut Modifier, depth: usize) {
    if depth > MAX_DIFF_DEPTH {
        if !deep_equals(old_val, new_val) {
            updates.set(path, strip_hash_keys(new_val));
        }
        return;
    }

    if is_plain_object(old_val) && is_plain_object(new_val) {
        if let (Value::Object(old_obj), Value::Object(new_obj)) = (old_val, new_val) {
            for (key, new_child) in new_obj {
                if is_hash_key(key) {
                    continue;
                }
                let path = child_path(path, key);
                match old_obj.get(key) {
                    None => updates.set(path, strip_hash_keys(new_child)),
                    Some(old_child) => diff_value(&path, old_child, new_child, updates, depth + 1),
                }
            }
            for key in old_obj.keys() {
                if !is_hash_key(key) && !new_obj.contains_key(key) {
                    updates.unset(child_path(path, key));
                }
            }
        }
        return;
    }

    if let (Value::Array(old_arr), Value::Array(new_arr)) = (old_val, new_val) {
        // Shrinking through `$unset` + `$pull: null` would also drop nulls the
        // new array keeps, so such arrays are replaced whole.
        if new_arr.len() < old_arr.len() && new_arr.iter().any(Value::is_null) {
            updates.set(path, strip_hash_keys(new_val));
            return;
        }
        for (i, new_child) in new_arr.iter().enumerate() {
            let path = child_path(path, &i.to_string());
            match old_arr.get(i) {
                Some(old_child) => diff_value(&path, old_child, new_child, updates, depth + 1),
                None => updates.set(path, strip_hash_keys(new_child)),
            }
        }
        if new_arr.len() < old_arr.len() {
            for i in new_arr.len()..old_arr.len() {
                updates.unset(child_path(path, &i.to_string()));
            }
            updates.pull(path, Value::Null);
        }
        return;
    }

    if !deep_equals(old_val, new_val) {
        updates.set(path, strip_hash_keys(new_val));
    }
}
