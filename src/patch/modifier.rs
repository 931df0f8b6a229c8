//! Update modifiers: construction, application to a document, and the
//! `$pull` split used when a client diff is pushed to the store.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    ejson::is_plain_object,
    error::{Result, StoreError},
    query::operators::{deep_equals, is_operator, matches_filter},
    types::ID_FIELD,
};

// ============================================================================
// Modifier
// ============================================================================

/// A set of update operators, e.g. `{"$set": {"a.b": 1}, "$unset": {"c": true}}`,
/// or a replacement document when no key starts with `$`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Modifier(Map<String, Value>);

impl Modifier {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StoreError::InvalidModifier(format!("expected an object, got {other}")).into()),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Arguments of one operator, e.g. the object under `$set`.
    pub fn operator(&self, op: &str) -> Option<&Map<String, Value>> {
        self.0.get(op).and_then(Value::as_object)
    }

    pub fn set(&mut self, path: impl Into<String>, value: Value) {
        self.entry("$set").insert(path.into(), value);
    }

    pub fn unset(&mut self, path: impl Into<String>) {
        self.entry("$unset").insert(path.into(), Value::Bool(true));
    }

    pub fn pull(&mut self, path: impl Into<String>, value: Value) {
        self.entry("$pull").insert(path.into(), value);
    }

    fn entry(&mut self, op: &str) -> &mut Map<String, Value> {
        let slot = self
            .0
            .entry(op.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        match slot {
            Value::Object(map) => map,
            _ => unreachable!("slot was just made an object"),
        }
    }

    /// True when this is a whole-document replacement rather than operators.
    pub fn is_replacement(&self) -> bool {
        !self.0.keys().any(|k| k.starts_with('$'))
    }
}

impl From<Map<String, Value>> for Modifier {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

// ============================================================================
// Splitting
// ============================================================================

/// Split `$pull` away from the other operators.
///
/// The first entry carries every operator except `$pull` (omitted when there
/// are none); each pulled field then gets its own `{"$pull": {field: value}}`.
/// A store applies `$unset` on array elements by nulling them, so the pulls
/// must run after the setters rather than inside the same update.
pub fn split_pulls(modifier: &Modifier) -> Vec<Modifier> {
    let setters: Map<String, Value> = modifier
        .0
        .iter()
        .filter(|(op, _)| op.as_str() != "$pull")
        .map(|(op, args)| (op.clone(), args.clone()))
        .collect();

    let mut updates = Vec::new();
    if !setters.is_empty() {
        updates.push(Modifier(setters));
    }
    if let Some(pulls) = modifier.operator("$pull") {
        for (field, value) in pulls {
            let mut puller = Modifier::new();
            puller.pull(field.clone(), value.clone());
            updates.push(puller);
        }
    }
    updates
}

// ============================================================================
// Application
// ============================================================================

/// Apply `modifier` to `doc` in place. `collection` only feeds error messages.
///
/// Errors leave `doc` partially modified; callers apply to a copy.
pub fn apply_modifier(doc: &mut Value, modifier: &Modifier, collection: &str) -> Result<()> {
    if modifier.is_replacement() {
        return replace_document(doc, modifier, collection);
    }
    if modifier.0.keys().any(|k| !k.starts_with('$')) {
        return Err(StoreError::InvalidModifier(
            "cannot mix update operators with replacement fields".into(),
        )
        .into());
    }

    for (op, args) in &modifier.0 {
        let args = args.as_object().ok_or_else(|| {
            StoreError::InvalidModifier(format!("{op} expects an object argument"))
        })?;
        for (path, arg) in args {
            guard_id(doc, path, op, arg, collection)?;
            match op.as_str() {
                "$set" => set_path(doc, path, arg.clone())?,
                "$unset" => unset_path(doc, path),
                "$inc" => apply_inc(doc, path, arg)?,
                "$push" => apply_push(doc, path, arg, false)?,
                "$addToSet" => apply_push(doc, path, arg, true)?,
                "$pull" => apply_pull(doc, path, arg)?,
                other => return Err(StoreError::UnknownOperator(other.to_string()).into()),
            }
        }
    }
    Ok(())
}

fn replace_document(doc: &mut Value, modifier: &Modifier, collection: &str) -> Result<()> {
    let current_id = doc.get(ID_FIELD).cloned();
    let mut replacement = modifier.0.clone();
    match (replacement.get(ID_FIELD), &current_id) {
        (Some(new_id), Some(old_id)) if !deep_equals(new_id, old_id) => {
            return Err(StoreError::ImmutableId {
                collection: collection.to_string(),
            }
            .into());
        }
        _ => {}
    }
    let mut out = Map::new();
    if let Some(id) = current_id {
        out.insert(ID_FIELD.to_string(), id);
    }
    replacement.remove(ID_FIELD);
    out.extend(replacement);
    *doc = Value::Object(out);
    Ok(())
}

/// `_id` may only be "set" to its current value.
fn guard_id(doc: &Value, path: &str, op: &str, arg: &Value, collection: &str) -> Result<()> {
    let touches_id = path == ID_FIELD || path.starts_with("_id.");
    if !touches_id {
        return Ok(());
    }
    let unchanged = op == "$set" && path == ID_FIELD && doc.get(ID_FIELD).is_some_and(|id| deep_equals(id, arg));
    if unchanged {
        Ok(())
    } else {
        Err(StoreError::ImmutableId {
            collection: collection.to_string(),
        }
        .into())
    }
}

// ============================================================================
// Path helpers
// ============================================================================

fn cannot_create(path: &str) -> crate::error::LiveCollectionError {
    StoreError::CannotCreateField {
        path: path.to_string(),
    }
    .into()
}

/// Walk to the container holding the last segment of `path`, creating
/// intermediate objects on the way.
fn container_for<'a>(doc: &'a mut Value, path: &str) -> Result<(&'a mut Value, String)> {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = segments.pop().unwrap_or_default().to_string();
    let mut current = doc;
    for seg in segments {
        current = match current {
            Value::Object(obj) => obj
                .entry(seg.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(items) => {
                let idx: usize = seg.parse().map_err(|_| cannot_create(path))?;
                if idx >= items.len() {
                    items.resize(idx, Value::Null);
                    items.push(Value::Object(Map::new()));
                }
                &mut items[idx]
            }
            _ => return Err(cannot_create(path)),
        };
        if !is_container(current) {
            return Err(cannot_create(path));
        }
    }
    Ok((current, last))
}

fn is_container(value: &Value) -> bool {
    value.is_array() || is_plain_object(value)
}

/// Set the value at a dot path. Array indices past the end pad with `null`.
pub fn set_path(doc: &mut Value, path: &str, value: Value) -> Result<()> {
    let (parent, last) = container_for(doc, path)?;
    match parent {
        Value::Object(obj) => {
            obj.insert(last, value);
            Ok(())
        }
        Value::Array(items) => {
            let idx: usize = last.parse().map_err(|_| cannot_create(path))?;
            if idx >= items.len() {
                items.resize(idx + 1, Value::Null);
            }
            items[idx] = value;
            Ok(())
        }
        _ => Err(cannot_create(path)),
    }
}

/// Remove the value at a dot path. Array elements become `null`; missing
/// paths are ignored.
pub fn unset_path(doc: &mut Value, path: &str) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(last) = segments.pop() else {
        return;
    };
    let mut current = doc;
    for seg in segments {
        let next = match current {
            Value::Object(obj) => obj.get_mut(seg),
            Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return,
        }
    }
    match current {
        Value::Object(obj) => {
            obj.remove(last);
        }
        Value::Array(items) => {
            if let Some(slot) = last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                *slot = Value::Null;
            }
        }
        _ => {}
    }
}

fn get_path_mut<'a>(doc: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = doc;
    for seg in path.split('.') {
        current = match current {
            Value::Object(obj) => obj.get_mut(seg)?,
            Value::Array(items) => items.get_mut(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

// ============================================================================
// Operators
// ============================================================================

fn apply_inc(doc: &mut Value, path: &str, amount: &Value) -> Result<()> {
    let delta = amount
        .as_f64()
        .ok_or_else(|| StoreError::InvalidModifier(format!("$inc of \"{path}\" needs a number")))?;
    match get_path_mut(doc, path) {
        None => set_path(doc, path, amount.clone()),
        Some(current) => {
            // Integers stay integers unless the sum leaves i64.
            let int_sum = match (current.as_i64(), amount.as_i64()) {
                (Some(a), Some(b)) => a.checked_add(b),
                _ => None,
            };
            let sum = match int_sum {
                Some(n) => Value::from(n),
                None => {
                    let base = current.as_f64().ok_or_else(|| {
                        StoreError::InvalidModifier(format!("cannot $inc non-number \"{path}\""))
                    })?;
                    serde_json::Number::from_f64(base + delta)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
            };
            *current = sum;
            Ok(())
        }
    }
}

fn apply_push(doc: &mut Value, path: &str, arg: &Value, unique: bool) -> Result<()> {
    let items: Vec<Value> = match arg.as_object().and_then(|o| o.get("$each")) {
        Some(Value::Array(each)) => each.clone(),
        Some(_) => {
            return Err(StoreError::InvalidModifier("$each expects an array".into()).into());
        }
        None => vec![arg.clone()],
    };
    match get_path_mut(doc, path) {
        None => {
            let mut fresh: Vec<Value> = Vec::new();
            for item in items {
                if !unique || !fresh.iter().any(|v| deep_equals(v, &item)) {
                    fresh.push(item);
                }
            }
            set_path(doc, path, Value::Array(fresh))
        }
        Some(Value::Array(existing)) => {
            for item in items {
                if !unique || !existing.iter().any(|v| deep_equals(v, &item)) {
                    existing.push(item);
                }
            }
            Ok(())
        }
        Some(_) => Err(StoreError::InvalidModifier(format!("cannot push to non-array \"{path}\"")).into()),
    }
}

fn apply_pull(doc: &mut Value, path: &str, condition: &Value) -> Result<()> {
    let items = match get_path_mut(doc, path) {
        None => return Ok(()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(StoreError::InvalidModifier(format!("cannot pull from non-array \"{path}\"")).into());
        }
    };
    let mut kept = Vec::with_capacity(items.len());
    for item in items.drain(..) {
        if !pull_matches(&item, condition)? {
            kept.push(item);
        }
    }
    *items = kept;
    Ok(())
}

fn pull_matches(item: &Value, condition: &Value) -> Result<bool> {
    if is_plain_object(condition) {
        if is_operator(condition) {
            let mut wrapped = Map::new();
            wrapped.insert("v".to_string(), item.clone());
            let mut filter = Map::new();
            filter.insert("v".to_string(), condition.clone());
            return matches_filter(&Value::Object(wrapped), &Value::Object(filter));
        }
        if item.is_object() {
            return matches_filter(item, condition);
        }
        return Ok(false);
    }
    Ok(deep_equals(item, condition))
}
