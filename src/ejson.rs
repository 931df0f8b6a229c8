//! Extended-JSON atoms and UI metadata stripping.
//!
//! Dates (`{"$date": <ms>}`) and object ids (`{"$oid": "<hex>"}`) are single-key
//! objects that behave as scalars: the diff engine never descends into them and
//! `$$`-stripping leaves them intact.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::types::ObjectId;

const DATE_KEY: &str = "$date";
const OID_KEY: &str = "$oid";

/// Prefix of keys injected by the UI layer (e.g. `$$hashKey`).
pub const HASH_KEY_PREFIX: &str = "$$";

/// Encode a timestamp as an EJSON date.
pub fn date(at: DateTime<Utc>) -> Value {
    let mut m = Map::new();
    m.insert(DATE_KEY.to_string(), Value::from(at.timestamp_millis()));
    Value::Object(m)
}

/// Decode an EJSON date.
pub fn as_date(value: &Value) -> Option<DateTime<Utc>> {
    let obj = value.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    let ms = obj.get(DATE_KEY)?.as_i64()?;
    Utc.timestamp_millis_opt(ms).single()
}

/// True for scalars and EJSON atoms: values compared and copied as a whole.
pub fn is_atomic(value: &Value) -> bool {
    match value.as_object() {
        Some(obj) if obj.len() == 1 => {
            as_date(value).is_some()
                || (obj.contains_key(OID_KEY) && ObjectId::from_value(value).is_some())
        }
        Some(_) => false,
        None => !value.is_array(),
    }
}

/// True for a plain (non-atomic) JSON object.
pub fn is_plain_object(value: &Value) -> bool {
    value.is_object() && !is_atomic(value)
}

pub fn is_hash_key(key: &str) -> bool {
    key.starts_with(HASH_KEY_PREFIX)
}

/// Copy of `value` with every `$$`-prefixed key removed at any depth.
pub fn strip_hash_keys(value: &Value) -> Value {
    match value {
        Value::Object(obj) if !is_atomic(value) => Value::Object(
            obj.iter()
                .filter(|(k, _)| !is_hash_key(k))
                .map(|(k, v)| (k.clone(), strip_hash_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_hash_keys).collect()),
        other => other.clone(),
    }
}
