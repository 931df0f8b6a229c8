use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Characters used for generated string ids (no look-alike glyphs).
const UNMISTAKABLE_CHARS: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTWXYZabcdefghijkmnopqrstuvwxyz";

/// Length of generated string ids.
const RANDOM_ID_LEN: usize = 17;

/// Field holding a document's identity.
pub const ID_FIELD: &str = "_id";

// ============================================================================
// ObjectId
// ============================================================================

/// A 12-byte object id, kept as 24 lowercase hex characters.
///
/// Serialized in its EJSON form `{"$oid": "<hex>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectId {
    #[serde(rename = "$oid")]
    hex: String,
}

impl ObjectId {
    /// Generate a fresh random object id.
    pub fn new() -> Self {
        let raw = Uuid::new_v4().simple().to_string();
        Self {
            hex: raw[..24].to_string(),
        }
    }

    /// Parse 24 hex characters. Returns `None` for anything else.
    pub fn parse(hex: &str) -> Option<Self> {
        if hex.len() == 24 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            Some(Self {
                hex: hex.to_ascii_lowercase(),
            })
        } else {
            None
        }
    }

    pub fn to_hex(&self) -> &str {
        &self.hex
    }

    /// EJSON representation.
    pub fn to_value(&self) -> Value {
        let mut m = Map::new();
        m.insert("$oid".to_string(), Value::String(self.hex.clone()));
        Value::Object(m)
    }

    /// Read an EJSON `{"$oid": ...}` object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if obj.len() != 1 {
            return None;
        }
        Self::parse(obj.get("$oid")?.as_str()?)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectID(\"{}\")", self.hex)
    }
}

// ============================================================================
// DocId
// ============================================================================

/// Identity of a document: either a plain string or an [`ObjectId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocId {
    Str(String),
    Oid(ObjectId),
}

impl DocId {
    /// Interpret a JSON value as an id. Only strings and `$oid` objects qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Str(s.clone())),
            Value::Object(_) => ObjectId::from_value(value).map(Self::Oid),
            _ => None,
        }
    }

    /// The id stored in a document's `_id` field, if it has a valid one.
    pub fn of_document(doc: &Value) -> Option<Self> {
        doc.get(ID_FIELD).and_then(Self::from_value)
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Str(s) => Value::String(s.clone()),
            Self::Oid(oid) => oid.to_value(),
        }
    }

    /// Stable map key; string and object ids never collide.
    pub fn key(&self) -> String {
        match self {
            Self::Str(s) => format!("s:{s}"),
            Self::Oid(oid) => format!("o:{}", oid.to_hex()),
        }
    }

    /// Generate a fresh random string id.
    pub fn random() -> Self {
        let mut bytes = Vec::with_capacity(32);
        bytes.extend_from_slice(Uuid::new_v4().as_bytes());
        bytes.extend_from_slice(Uuid::new_v4().as_bytes());
        let id: String = bytes
            .iter()
            .take(RANDOM_ID_LEN)
            .map(|b| UNMISTAKABLE_CHARS[*b as usize % UNMISTAKABLE_CHARS.len()] as char)
            .collect();
        Self::Str(id)
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Oid(oid) => oid.fmt(f),
        }
    }
}

impl From<&str> for DocId {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for DocId {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<ObjectId> for DocId {
    fn from(oid: ObjectId) -> Self {
        Self::Oid(oid)
    }
}

// ============================================================================
// Save / remove outcomes
// ============================================================================

/// What happened to a document during `save` or `remove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Inserted,
    Updated,
    Removed,
}

/// Per-document outcome of a save or remove call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocAction {
    #[serde(rename = "_id")]
    pub id: DocId,
    pub action: Action,
}

impl DocAction {
    pub fn new(id: DocId, action: Action) -> Self {
        Self { id, action }
    }
}
