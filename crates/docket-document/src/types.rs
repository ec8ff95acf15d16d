//! Docket Document Types
//!
//! Core data types for document storage: the schemaless value tree, document
//! keys and the metadata the engine attaches to every stored document.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use chrono::{DateTime, Utc};
use docket_common::CommitSeq;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// Document Key
// =============================================================================

/// System-assigned unique identifier for a document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentKey(pub String);

impl DocumentKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Generate a fresh key: 32 upper-case hex characters.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DocumentKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DocumentKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// Value
// =============================================================================

/// A document value that can be any JSON-compatible type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// Scalars are the only values an index can key on.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Self::Array(_) | Self::Object(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Self::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Get a value at a path (e.g. `address.city` or `items[0].sku`).
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let segments = split_path(path)?;
        let mut current = self;
        for segment in segments {
            current = match current {
                Self::Object(obj) => obj.get(segment)?,
                Self::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Convert from serde_json::Value.
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => Self::String(s),
            JsonValue::Array(arr) => Self::Array(arr.into_iter().map(Self::from_json).collect()),
            JsonValue::Object(obj) => {
                Self::Object(obj.into_iter().map(|(k, v)| (k, Self::from_json(v))).collect())
            }
        }
    }

    /// Convert to serde_json::Value.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(n) => JsonValue::Number((*n).into()),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::String(s) => JsonValue::String(s.clone()),
            Self::Array(arr) => JsonValue::Array(arr.iter().map(|v| v.to_json()).collect()),
            Self::Object(obj) => {
                JsonValue::Object(obj.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
        }
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) | Self::Float(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }
}

/// Split a field path into segments. `a.b[2].c` becomes `a`, `b`, `2`, `c`.
/// Returns `None` for empty paths or empty segments.
pub fn split_path(path: &str) -> Option<Vec<&str>> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        let (name, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if name.is_empty() && (segments.is_empty() || rest.is_empty()) {
            return None;
        }
        if !name.is_empty() {
            segments.push(name);
        }
        while !rest.is_empty() {
            let close = rest.find(']')?;
            let index = &rest[1..close];
            if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            segments.push(index);
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return None;
            }
        }
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(arr: Vec<Value>) -> Self {
        Self::Array(arr)
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        Self::from_json(json)
    }
}

// =============================================================================
// Document
// =============================================================================

/// Engine-managed attributes of a stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub key: DocumentKey,
    /// Sequence of the commit that made the document visible;
    /// `CommitSeq::UNCOMMITTED` while staged.
    pub version: CommitSeq,
    pub created_at: DateTime<Utc>,
}

/// A document in the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub content: Value,
}

impl Document {
    /// Create a staged document with a fresh key. The content root must be
    /// an object.
    pub(crate) fn staged(content: Value) -> Self {
        Self {
            meta: DocumentMeta {
                key: DocumentKey::generate(),
                version: CommitSeq::UNCOMMITTED,
                created_at: Utc::now(),
            },
            content,
        }
    }

    pub fn key(&self) -> &DocumentKey {
        &self.meta.key
    }

    pub fn version(&self) -> CommitSeq {
        self.meta.version
    }

    /// Get a field value by path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.content.get_path(path)
    }

    /// Check if a field exists.
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// The content as JSON.
    pub fn content_json(&self) -> JsonValue {
        self.content.to_json()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_key() {
        let k1 = DocumentKey::generate();
        let k2 = DocumentKey::generate();
        assert_ne!(k1, k2);
        assert_eq!(k1.as_str().len(), 32);
        assert!(k1
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_value_types() {
        assert!(Value::Null.is_null());
        assert!(Value::Null.is_scalar());
        assert_eq!(Value::Int(42).as_f64(), Some(42.0));
        assert_eq!(Value::from("hello").as_str(), Some("hello"));
        assert!(!Value::Array(vec![]).is_scalar());
    }

    #[test]
    fn test_value_path() {
        let value = Value::from_json(json!({
            "address": { "city": "NYC" },
            "items": [ { "sku": "A1" }, { "sku": "B2" } ]
        }));

        assert_eq!(
            value.get_path("address.city").and_then(|v| v.as_str()),
            Some("NYC")
        );
        assert_eq!(
            value.get_path("items[1].sku").and_then(|v| v.as_str()),
            Some("B2")
        );
        assert_eq!(
            value.get_path("items.0.sku").and_then(|v| v.as_str()),
            Some("A1")
        );
        assert!(value.get_path("address.zip").is_none());
        assert!(value.get_path("items[7]").is_none());
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("office"), Some(vec!["office"]));
        assert_eq!(split_path("a.b[2].c"), Some(vec!["a", "b", "2", "c"]));
        assert_eq!(split_path("a[0][1]"), Some(vec!["a", "0", "1"]));
        assert_eq!(split_path(""), None);
        assert_eq!(split_path("a..b"), None);
        assert_eq!(split_path("a[x]"), None);
        assert_eq!(split_path("a[1"), None);
        assert_eq!(split_path("a[1]b"), None);
    }

    #[test]
    fn test_json_conversion() {
        let original = json!({ "id": 1001, "ratio": 0.5, "tags": ["x"], "none": null });
        let value = Value::from_json(original.clone());
        assert_eq!(value.get_path("id"), Some(&Value::Int(1001)));
        assert_eq!(value.to_json(), original);
    }

    #[test]
    fn test_document_serde() {
        let doc = Document::staged(Value::from_json(json!({ "name": "Gillian" })));
        let bytes = serde_json::to_vec(&doc).expect("serialize");
        let back: Document = serde_json::from_slice(&bytes).expect("deserialize");
        assert_eq!(back, doc);
        assert!(!back.version().is_committed());
    }
}
