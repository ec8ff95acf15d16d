//! Docket Index Specification
//!
//! Declarative description of a secondary index and its validation. JSON
//! specs are checked against a closed set of properties before anything else
//! happens, so a malformed spec never touches collection data.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::types::{split_path, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use docket_common::{DocketError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

const SPEC_PROPERTIES: &[&str] = &["name", "fields"];
const FIELD_PROPERTIES: &[&str] = &["path", "datatype", "order"];
const DROP_OPTIONS: &[&str] = &["force"];

// =============================================================================
// Datatype
// =============================================================================

/// Declared type of an indexed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexDatatype {
    #[default]
    String,
    Number,
    Date,
    Timestamp,
}

impl IndexDatatype {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "string" | "varchar2" | "varchar" => Some(Self::String),
            "number" => Some(Self::Number),
            "date" => Some(Self::Date),
            "timestamp" => Some(Self::Timestamp),
            _ => None,
        }
    }

    /// Whether `value` can be keyed under this datatype.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::String, Value::String(_)) => true,
            (Self::Number, Value::Int(_)) => true,
            (Self::Number, Value::Float(f)) => !f.is_nan(),
            (Self::Date, Value::String(s)) => parse_date(s),
            (Self::Timestamp, Value::String(s)) => parse_timestamp(s),
            _ => false,
        }
    }
}

impl fmt::Display for IndexDatatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
        };
        write!(f, "{}", name)
    }
}

fn parse_date(s: &str) -> bool {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() || parse_timestamp(s)
}

fn parse_timestamp(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}

// =============================================================================
// Sort Order
// =============================================================================

/// Sort order of an indexed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::String(s) => match s.to_ascii_lowercase().as_str() {
                "asc" | "ascending" => Some(Self::Asc),
                "desc" | "descending" => Some(Self::Desc),
                _ => None,
            },
            JsonValue::Number(n) => match n.as_i64() {
                Some(1) => Some(Self::Asc),
                Some(-1) => Some(Self::Desc),
                _ => None,
            },
            _ => None,
        }
    }
}

// =============================================================================
// Index Field
// =============================================================================

/// One component of an index key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexField {
    pub path: String,
    #[serde(default)]
    pub datatype: IndexDatatype,
    #[serde(default)]
    pub order: SortOrder,
}

impl IndexField {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            datatype: IndexDatatype::default(),
            order: SortOrder::default(),
        }
    }

    pub fn datatype(mut self, datatype: IndexDatatype) -> Self {
        self.datatype = datatype;
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    fn from_json(position: usize, json: &JsonValue) -> Result<Self> {
        let obj = json.as_object().ok_or_else(|| {
            DocketError::InvalidIndexSpec(format!("fields[{}] must be an object", position))
        })?;

        if let Some(key) = obj.keys().find(|k| !FIELD_PROPERTIES.contains(&k.as_str())) {
            return Err(DocketError::InvalidProperty(key.clone()));
        }

        let path = match obj.get("path") {
            Some(JsonValue::String(p)) => p.clone(),
            Some(_) => {
                return Err(DocketError::InvalidIndexSpec(format!(
                    "fields[{}].path must be a string",
                    position
                )))
            }
            None => return Err(DocketError::MissingArgument(format!("fields[{}].path", position))),
        };

        let datatype = match obj.get("datatype") {
            None => IndexDatatype::default(),
            Some(JsonValue::String(s)) => IndexDatatype::parse(s).ok_or_else(|| {
                DocketError::InvalidIndexSpec(format!("unsupported datatype '{}'", s))
            })?,
            Some(_) => {
                return Err(DocketError::InvalidIndexSpec(format!(
                    "fields[{}].datatype must be a string",
                    position
                )))
            }
        };

        let order = match obj.get("order") {
            None => SortOrder::default(),
            Some(value) => SortOrder::from_json(value).ok_or_else(|| {
                DocketError::InvalidIndexSpec(format!("unsupported order {}", value))
            })?,
        };

        Ok(Self {
            path,
            datatype,
            order,
        })
    }
}

// =============================================================================
// Index Spec
// =============================================================================

/// Declarative description of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub fields: Vec<IndexField>,
}

impl IndexSpec {
    /// Start a typed spec; add fields with [`IndexSpec::field`].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: IndexField) -> Self {
        self.fields.push(field);
        self
    }

    /// Parse and validate a JSON index spec.
    ///
    /// Unknown properties are reported before any other problem.
    pub fn from_json(spec: Option<&JsonValue>) -> Result<Self> {
        let spec = spec.ok_or_else(|| DocketError::MissingArgument("indexSpec".to_string()))?;
        let obj = spec.as_object().ok_or_else(|| {
            DocketError::InvalidIndexSpec("index specification must be an object".to_string())
        })?;

        if let Some(key) = obj.keys().find(|k| !SPEC_PROPERTIES.contains(&k.as_str())) {
            return Err(DocketError::InvalidProperty(key.clone()));
        }
        if let Some(JsonValue::Array(items)) = obj.get("fields") {
            let unknown = items
                .iter()
                .filter_map(JsonValue::as_object)
                .flat_map(|field| field.keys())
                .find(|k| !FIELD_PROPERTIES.contains(&k.as_str()));
            if let Some(key) = unknown {
                return Err(DocketError::InvalidProperty(key.clone()));
            }
        }

        let name = match obj.get("name") {
            Some(JsonValue::String(name)) => name.clone(),
            Some(_) => {
                return Err(DocketError::InvalidIndexSpec(
                    "name must be a string".to_string(),
                ))
            }
            None => return Err(DocketError::MissingArgument("name".to_string())),
        };

        let fields = match obj.get("fields") {
            Some(JsonValue::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| IndexField::from_json(i, item))
                .collect::<Result<Vec<_>>>()?,
            Some(_) => {
                return Err(DocketError::InvalidIndexSpec(
                    "fields must be an array".to_string(),
                ))
            }
            None => return Err(DocketError::MissingArgument("fields".to_string())),
        };

        let spec = Self { name, fields };
        spec.validate()?;
        Ok(spec)
    }

    /// Semantic checks shared by JSON and typed specs.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DocketError::InvalidIndexSpec(
                "index name must not be empty".to_string(),
            ));
        }
        if self.fields.is_empty() {
            return Err(DocketError::InvalidIndexSpec(format!(
                "index '{}' must declare at least one field",
                self.name
            )));
        }
        for (i, field) in self.fields.iter().enumerate() {
            if split_path(&field.path).is_none() {
                return Err(DocketError::InvalidIndexSpec(format!(
                    "fields[{}].path '{}' is not a valid path",
                    i, field.path
                )));
            }
            if self.fields[..i].iter().any(|f| f.path == field.path) {
                return Err(DocketError::InvalidIndexSpec(format!(
                    "path '{}' appears more than once",
                    field.path
                )));
            }
        }
        Ok(())
    }

    /// Paths covered by this index, in key order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.path.as_str())
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

// =============================================================================
// Drop Options
// =============================================================================

/// Options accepted by `drop_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DropIndexOptions {
    /// Drop even when other objects depend on the index. Docket indexes have
    /// no dependents, so either value drops the same way.
    pub force: bool,
}

impl DropIndexOptions {
    pub fn from_json(options: Option<&JsonValue>) -> Result<Self> {
        let Some(options) = options else {
            return Ok(Self::default());
        };
        let obj = options.as_object().ok_or_else(|| {
            DocketError::InvalidIndexSpec("drop options must be an object".to_string())
        })?;

        if let Some(key) = obj.keys().find(|k| !DROP_OPTIONS.contains(&k.as_str())) {
            return Err(DocketError::InvalidProperty(key.clone()));
        }

        let force = match obj.get("force") {
            None => false,
            Some(JsonValue::Bool(force)) => *force,
            Some(other) => {
                return Err(DocketError::InvalidIndexSpec(format!(
                    "force must be a boolean, got {}",
                    other
                )))
            }
        };

        Ok(Self { force })
    }
}

// =============================================================================
// Tests
// =============================================================================
