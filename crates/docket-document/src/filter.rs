//! Docket Document Filter
//!
//! Filter expressions over document content. Filters are parsed from JSON
//! query-by-example objects: `{"office": "Shenzhen"}` is an equality test,
//! `{"age": {"$gte": 30}}` uses an operator, and `$and`, `$or`, `$not`
//! combine sub-expressions. `$regex` patterns are compiled once, when the
//! filter is parsed.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::types::{split_path, Document, Value};
use docket_common::{DocketError, Result};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

// =============================================================================
// Filter
// =============================================================================

/// A filter condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    Gt { field: String, value: Value },
    Gte { field: String, value: Value },
    Lt { field: String, value: Value },
    Lte { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    Nin { field: String, values: Vec<Value> },
    Exists { field: String, exists: bool },
    Like { field: String, pattern: String },
    StartsWith { field: String, value: String },
    Regex { field: String, pattern: Pattern },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// Parse a JSON filter expression.
    pub fn from_json(json: &JsonValue) -> Result<Self> {
        let obj = json.as_object().ok_or_else(|| {
            DocketError::InvalidFilter(format!("filter must be an object, got {}", json))
        })?;

        let mut filters = Vec::with_capacity(obj.len());
        for (key, value) in obj {
            match key.as_str() {
                "$and" => filters.push(Self::And(parse_list(key, value)?)),
                "$or" => filters.push(Self::Or(parse_list(key, value)?)),
                "$not" => filters.push(Self::Not(Box::new(Self::from_json(value)?))),
                op if op.starts_with('$') => {
                    return Err(DocketError::InvalidFilter(format!(
                        "unknown logical operator '{}'",
                        op
                    )))
                }
                path => filters.extend(parse_field(path, value)?),
            }
        }

        Ok(if filters.len() == 1 {
            filters.remove(0)
        } else {
            Self::And(filters)
        })
    }

    /// Check if a document matches this filter.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::Eq { field, value } => doc
                .get(field)
                .map(|v| values_equal(v, value))
                .unwrap_or(false),
            Self::Ne { field, value } => doc
                .get(field)
                .map(|v| !values_equal(v, value))
                .unwrap_or(true),
            Self::Gt { field, value } => doc
                .get(field)
                .map(|v| compare_values(v, value) == Some(Ordering::Greater))
                .unwrap_or(false),
            Self::Gte { field, value } => doc
                .get(field)
                .map(|v| {
                    matches!(
                        compare_values(v, value),
                        Some(Ordering::Greater | Ordering::Equal)
                    )
                })
                .unwrap_or(false),
            Self::Lt { field, value } => doc
                .get(field)
                .map(|v| compare_values(v, value) == Some(Ordering::Less))
                .unwrap_or(false),
            Self::Lte { field, value } => doc
                .get(field)
                .map(|v| {
                    matches!(
                        compare_values(v, value),
                        Some(Ordering::Less | Ordering::Equal)
                    )
                })
                .unwrap_or(false),
            Self::In { field, values } => doc
                .get(field)
                .map(|v| values.iter().any(|candidate| values_equal(v, candidate)))
                .unwrap_or(false),
            Self::Nin { field, values } => doc
                .get(field)
                .map(|v| !values.iter().any(|candidate| values_equal(v, candidate)))
                .unwrap_or(true),
            Self::Exists { field, exists } => doc.contains(field) == *exists,
            Self::Like { field, pattern } => match doc.get(field) {
                Some(Value::String(s)) => like(s, pattern),
                _ => false,
            },
            Self::StartsWith { field, value } => match doc.get(field) {
                Some(Value::String(s)) => s.starts_with(value.as_str()),
                _ => false,
            },
            Self::Regex { field, pattern } => match doc.get(field) {
                Some(Value::String(s)) => pattern.is_match(s),
                _ => false,
            },
            Self::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(doc)),
            Self::Not(filter) => !filter.matches(doc),
        }
    }

    /// Every path the filter reads, including nested sub-expressions.
    pub fn paths(&self) -> BTreeSet<&str> {
        let mut paths = BTreeSet::new();
        self.collect_paths(&mut paths);
        paths
    }

    fn collect_paths<'a>(&'a self, paths: &mut BTreeSet<&'a str>) {
        match self {
            Self::Eq { field, .. }
            | Self::Ne { field, .. }
            | Self::Gt { field, .. }
            | Self::Gte { field, .. }
            | Self::Lt { field, .. }
            | Self::Lte { field, .. }
            | Self::In { field, .. }
            | Self::Nin { field, .. }
            | Self::Exists { field, .. }
            | Self::Like { field, .. }
            | Self::StartsWith { field, .. }
            | Self::Regex { field, .. } => {
                paths.insert(field.as_str());
            }
            Self::And(filters) | Self::Or(filters) => {
                for filter in filters {
                    filter.collect_paths(paths);
                }
            }
            Self::Not(filter) => filter.collect_paths(paths),
        }
    }

    /// Equality predicates every matching document must satisfy: the
    /// `$eq` tests and wildcard-free `$like` tests reachable through
    /// top-level conjunctions.
    pub fn required_equalities(&self) -> Vec<(&str, &Value)> {
        let mut out = Vec::new();
        self.collect_equalities(&mut out);
        out
    }

    fn collect_equalities<'a>(&'a self, out: &mut Vec<(&'a str, &'a Value)>) {
        match self {
            Self::Eq { field, value } => out.push((field.as_str(), value)),
            Self::And(filters) => {
                for filter in filters {
                    filter.collect_equalities(out);
                }
            }
            _ => {}
        }
    }

    /// Wildcard-free `$like` tests behave as equality on strings.
    pub fn required_like_literals(&self) -> Vec<(&str, &str)> {
        match self {
            Self::Like { field, pattern } if !has_wildcards(pattern) => {
                vec![(field.as_str(), pattern.as_str())]
            }
            Self::And(filters) => filters
                .iter()
                .flat_map(|f| f.required_like_literals())
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn parse_list(op: &str, value: &JsonValue) -> Result<Vec<Filter>> {
    let items = value
        .as_array()
        .ok_or_else(|| DocketError::InvalidFilter(format!("{} expects an array", op)))?;
    if items.is_empty() {
        return Err(DocketError::InvalidFilter(format!(
            "{} expects at least one expression",
            op
        )));
    }
    items.iter().map(Filter::from_json).collect()
}

fn parse_field(path: &str, value: &JsonValue) -> Result<Vec<Filter>> {
    if split_path(path).is_none() {
        return Err(DocketError::InvalidFilter(format!(
            "'{}' is not a valid path",
            path
        )));
    }
    let field = path.to_string();

    let operators = match value {
        JsonValue::Object(obj) if !obj.is_empty() && obj.keys().any(|k| k.starts_with('$')) => {
            obj
        }
        literal => {
            return Ok(vec![Filter::Eq {
                field,
                value: Value::from_json(literal.clone()),
            }])
        }
    };

    let mut filters = Vec::with_capacity(operators.len());
    for (op, operand) in operators {
        let field = field.clone();
        let filter = match op.as_str() {
            "$eq" => Filter::Eq {
                field,
                value: Value::from_json(operand.clone()),
            },
            "$ne" => Filter::Ne {
                field,
                value: Value::from_json(operand.clone()),
            },
            "$gt" => Filter::Gt {
                field,
                value: Value::from_json(operand.clone()),
            },
            "$gte" => Filter::Gte {
                field,
                value: Value::from_json(operand.clone()),
            },
            "$lt" => Filter::Lt {
                field,
                value: Value::from_json(operand.clone()),
            },
            "$lte" => Filter::Lte {
                field,
                value: Value::from_json(operand.clone()),
            },
            "$in" => Filter::In {
                field,
                values: operand_array(op, operand)?,
            },
            "$nin" => Filter::Nin {
                field,
                values: operand_array(op, operand)?,
            },
            "$exists" => Filter::Exists {
                field,
                exists: operand.as_bool().ok_or_else(|| {
                    DocketError::InvalidFilter("$exists expects a boolean".to_string())
                })?,
            },
            "$like" => Filter::Like {
                field,
                pattern: operand_string(op, operand)?,
            },
            "$startsWith" => Filter::StartsWith {
                field,
                value: operand_string(op, operand)?,
            },
            "$regex" => Filter::Regex {
                field,
                pattern: Pattern::new(&operand_string(op, operand)?)?,
            },
            other if other.starts_with('$') => {
                return Err(DocketError::InvalidFilter(format!(
                    "unknown operator '{}'",
                    other
                )))
            }
            other => {
                return Err(DocketError::InvalidFilter(format!(
                    "'{}' mixes operators with plain fields",
                    other
                )))
            }
        };
        filters.push(filter);
    }
    Ok(filters)
}

fn operand_array(op: &str, operand: &JsonValue) -> Result<Vec<Value>> {
    operand
        .as_array()
        .map(|items| items.iter().cloned().map(Value::from_json).collect())
        .ok_or_else(|| DocketError::InvalidFilter(format!("{} expects an array", op)))
}

fn operand_string(op: &str, operand: &JsonValue) -> Result<String> {
    operand
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| DocketError::InvalidFilter(format!("{} expects a string", op)))
}

// =============================================================================
// Regex Pattern
// =============================================================================

/// Compiled program size limit for `$regex` operands (1 MB).
const REGEX_SIZE_LIMIT: usize = 1024 * 1024;

/// A compiled `$regex` operand. Two patterns are equal when their sources are.
#[derive(Clone)]
pub struct Pattern(regex::Regex);

impl Pattern {
    pub fn new(source: &str) -> Result<Self> {
        regex::RegexBuilder::new(source)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map(Self)
            .map_err(|e| {
                DocketError::InvalidFilter(format!("invalid $regex pattern '{}': {}", source, e))
            })
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.as_str())
    }
}

// =============================================================================
// Value Comparison
// =============================================================================

/// Equality with numeric comparison across integer and float values.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => *x as f64 == *y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .zip(y)
                    .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
        }
        _ => a == b,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

// =============================================================================
// LIKE Matching
// =============================================================================

pub(crate) fn has_wildcards(pattern: &str) -> bool {
    pattern.contains(['%', '_'])
}

/// SQL LIKE: `%` matches any run of characters, `_` exactly one.
pub fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0, 0);
    // Position of the last `%` seen and the text position it resumed from.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('%') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some('_') => {
                t += 1;
                p += 1;
            }
            Some(c) if *c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((star, resume)) => {
                    p = star + 1;
                    t = resume + 1;
                    backtrack = Some((star, resume + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '%')
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use docket_common::ErrorKind;
    use serde_json::json;

    fn create_test_doc() -> Document {
        Document::staged(Value::from_json(json!({
            "name": "Alice",
            "age": 30,
            "active": true,
            "email": "alice@example.com",
            "address": { "city": "London" }
        })))
    }

    fn parse(json: JsonValue) -> Filter {
        Filter::from_json(&json).expect("filter should parse")
    }

    #[test]
    fn test_literal_equality() {
        let doc = create_test_doc();
        assert!(parse(json!({ "name": "Alice" })).matches(&doc));
        assert!(!parse(json!({ "name": "Bob" })).matches(&doc));
        assert!(parse(json!({ "address.city": "London" })).matches(&doc));
        assert!(parse(json!({ "age": 30.0 })).matches(&doc));
        assert!(!parse(json!({ "missing": "x" })).matches(&doc));
    }

    #[test]
    fn test_comparison_operators() {
        let doc = create_test_doc();
        assert!(parse(json!({ "age": { "$gt": 25 } })).matches(&doc));
        assert!(!parse(json!({ "age": { "$lt": 25 } })).matches(&doc));
        assert!(parse(json!({ "age": { "$gte": 30, "$lte": 30 } })).matches(&doc));
        assert!(parse(json!({ "age": { "$ne": 31 } })).matches(&doc));
        assert!(parse(json!({ "missing": { "$ne": 1 } })).matches(&doc));
        assert!(!parse(json!({ "name": { "$gt": 5 } })).matches(&doc));
    }

    #[test]
    fn test_membership_and_existence() {
        let doc = create_test_doc();
        assert!(parse(json!({ "name": { "$in": ["Bob", "Alice"] } })).matches(&doc));
        assert!(parse(json!({ "name": { "$nin": ["Bob"] } })).matches(&doc));
        assert!(parse(json!({ "email": { "$exists": true } })).matches(&doc));
        assert!(parse(json!({ "phone": { "$exists": false } })).matches(&doc));
    }

    #[test]
    fn test_string_operators() {
        let doc = create_test_doc();
        assert!(parse(json!({ "name": { "$like": "Alice" } })).matches(&doc));
        assert!(!parse(json!({ "name": { "$like": "alice" } })).matches(&doc));
        assert!(parse(json!({ "email": { "$like": "%@example.com" } })).matches(&doc));
        assert!(parse(json!({ "name": { "$like": "Al_ce" } })).matches(&doc));
        assert!(parse(json!({ "email": { "$startsWith": "alice@" } })).matches(&doc));
        assert!(!parse(json!({ "age": { "$like": "30" } })).matches(&doc));
    }

    #[test]
    fn test_regex_operator() {
        let doc = create_test_doc();
        assert!(parse(json!({ "email": { "$regex": "^[a-z]+@example\\.com$" } })).matches(&doc));
        assert!(!parse(json!({ "name": { "$regex": "^B" } })).matches(&doc));
        assert!(!parse(json!({ "age": { "$regex": "3" } })).matches(&doc));

        let err = Filter::from_json(&json!({ "name": { "$regex": "(" } })).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFilter);

        // Oversized programs are refused rather than compiled.
        let err = Filter::from_json(&json!({ "name": { "$regex": "(\\w{1000}){1000}" } }))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFilter);
        assert_eq!(
            parse(json!({ "name": { "$regex": "^A" } })),
            parse(json!({ "name": { "$regex": "^A" } }))
        );
    }

    #[test]
    fn test_logical_operators() {
        let doc = create_test_doc();
        assert!(parse(json!({ "$and": [ { "name": "Alice" }, { "age": { "$gt": 20 } } ] }))
            .matches(&doc));
        assert!(parse(json!({ "$or": [ { "name": "Bob" }, { "active": true } ] })).matches(&doc));
        assert!(parse(json!({ "$not": { "name": "Bob" } })).matches(&doc));
        assert!(parse(json!({})).matches(&doc));
    }

    #[test]
    fn test_invalid_filters() {
        let cases = vec![
            json!("office"),
            json!({ "office": { "$regex": "[S" } }),
            json!({ "$nor": [] }),
            json!({ "$and": {} }),
            json!({ "office": { "$in": "Shenzhen" } }),
            json!({ "office": { "$like": 5 } }),
            json!({ "office": { "$eq": 1, "plain": 2 } }),
            json!({ "a..b": 1 }),
        ];
        for case in cases {
            let err = Filter::from_json(&case).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidFilter, "case {}", case);
        }
    }

    #[test]
    fn test_paths_and_equalities() {
        let filter = parse(json!({
            "office": "Shenzhen",
            "$or": [ { "name": "Changjie" }, { "age": { "$gt": 3 } } ],
            "dept": { "$like": "Sales" }
        }));

        let paths: Vec<&str> = filter.paths().into_iter().collect();
        assert_eq!(paths, vec!["age", "dept", "name", "office"]);

        let eqs = filter.required_equalities();
        assert_eq!(eqs, vec![("office", &Value::from("Shenzhen"))]);
        assert_eq!(filter.required_like_literals(), vec![("dept", "Sales")]);

        let wildcard = parse(json!({ "dept": { "$like": "Sal%" } }));
        assert!(wildcard.required_like_literals().is_empty());
    }

    #[test]
    fn test_like() {
        assert!(like("Shenzhen", "Shenzhen"));
        assert!(like("Shenzhen", "S%"));
        assert!(like("Shenzhen", "%zhen"));
        assert!(like("Shenzhen", "%en%en"));
        assert!(like("Shenzhen", "Sh_nzh_n"));
        assert!(like("", "%"));
        assert!(!like("", "_"));
        assert!(!like("Shenzhen", "Shenzhe"));
        assert!(!like("Shenzhen", "%x%"));
        assert!(like("San Francisco", "San%co"));
    }
}
