//! Docket Document Index
//!
//! Secondary index instances. An instance maps the tuple of a document's
//! indexed field values to the set of document keys holding that tuple,
//! ordered per field by the declared sort order.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::spec::{IndexDatatype, IndexSpec, SortOrder};
use crate::types::{Document, DocumentKey, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// Key Part
// =============================================================================

/// A single normalized field value inside an index key.
#[derive(Debug, Clone)]
pub enum KeyPart {
    String(String),
    Number(f64),
}

impl KeyPart {
    /// Normalize `value` under `datatype`, or `None` if the value cannot be
    /// keyed (absent, non-scalar, or the wrong type).
    pub fn from_value(value: &Value, datatype: IndexDatatype) -> Option<Self> {
        if !datatype.accepts(value) {
            return None;
        }
        match value {
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Int(n) => Some(Self::Number(*n as f64)),
            // -0.0 and 0.0 compare equal as filter literals.
            Value::Float(f) if *f == 0.0 => Some(Self::Number(0.0)),
            Value::Float(f) => Some(Self::Number(*f)),
            _ => None,
        }
    }
}

impl PartialEq for KeyPart {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyPart {}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Number(_), Self::String(_)) => Ordering::Less,
            (Self::String(_), Self::Number(_)) => Ordering::Greater,
        }
    }
}

// =============================================================================
// Index Key
// =============================================================================

/// One component of a composite key, carrying its field's sort order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct KeyComponent {
    part: KeyPart,
    order: SortOrder,
}

impl PartialOrd for KeyComponent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyComponent {
    fn cmp(&self, other: &Self) -> Ordering {
        let ordering = self.part.cmp(&other.part);
        match self.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

/// Composite index key. A shorter key sorts before every longer key it
/// prefixes, which makes prefix range scans possible.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexKey(Vec<KeyComponent>);

impl IndexKey {
    fn starts_with(&self, prefix: &IndexKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

// =============================================================================
// Index Instance
// =============================================================================

/// Runtime structure for one secondary index.
#[derive(Debug, Clone)]
pub struct IndexInstance {
    spec: IndexSpec,
    entries: BTreeMap<IndexKey, BTreeSet<DocumentKey>>,
    doc_count: usize,
}

impl IndexInstance {
    pub fn new(spec: IndexSpec) -> Self {
        Self {
            spec,
            entries: BTreeMap::new(),
            doc_count: 0,
        }
    }

    /// Build an index over `documents` in one pass.
    pub fn build<'a>(spec: IndexSpec, documents: impl IntoIterator<Item = &'a Document>) -> Self {
        let mut index = Self::new(spec);
        for doc in documents {
            index.insert(doc);
        }
        index
    }

    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Number of documents covered by the index.
    pub fn len(&self) -> usize {
        self.doc_count
    }

    pub fn is_empty(&self) -> bool {
        self.doc_count == 0
    }

    /// Number of distinct key tuples.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Compute the key of `doc`, or `None` if the document is not covered.
    pub fn key_for(&self, doc: &Document) -> Option<IndexKey> {
        self.spec
            .fields
            .iter()
            .map(|field| {
                let value = doc.get(&field.path)?;
                Some(KeyComponent {
                    part: KeyPart::from_value(value, field.datatype)?,
                    order: field.order,
                })
            })
            .collect::<Option<Vec<_>>>()
            .map(IndexKey)
    }

    /// Index a document. Returns false when the document is not covered or
    /// was already present.
    pub fn insert(&mut self, doc: &Document) -> bool {
        let Some(key) = self.key_for(doc) else {
            return false;
        };
        let added = self.entries.entry(key).or_default().insert(doc.key().clone());
        if added {
            self.doc_count += 1;
        }
        added
    }

    /// Remove a document. Returns false when it was not indexed.
    pub fn remove(&mut self, doc: &Document) -> bool {
        let Some(key) = self.key_for(doc) else {
            return false;
        };
        let Some(keys) = self.entries.get_mut(&key) else {
            return false;
        };
        let removed = keys.remove(doc.key());
        if keys.is_empty() {
            self.entries.remove(&key);
        }
        if removed {
            self.doc_count -= 1;
        }
        removed
    }

    /// Document keys whose indexed values equal the constraints, in index
    /// order. `constraints[i]` constrains field `i`; `None` leaves it free.
    pub fn lookup(&self, constraints: &[Option<KeyPart>]) -> Vec<DocumentKey> {
        let components: Vec<Option<KeyComponent>> = self
            .spec
            .fields
            .iter()
            .enumerate()
            .map(|(i, field)| {
                constraints.get(i).cloned().flatten().map(|part| KeyComponent {
                    part,
                    order: field.order,
                })
            })
            .collect();

        let prefix = IndexKey(
            components
                .iter()
                .map_while(|c| c.clone())
                .collect::<Vec<_>>(),
        );

        let matches_rest = |key: &IndexKey| {
            key.0
                .iter()
                .zip(&components)
                .all(|(have, want)| want.as_ref().map_or(true, |w| have == w))
        };

        let mut result = Vec::new();
        for (key, doc_keys) in self.entries.range(prefix.clone()..) {
            if !key.starts_with(&prefix) {
                break;
            }
            if matches_rest(key) {
                result.extend(doc_keys.iter().cloned());
            }
        }
        result
    }

    /// Every indexed document key, in index order.
    pub fn keys(&self) -> impl Iterator<Item = &DocumentKey> {
        self.entries.values().flatten()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::IndexField;
    use docket_common::CommitSeq;
    use serde_json::json;

    fn doc(key: &str, content: serde_json::Value) -> Document {
        let mut doc = Document::staged(Value::from_json(content));
        doc.meta.key = DocumentKey::new(key);
        doc.meta.version = CommitSeq(1);
        doc
    }

    fn office_index() -> IndexInstance {
        IndexInstance::new(IndexSpec::new("OFFICE_IDX").field(IndexField::new("office")))
    }

    fn string(s: &str) -> Option<KeyPart> {
        Some(KeyPart::String(s.to_string()))
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut index = office_index();
        assert!(index.insert(&doc("a", json!({ "office": "Shenzhen" }))));
        assert!(index.insert(&doc("b", json!({ "office": "Shenzhen" }))));
        assert!(index.insert(&doc("c", json!({ "office": "London" }))));

        assert_eq!(index.len(), 3);
        assert_eq!(index.key_count(), 2);
        assert_eq!(
            index.lookup(&[string("Shenzhen")]),
            vec![DocumentKey::new("a"), DocumentKey::new("b")]
        );
        assert!(index.lookup(&[string("Paris")]).is_empty());
    }

    #[test]
    fn test_uncovered_documents_skipped() {
        let mut index = office_index();
        assert!(!index.insert(&doc("a", json!({ "name": "Gillian" }))));
        assert!(!index.insert(&doc("b", json!({ "office": 42 }))));
        assert!(!index.insert(&doc("c", json!({ "office": ["London"] }))));
        assert!(index.is_empty());
    }

    #[test]
    fn test_duplicate_insert_counted_once() {
        let mut index = office_index();
        let d = doc("a", json!({ "office": "London" }));
        assert!(index.insert(&d));
        assert!(!index.insert(&d));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut index = office_index();
        let d = doc("a", json!({ "office": "London" }));
        index.insert(&d);
        assert!(index.remove(&d));
        assert!(!index.remove(&d));
        assert_eq!(index.key_count(), 0);
        assert!(index.is_empty());
    }

    #[test]
    fn test_number_keys_normalize() {
        let spec = IndexSpec::new("AGE_IDX")
            .field(IndexField::new("age").datatype(IndexDatatype::Number));
        let mut index = IndexInstance::new(spec);
        index.insert(&doc("a", json!({ "age": 30 })));
        index.insert(&doc("b", json!({ "age": 30.0 })));

        let part = KeyPart::from_value(&Value::Int(30), IndexDatatype::Number);
        assert_eq!(index.lookup(&[part]).len(), 2);
    }

    #[test]
    fn test_composite_partial_lookup() {
        let spec = IndexSpec::new("OFFICE_NAME_IDX")
            .field(IndexField::new("office"))
            .field(IndexField::new("name").order(SortOrder::Desc));
        let index = IndexInstance::build(
            spec,
            &[
                doc("a", json!({ "office": "London", "name": "Anna" })),
                doc("b", json!({ "office": "London", "name": "Zoe" })),
                doc("c", json!({ "office": "Paris", "name": "Anna" })),
            ],
        );

        // Descending second field puts Zoe before Anna.
        assert_eq!(
            index.lookup(&[string("London"), None]),
            vec![DocumentKey::new("b"), DocumentKey::new("a")]
        );
        // Constraint on a non-leading field scans every entry.
        assert_eq!(
            index.lookup(&[None, string("Anna")]),
            vec![DocumentKey::new("a"), DocumentKey::new("c")]
        );
        assert_eq!(
            index.lookup(&[string("Paris"), string("Anna")]),
            vec![DocumentKey::new("c")]
        );
    }
}
