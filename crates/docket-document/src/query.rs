//! Docket Document Query
//!
//! Query planning and execution. The planner picks an index scan when an
//! index covers every path the filter reads and every one of its fields is
//! pinned by an equality predicate; otherwise it falls back to a full
//! scan. Both strategies re-check the full filter on each candidate, so the
//! choice never changes a result.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::collection::{CollectionHandle, CollectionState};
use crate::filter::Filter;
use crate::index::{IndexInstance, KeyPart};
use crate::transaction::StagedView;
use crate::types::{Document, DocumentKey, Value};
use docket_common::{DocketError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

// =============================================================================
// Query
// =============================================================================

/// A query for filtering documents.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filter: Option<Filter>,
    pub keys: Option<Vec<DocumentKey>>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a document matches this query's filter and key set.
    pub fn matches(&self, doc: &Document) -> bool {
        if let Some(keys) = &self.keys {
            if !keys.contains(doc.key()) {
                return false;
            }
        }
        self.filter.as_ref().map_or(true, |f| f.matches(doc))
    }
}

// =============================================================================
// Planning
// =============================================================================

/// How a query reads committed documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "camelCase")]
pub enum ScanStrategy {
    /// Direct lookup of the requested document keys.
    KeyLookup,
    /// Candidates come from the named index.
    Index { name: String },
    /// Every committed document is evaluated.
    FullScan,
}

struct IndexChoice<'a> {
    index: &'a IndexInstance,
    constraints: Vec<Option<KeyPart>>,
}

fn choose_index<'a>(filter: &Filter, state: &'a CollectionState) -> Option<IndexChoice<'a>> {
    let paths = filter.paths();

    let like_literals: Vec<(&str, Value)> = filter
        .required_like_literals()
        .into_iter()
        .map(|(path, literal)| (path, Value::from(literal)))
        .collect();
    let equalities: Vec<(&str, &Value)> = filter
        .required_equalities()
        .into_iter()
        .chain(like_literals.iter().map(|(path, value)| (*path, value)))
        .collect();
    if equalities.is_empty() {
        return None;
    }

    let mut best: Option<(usize, IndexChoice<'a>)> = None;
    for index in state.indexes.values() {
        let fields = &index.spec().fields;
        if !paths.iter().all(|p| fields.iter().any(|f| f.path == *p)) {
            continue;
        }

        let constraints: Vec<Option<KeyPart>> = fields
            .iter()
            .map(|field| {
                equalities
                    .iter()
                    .filter(|(path, _)| *path == field.path)
                    .find_map(|(_, value)| KeyPart::from_value(value, field.datatype))
            })
            .collect();
        // Documents lacking a field are absent from the index, so a
        // partially pinned key could miss matches.
        if constraints.iter().any(Option::is_none) {
            continue;
        }
        let pinned = constraints.len();

        // Indexes iterate in name order, so ties keep the first name.
        if best.as_ref().map_or(true, |(n, _)| pinned > *n) {
            best = Some((pinned, IndexChoice { index, constraints }));
        }
    }
    best.map(|(_, choice)| choice)
}

fn plan<'a>(query: &Query, state: &'a CollectionState) -> (ScanStrategy, Option<IndexChoice<'a>>) {
    if query.keys.is_some() {
        return (ScanStrategy::KeyLookup, None);
    }
    match query.filter.as_ref().and_then(|f| choose_index(f, state)) {
        Some(choice) => (
            ScanStrategy::Index {
                name: choice.index.name().to_string(),
            },
            Some(choice),
        ),
        None => (ScanStrategy::FullScan, None),
    }
}

/// Run `query` over committed state plus a session's staged mutations.
/// Returns matches in scan order with skip and limit applied.
pub(crate) fn execute<'a>(
    query: &Query,
    state: &'a CollectionState,
    staged: &'a StagedView,
) -> (ScanStrategy, Vec<&'a Document>) {
    let (strategy, choice) = plan(query, state);
    let visible = |doc: &Document| !staged.removed.contains(doc.key()) && query.matches(doc);

    let mut matched: Vec<&'a Document> = Vec::new();
    match (&query.keys, choice) {
        (Some(keys), _) => {
            let mut seen = HashSet::new();
            for key in keys.iter().filter(|k| seen.insert(*k)) {
                if let Some(doc) = state.documents.get(key) {
                    if visible(doc) {
                        matched.push(doc);
                    }
                }
            }
        }
        (None, Some(choice)) => {
            for key in choice.index.lookup(&choice.constraints) {
                if let Some(doc) = state.documents.get(&key) {
                    if visible(doc) {
                        matched.push(doc);
                    }
                }
            }
        }
        (None, None) => matched.extend(state.documents.values().filter(|&doc| visible(doc))),
    }
    matched.extend(staged.inserts.iter().filter(|&doc| query.matches(doc)));

    let matched = matched
        .into_iter()
        .skip(query.skip)
        .take(query.limit.unwrap_or(usize::MAX))
        .collect();
    (strategy, matched)
}

// =============================================================================
// Results
// =============================================================================

/// Result of `count()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountResult {
    pub count: usize,
}

/// Result of `remove()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemoveResult {
    pub count: usize,
}

// =============================================================================
// Query Builder
// =============================================================================

/// Builder returned by `find()`. Terminal operations run the query.
pub struct QueryBuilder {
    handle: CollectionHandle,
    query: Query,
    error: Option<DocketError>,
}

impl QueryBuilder {
    pub(crate) fn new(handle: CollectionHandle) -> Self {
        Self {
            handle,
            query: Query::new(),
            error: None,
        }
    }

    /// Restrict to documents matching a JSON filter expression. A malformed
    /// filter is reported by the terminal operation.
    pub fn filter(mut self, expr: &JsonValue) -> Self {
        match Filter::from_json(expr) {
            Ok(filter) => self.query.filter = Some(filter),
            Err(e) => self.error = Some(e),
        }
        self
    }

    /// Restrict to documents matching an already built filter.
    pub fn filter_with(mut self, filter: Filter) -> Self {
        self.query.filter = Some(filter);
        self
    }

    pub fn key(mut self, key: impl Into<DocumentKey>) -> Self {
        self.query.keys = Some(vec![key.into()]);
        self
    }

    pub fn keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<DocumentKey>,
    {
        self.query.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.query.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    // -------------------------------------------------------------------------
    // Terminal Operations
    // -------------------------------------------------------------------------

    fn run<R>(self, f: impl FnOnce(Vec<&Document>) -> R) -> Result<R> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let collection = self.handle.collection();
        let staged = self.handle.session().staged_view(collection);
        let state = collection.read()?;
        let (strategy, docs) = execute(&self.query, &state, &staged);

        {
            let mut stats = self.handle.session().engine().stats.write();
            stats.queries_executed += 1;
            match &strategy {
                ScanStrategy::Index { .. } => stats.index_scans += 1,
                ScanStrategy::FullScan => stats.full_scans += 1,
                ScanStrategy::KeyLookup => {}
            }
        }
        tracing::debug!(
            collection = %collection.name(),
            ?strategy,
            matched = docs.len(),
            "query executed"
        );
        Ok(f(docs))
    }

    /// Number of matching documents.
    pub fn count(self) -> Result<CountResult> {
        self.run(|docs| CountResult { count: docs.len() })
    }

    /// Every matching document.
    pub fn get_documents(self) -> Result<Vec<Document>> {
        self.run(|docs| docs.into_iter().cloned().collect())
    }

    /// The first matching document, if any.
    pub fn get_one(self) -> Result<Option<Document>> {
        self.run(|docs| docs.first().map(|doc| (*doc).clone()))
    }

    /// Stage removal of every matching document in the session.
    pub fn remove(self) -> Result<RemoveResult> {
        let handle = self.handle.clone();
        let (staged, committed) = self.run(|docs| {
            let mut staged = Vec::new();
            let mut committed = Vec::new();
            for doc in docs {
                if doc.version().is_committed() {
                    committed.push(doc.key().clone());
                } else {
                    staged.push(doc.key().clone());
                }
            }
            (staged, committed)
        })?;
        let count = handle
            .session()
            .stage_removals(handle.collection(), staged, committed);
        Ok(RemoveResult { count })
    }

    /// The scan strategy the planner would use, without running the query.
    pub fn explain(self) -> Result<ScanStrategy> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let state = self.handle.collection().read()?;
        Ok(plan(&self.query, &state).0)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Database;
    use docket_common::ErrorKind;
    use serde_json::json;

    fn seeded() -> (Database, CollectionHandle) {
        let db = Database::in_memory();
        let session = db.session();
        let coll = session.create_collection("emp").expect("create should succeed");
        coll.insert_many((0..10).map(|i| {
            let office = if i % 2 == 0 { "London" } else { "Paris" };
            json!({ "n": i, "office": office, "dept": format!("D{}", i % 3) })
        }))
        .expect("insert should succeed");
        session.commit().expect("commit should succeed");
        (db, coll)
    }

    fn spec(name: &str, paths: &[&str]) -> JsonValue {
        let fields: Vec<JsonValue> = paths.iter().map(|p| json!({ "path": p })).collect();
        json!({ "name": name, "fields": fields })
    }

    #[test]
    fn test_full_scan_without_index() {
        let (_db, coll) = seeded();
        let query = json!({ "office": "London" });
        assert_eq!(coll.find().filter(&query).count().expect("count").count, 5);
        assert_eq!(
            coll.find().filter(&query).explain().expect("explain"),
            ScanStrategy::FullScan
        );
    }

    #[test]
    fn test_index_chosen_when_covering() {
        let (_db, coll) = seeded();
        coll.create_index(Some(&spec("OFFICE_IDX", &["office"])))
            .expect("create index");

        let query = json!({ "office": "London" });
        assert_eq!(
            coll.find().filter(&query).explain().expect("explain"),
            ScanStrategy::Index { name: "OFFICE_IDX".to_string() }
        );
        assert_eq!(coll.find().filter(&query).count().expect("count").count, 5);

        // Uncovered path forces a full scan.
        let mixed = json!({ "office": "London", "dept": "D0" });
        assert_eq!(
            coll.find().filter(&mixed).explain().expect("explain"),
            ScanStrategy::FullScan
        );
        assert_eq!(coll.find().filter(&mixed).count().expect("count").count, 2);

        // Range predicates alone never use the index.
        let range = json!({ "office": { "$gt": "M" } });
        assert_eq!(
            coll.find().filter(&range).explain().expect("explain"),
            ScanStrategy::FullScan
        );
    }

    #[test]
    fn test_prefers_most_constrained_index() {
        let (_db, coll) = seeded();
        coll.create_index(Some(&spec("A_OFFICE", &["office", "dept"])))
            .expect("create index");
        coll.create_index(Some(&spec("B_BOTH", &["dept", "office"])))
            .expect("create index");

        let both = json!({ "office": "London", "dept": { "$like": "D0" } });
        // Equal field counts keep the first name.
        assert_eq!(
            coll.find().filter(&both).explain().expect("explain"),
            ScanStrategy::Index { name: "A_OFFICE".to_string() }
        );
        assert_eq!(coll.find().filter(&both).count().expect("count").count, 2);

        let one = json!({ "dept": "D1" });
        assert_eq!(
            coll.find().filter(&one).explain().expect("explain"),
            ScanStrategy::FullScan
        );
        assert_eq!(coll.find().filter(&one).count().expect("count").count, 3);
    }

    #[test]
    fn test_partially_pinned_composite_index_not_used() {
        let db = Database::in_memory();
        let session = db.session();
        let coll = session.create_collection("emp").expect("create");
        coll.create_index(Some(&spec("OFFICE_NAME", &["office", "name"])))
            .expect("create index");
        coll.insert_many(vec![
            json!({ "office": "London", "name": "May" }),
            json!({ "office": "London" }),
            json!({ "office": "London", "name": 7 }),
        ])
        .expect("insert");
        session.commit().expect("commit");

        let office = json!({ "office": "London" });
        assert_eq!(
            coll.find().filter(&office).explain().expect("explain"),
            ScanStrategy::FullScan
        );
        assert_eq!(coll.find().filter(&office).count().expect("count").count, 3);

        let both = json!({ "office": "London", "name": "May" });
        assert_eq!(
            coll.find().filter(&both).explain().expect("explain"),
            ScanStrategy::Index { name: "OFFICE_NAME".to_string() }
        );
        assert_eq!(coll.find().filter(&both).count().expect("count").count, 1);
    }

    #[test]
    fn test_incompatible_literal_falls_back() {
        let (_db, coll) = seeded();
        coll.create_index(Some(&spec("OFFICE_IDX", &["office"])))
            .expect("create index");
        let numeric = json!({ "office": 5 });
        assert_eq!(
            coll.find().filter(&numeric).explain().expect("explain"),
            ScanStrategy::FullScan
        );
        assert_eq!(coll.find().filter(&numeric).count().expect("count").count, 0);
    }

    #[test]
    fn test_skip_limit_and_keys() {
        let (_db, coll) = seeded();
        let docs = coll.find().skip(2).limit(3).get_documents().expect("query");
        assert_eq!(docs.len(), 3);

        let all = coll.find().get_documents().expect("query");
        let keys: Vec<DocumentKey> = all.iter().take(2).map(|d| d.key().clone()).collect();
        let by_keys = coll
            .find()
            .keys(keys.clone())
            .get_documents()
            .expect("query");
        assert_eq!(by_keys.len(), 2);
        assert_eq!(
            coll.find().keys(keys).explain().expect("explain"),
            ScanStrategy::KeyLookup
        );
        assert!(coll.find().key("NOPE").get_one().expect("query").is_none());
    }

    #[test]
    fn test_session_sees_own_staged_inserts() {
        let (db, coll) = seeded();
        coll.create_index(Some(&spec("OFFICE_IDX", &["office"])))
            .expect("create index");
        coll.insert_one(json!({ "office": "London" })).expect("insert");

        let query = json!({ "office": "London" });
        assert_eq!(coll.find().filter(&query).count().expect("count").count, 6);

        let other = db.session().open_collection("emp").expect("open");
        assert_eq!(other.find().filter(&query).count().expect("count").count, 5);
    }

    #[test]
    fn test_invalid_filter_reported_at_terminal() {
        let (_db, coll) = seeded();
        let err = coll
            .find()
            .filter(&json!({ "office": { "$regex": "(" } }))
            .count()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFilter);
    }

    #[test]
    fn test_scan_strategy_serializes() {
        let json = serde_json::to_value(ScanStrategy::Index { name: "X".to_string() })
            .expect("serialize");
        assert_eq!(json, json!({ "strategy": "index", "name": "X" }));
        let json = serde_json::to_value(ScanStrategy::FullScan).expect("serialize");
        assert_eq!(json, json!({ "strategy": "fullScan" }));
    }
}
