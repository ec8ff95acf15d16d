//! Docket Document Collection
//!
//! Collections hold committed documents and their secondary indexes behind a
//! single per-collection lock. Document mutations arrive through session
//! commits; index DDL is applied and persisted immediately.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::index::IndexInstance;
use crate::query::QueryBuilder;
use crate::record::{self, CollectionRecord};
use crate::spec::{DropIndexOptions, IndexSpec};
use crate::transaction::Session;
use crate::types::{Document, DocumentKey, DocumentMeta, Value};
use chrono::{DateTime, Utc};
use docket_common::{DocketError, Result};
use docket_storage::{StorageBackend, WriteBatch};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// =============================================================================
// Drop Result
// =============================================================================

/// Outcome of an idempotent drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DropResult {
    pub dropped: bool,
}

// =============================================================================
// Collection State
// =============================================================================

/// Committed documents and index instances of one collection.
#[derive(Default)]
pub(crate) struct CollectionState {
    pub(crate) documents: BTreeMap<DocumentKey, Document>,
    pub(crate) indexes: BTreeMap<String, IndexInstance>,
}

// =============================================================================
// Collection
// =============================================================================

/// A named collection of documents.
pub struct Collection {
    name: String,
    created_at: DateTime<Utc>,
    state: RwLock<CollectionState>,
    dropped: AtomicBool,
    backend: Arc<dyn StorageBackend>,
}

impl Collection {
    pub(crate) fn new(record: CollectionRecord, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            name: record.name,
            created_at: record.created_at,
            state: RwLock::new(CollectionState::default()),
            dropped: AtomicBool::new(false),
            backend,
        }
    }

    /// Rebuild a collection from persisted specs and documents.
    pub(crate) fn restore(
        record: CollectionRecord,
        backend: Arc<dyn StorageBackend>,
        specs: Vec<IndexSpec>,
        documents: Vec<Document>,
    ) -> Self {
        let collection = Self::new(record, backend);
        {
            let mut state = collection.state.write();
            state.documents = documents
                .into_iter()
                .map(|doc| (doc.key().clone(), doc))
                .collect();
            for spec in specs {
                let index = IndexInstance::build(spec, state.documents.values());
                state.indexes.insert(index.name().to_string(), index);
            }
        }
        collection
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::Acquire)
    }

    /// Number of committed documents.
    pub fn len(&self) -> usize {
        self.state.read().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn not_found(&self) -> DocketError {
        DocketError::NotFound(format!("collection '{}' has been dropped", self.name))
    }

    /// Shared access to the committed state of a live collection.
    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, CollectionState>> {
        let state = self.state.read();
        if self.is_dropped() {
            return Err(self.not_found());
        }
        Ok(state)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, CollectionState>> {
        let state = self.state.write();
        if self.is_dropped() {
            return Err(self.not_found());
        }
        Ok(state)
    }

    /// Exclusive access regardless of the dropped flag; commit checks it.
    pub(crate) fn lock_state(&self) -> RwLockWriteGuard<'_, CollectionState> {
        self.state.write()
    }

    // -------------------------------------------------------------------------
    // Index Operations
    // -------------------------------------------------------------------------

    /// Build, persist and publish a new index. Nothing is published when any
    /// step fails.
    pub(crate) fn create_index(&self, spec: IndexSpec) -> Result<()> {
        spec.validate()?;
        let mut state = self.write()?;
        if state.indexes.contains_key(&spec.name) {
            return Err(DocketError::DuplicateName(spec.name));
        }

        let index = IndexInstance::build(spec.clone(), state.documents.values());

        let mut batch = WriteBatch::new();
        batch.put(
            record::index_key(&self.name, &spec.name),
            record::encode(&spec)?,
        );
        self.backend.apply(batch)?;

        tracing::info!(
            collection = %self.name,
            index = %spec.name,
            indexed = index.len(),
            "index created"
        );
        state.indexes.insert(spec.name, index);
        Ok(())
    }

    pub(crate) fn drop_index(&self, name: &str, options: DropIndexOptions) -> Result<DropResult> {
        let mut state = self.write()?;
        if !state.indexes.contains_key(name) {
            tracing::debug!(collection = %self.name, index = %name, "index not present, nothing dropped");
            return Ok(DropResult { dropped: false });
        }

        let mut batch = WriteBatch::new();
        batch.delete(record::index_key(&self.name, name));
        self.backend.apply(batch)?;

        state.indexes.remove(name);
        tracing::info!(
            collection = %self.name,
            index = %name,
            force = options.force,
            "index dropped"
        );
        Ok(DropResult { dropped: true })
    }

    pub fn list_indexes(&self) -> Result<Vec<IndexSpec>> {
        let state = self.read()?;
        Ok(state.indexes.values().map(|i| i.spec().clone()).collect())
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Remove every record of the collection and mark it dropped. Returns
    /// false if it was already dropped.
    pub(crate) fn drop_storage(&self) -> Result<bool> {
        let mut state = self.state.write();
        if self.is_dropped() {
            return Ok(false);
        }

        let mut batch = WriteBatch::new();
        batch
            .delete_prefix(record::document_prefix(&self.name))
            .delete_prefix(record::index_prefix(&self.name))
            .delete(record::collection_key(&self.name));
        self.backend.apply(batch)?;

        self.dropped.store(true, Ordering::Release);
        let documents = state.documents.len();
        let indexes = state.indexes.len();
        *state = CollectionState::default();

        tracing::info!(collection = %self.name, documents, indexes, "collection dropped");
        Ok(true)
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("dropped", &self.is_dropped())
            .finish()
    }
}

// =============================================================================
// Collection Handle
// =============================================================================

/// A collection opened through a session. Document mutations go to the
/// session's transaction; reads see committed data plus the session's own
/// staged mutations.
#[derive(Clone)]
pub struct CollectionHandle {
    session: Session,
    collection: Arc<Collection>,
}

impl CollectionHandle {
    pub(crate) fn new(session: Session, collection: Arc<Collection>) -> Self {
        Self {
            session,
            collection,
        }
    }

    pub fn name(&self) -> &str {
        self.collection.name()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub(crate) fn collection(&self) -> &Arc<Collection> {
        &self.collection
    }

    // -------------------------------------------------------------------------
    // Document Operations
    // -------------------------------------------------------------------------

    /// Stage one document for insert.
    pub fn insert_one(&self, content: impl Into<Value>) -> Result<DocumentMeta> {
        let doc = self.prepare(content.into())?;
        let meta = doc.meta.clone();
        self.session.stage_inserts(&self.collection, vec![doc]);
        Ok(meta)
    }

    /// Stage several documents. Every document is validated first; on any
    /// failure nothing is staged.
    pub fn insert_many<I, V>(&self, contents: I) -> Result<Vec<DocumentMeta>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let docs = contents
            .into_iter()
            .map(|content| self.prepare(content.into()))
            .collect::<Result<Vec<_>>>()?;
        let metas = docs.iter().map(|doc| doc.meta.clone()).collect();
        self.session.stage_inserts(&self.collection, docs);
        Ok(metas)
    }

    fn prepare(&self, content: Value) -> Result<Document> {
        if self.collection.is_dropped() {
            return Err(self.collection.not_found());
        }
        if !content.is_object() {
            return Err(DocketError::InvalidDocument(format!(
                "document root must be an object, got {}",
                content.type_name()
            )));
        }
        let size = serde_json::to_vec(&content)?.len();
        let limit = self.session.engine().config.max_document_size;
        if size > limit {
            return Err(DocketError::InvalidDocument(format!(
                "document is {} bytes, limit is {} bytes",
                size, limit
            )));
        }
        Ok(Document::staged(content))
    }

    /// Fetch a document by key.
    pub fn get(&self, key: &DocumentKey) -> Result<Document> {
        self.find()
            .key(key.clone())
            .get_one()?
            .ok_or_else(|| DocketError::NotFound(format!("document '{}'", key)))
    }

    /// Start a query.
    pub fn find(&self) -> QueryBuilder {
        QueryBuilder::new(self.clone())
    }

    // -------------------------------------------------------------------------
    // Index Operations
    // -------------------------------------------------------------------------

    /// Create an index from a JSON specification.
    pub fn create_index(&self, spec: Option<&JsonValue>) -> Result<()> {
        let spec = IndexSpec::from_json(spec)?;
        self.collection.create_index(spec)
    }

    /// Create an index from a typed specification.
    pub fn create_index_spec(&self, spec: IndexSpec) -> Result<()> {
        self.collection.create_index(spec)
    }

    /// Drop an index; `{dropped: false}` when it does not exist.
    pub fn drop_index(&self, name: &str, options: Option<&JsonValue>) -> Result<DropResult> {
        let options = DropIndexOptions::from_json(options)?;
        self.collection.drop_index(name, options)
    }

    pub fn list_indexes(&self) -> Result<Vec<IndexSpec>> {
        self.collection.list_indexes()
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Drop the collection; `{dropped: false}` when already dropped.
    pub fn drop(&self) -> Result<DropResult> {
        self.session.engine().drop_collection(&self.collection)
    }
}

impl std::fmt::Debug for CollectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionHandle")
            .field("collection", &self.collection)
            .field("transaction", &self.session.transaction_id())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::engine::Database;
    use crate::query::ScanStrategy;
    use crate::spec::{IndexField, IndexSpec};
    use crate::testing::FlakyBackend;
    use docket_common::{DocketError, EngineConfig, ErrorKind};
    use serde_json::json;
    use std::sync::Arc;

    fn office_spec() -> serde_json::Value {
        json!({ "name": "OFFICE_IDX", "fields": [ { "path": "office" } ] })
    }

    #[test]
    fn test_insert_validation() {
        let db = Database::in_memory();
        let coll = db
            .session()
            .create_collection("emp")
            .expect("create should succeed");

        let err = coll.insert_one(json!([1, 2, 3])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDocument);

        let meta = coll.insert_one(json!({ "name": "Gillian" })).expect("insert should succeed");
        assert!(!meta.version.is_committed());
    }

    #[test]
    fn test_document_size_limit() {
        let mut config = EngineConfig::in_memory();
        config.max_document_size = 32;
        let db = Database::open(config).expect("open should succeed");
        let coll = db
            .session()
            .create_collection("emp")
            .expect("create should succeed");

        coll.insert_one(json!({ "a": 1 })).expect("small document fits");
        let err = coll
            .insert_one(json!({ "text": "x".repeat(64) }))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDocument);
    }

    #[test]
    fn test_insert_many_is_all_or_none() {
        let db = Database::in_memory();
        let session = db.session();
        let coll = session.create_collection("emp").expect("create should succeed");

        let err = coll
            .insert_many(vec![json!({ "a": 1 }), json!("oops")])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDocument);
        assert_eq!(session.pending(), 0);

        let metas = coll
            .insert_many(vec![json!({ "a": 1 }), json!({ "a": 2 })])
            .expect("insert should succeed");
        assert_eq!(metas.len(), 2);
        assert_ne!(metas[0].key, metas[1].key);
    }

    #[test]
    fn test_get_by_key() {
        let db = Database::in_memory();
        let session = db.session();
        let coll = session.create_collection("emp").expect("create should succeed");
        let meta = coll.insert_one(json!({ "name": "Gillian" })).expect("insert");
        session.commit().expect("commit");

        let doc = coll.get(&meta.key).expect("document should exist");
        assert_eq!(doc.get("name").and_then(|v| v.as_str()), Some("Gillian"));

        let err = coll.get(&"MISSING".into()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_create_index_duplicate_name() {
        let db = Database::in_memory();
        let coll = db.session().create_collection("emp").expect("create");
        coll.create_index(Some(&office_spec())).expect("first create");

        let err = coll.create_index(Some(&office_spec())).unwrap_err();
        assert!(matches!(err, DocketError::DuplicateName(ref n) if n == "OFFICE_IDX"));
        assert_eq!(coll.list_indexes().expect("list").len(), 1);
    }

    #[test]
    fn test_typed_index_spec() {
        let db = Database::in_memory();
        let coll = db.session().create_collection("emp").expect("create");
        coll.create_index_spec(IndexSpec::new("NAME_IDX").field(IndexField::new("name")))
            .expect("typed create");
        let err = coll.create_index_spec(IndexSpec::new("EMPTY")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidIndexSpec);
        assert_eq!(coll.list_indexes().expect("list")[0].name, "NAME_IDX");
    }

    #[test]
    fn test_drop_index_is_idempotent() {
        let db = Database::in_memory();
        let coll = db.session().create_collection("emp").expect("create");
        coll.create_index(Some(&office_spec())).expect("create index");

        let force = json!({ "force": false });
        assert!(coll.drop_index("OFFICE_IDX", Some(&force)).expect("drop").dropped);
        assert!(!coll.drop_index("OFFICE_IDX", Some(&force)).expect("drop").dropped);
        assert!(!coll.drop_index("OFFICE_IDX", None).expect("drop").dropped);
    }

    #[test]
    fn test_dropped_handle_reports_not_found() {
        let db = Database::in_memory();
        let coll = db.session().create_collection("emp").expect("create");
        assert!(coll.drop().expect("drop").dropped);
        assert!(!coll.drop().expect("drop").dropped);

        assert_eq!(
            coll.insert_one(json!({ "a": 1 })).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(coll.find().count().unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            coll.create_index(Some(&office_spec())).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            coll.drop_index("OFFICE_IDX", None).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_stale_handle_does_not_drop_new_collection() {
        let db = Database::in_memory();
        let session = db.session();
        let old = session.create_collection("emp").expect("create");
        assert!(old.drop().expect("drop").dropped);

        let new = session.create_collection("emp").expect("recreate");
        assert!(!old.drop().expect("drop").dropped);
        assert_eq!(session.collection_names(), vec!["emp".to_string()]);
        assert!(new.drop().expect("drop").dropped);
        assert!(session.collection_names().is_empty());
    }

    #[test]
    fn test_failed_create_index_publishes_nothing() {
        let backend = Arc::new(FlakyBackend::new());
        let db = Database::with_backend(EngineConfig::in_memory(), backend.clone())
            .expect("open should succeed");
        let session = db.session();
        let coll = session.create_collection("emp").expect("create should succeed");
        coll.insert_one(json!({ "office": "London" })).expect("insert");
        session.commit().expect("commit should succeed");

        backend.set_failing(true);
        let err = coll.create_index(Some(&office_spec())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);

        let filter = json!({ "office": "London" });
        assert!(coll.list_indexes().expect("list").is_empty());
        assert_eq!(
            coll.find().filter(&filter).explain().expect("explain"),
            ScanStrategy::FullScan
        );
        assert_eq!(coll.find().filter(&filter).count().expect("count").count, 1);

        // Nothing was persisted either: a reload sees no index.
        backend.set_failing(false);
        let reopened = Database::with_backend(EngineConfig::in_memory(), backend)
            .expect("reopen should succeed");
        let coll = reopened.session().open_collection("emp").expect("open");
        assert!(coll.list_indexes().expect("list").is_empty());

        coll.create_index(Some(&office_spec())).expect("create index after recovery");
        assert_eq!(
            coll.find().filter(&filter).explain().expect("explain"),
            ScanStrategy::Index { name: "OFFICE_IDX".to_string() }
        );
    }

    #[test]
    fn test_handle_debug_names_collection() {
        let db = Database::in_memory();
        let coll = db.session().create_collection("emp").expect("create should succeed");
        let text = format!("{:?}", coll);
        assert!(text.contains("CollectionHandle"));
        assert!(text.contains("emp"));
    }
}
