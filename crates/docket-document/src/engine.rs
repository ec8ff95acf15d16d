//! Docket Document Engine
//!
//! Core engine that owns the storage backend and the collection registry.
//! Opening a database replays every persisted collection, index
//! specification and document from the backend and rebuilds the index
//! instances in memory.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::collection::{Collection, DropResult};
use crate::record::{self, CollectionRecord};
use crate::spec::IndexSpec;
use crate::transaction::Session;
use crate::types::Document;
use chrono::Utc;
use docket_common::{
    CommitSeq, DocketError, EngineConfig, OnExisting, Result, TransactionId,
};
use docket_storage::{open_backend, MemoryBackend, StorageBackend, StorageStats, WriteBatch};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// =============================================================================
// Engine Statistics
// =============================================================================

/// Statistics for the document engine.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub documents_inserted: u64,
    pub documents_removed: u64,
    pub queries_executed: u64,
    pub index_scans: u64,
    pub full_scans: u64,
    pub commits: u64,
    pub rollbacks: u64,
}

// =============================================================================
// Shared Engine State
// =============================================================================

pub(crate) struct EngineShared {
    pub(crate) config: EngineConfig,
    pub(crate) backend: Arc<dyn StorageBackend>,
    pub(crate) stats: RwLock<EngineStats>,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
    commit_seq: AtomicU64,
    next_tx: AtomicU64,
}

impl EngineShared {
    pub(crate) fn next_transaction_id(&self) -> TransactionId {
        TransactionId(self.next_tx.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn next_commit_seq(&self) -> CommitSeq {
        CommitSeq(self.commit_seq.fetch_add(1, Ordering::SeqCst) + 1)
    }

    // -------------------------------------------------------------------------
    // Collection Registry
    // -------------------------------------------------------------------------

    pub(crate) fn create_collection(&self, name: &str) -> Result<Arc<Collection>> {
        validate_collection_name(name)?;
        let mut collections = self.collections.write();

        // A drop may still be on its way to unregistering this entry.
        if collections.get(name).is_some_and(|c| c.is_dropped()) {
            collections.remove(name);
        }
        if let Some(existing) = collections.get(name) {
            return match self.config.collection.on_existing {
                OnExisting::Open => Ok(existing.clone()),
                OnExisting::Fail => Err(DocketError::DuplicateName(name.to_string())),
            };
        }

        let live = collections.values().filter(|c| !c.is_dropped()).count();
        if live >= self.config.max_collections {
            return Err(DocketError::ResourceExhausted(format!(
                "maximum number of collections ({}) reached",
                self.config.max_collections
            )));
        }

        let record = CollectionRecord {
            name: name.to_string(),
            created_at: Utc::now(),
        };
        let mut batch = WriteBatch::new();
        batch.put(record::collection_key(name), record::encode(&record)?);
        self.backend.apply(batch)?;

        let collection = Arc::new(Collection::new(record, self.backend.clone()));
        collections.insert(name.to_string(), collection.clone());
        tracing::info!(collection = %name, "collection created");
        Ok(collection)
    }

    pub(crate) fn open_collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections
            .read()
            .get(name)
            .filter(|c| !c.is_dropped())
            .cloned()
    }

    /// Drop exactly this collection instance. A stale instance never
    /// removes a newer collection registered under the same name.
    ///
    /// The registry lock is only taken after the collection's own lock is
    /// released, so waiting on in-flight queries never blocks other
    /// collections.
    pub(crate) fn drop_collection(&self, collection: &Arc<Collection>) -> Result<DropResult> {
        let dropped = collection.drop_storage()?;
        let mut collections = self.collections.write();
        if collections
            .get(collection.name())
            .is_some_and(|live| Arc::ptr_eq(live, collection))
        {
            collections.remove(collection.name());
        }
        Ok(DropResult { dropped })
    }

    pub(crate) fn drop_collection_named(&self, name: &str) -> Result<DropResult> {
        match self.open_collection(name) {
            Some(collection) => self.drop_collection(&collection),
            None => {
                tracing::debug!(collection = %name, "collection not present, nothing dropped");
                Ok(DropResult { dropped: false })
            }
        }
    }

    pub(crate) fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .collections
            .read()
            .values()
            .filter(|c| !c.is_dropped())
            .map(|c| c.name().to_string())
            .collect();
        names.sort();
        names
    }
}

fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DocketError::MissingArgument("collectionName".to_string()));
    }
    if name.contains('\0') {
        return Err(DocketError::InvalidProperty(format!(
            "collection name {:?} contains a NUL character",
            name
        )));
    }
    Ok(())
}

// =============================================================================
// Database
// =============================================================================

/// An open Docket database. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Database {
    shared: Arc<EngineShared>,
}

impl Database {
    /// Open the database described by `config`, loading persisted state.
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let backend = open_backend(&config.storage)?;
        Self::with_backend(config, backend)
    }

    /// Open a database on an existing backend.
    pub fn with_backend(config: EngineConfig, backend: Arc<dyn StorageBackend>) -> Result<Self> {
        let (collections, last_seq) = load(&backend)?;
        let documents: usize = collections.values().map(|c| c.len()).sum();
        tracing::info!(
            collections = collections.len(),
            documents,
            commit_seq = last_seq,
            "database opened"
        );

        Ok(Self {
            shared: Arc::new(EngineShared {
                config,
                backend,
                stats: RwLock::new(EngineStats::default()),
                collections: RwLock::new(collections),
                commit_seq: AtomicU64::new(last_seq),
                next_tx: AtomicU64::new(1),
            }),
        })
    }

    /// A fresh volatile database.
    pub fn in_memory() -> Self {
        Self {
            shared: Arc::new(EngineShared {
                config: EngineConfig::in_memory(),
                backend: Arc::new(MemoryBackend::new()),
                stats: RwLock::new(EngineStats::default()),
                collections: RwLock::new(HashMap::new()),
                commit_seq: AtomicU64::new(0),
                next_tx: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Start a session with an empty transaction.
    pub fn session(&self) -> Session {
        Session::new(self.shared.clone())
    }

    /// Names of all live collections, sorted.
    pub fn collection_names(&self) -> Vec<String> {
        self.shared.collection_names()
    }

    /// Drop a collection by name; `{dropped: false}` if it does not exist.
    pub fn drop_collection(&self, name: &str) -> Result<DropResult> {
        self.shared.drop_collection_named(name)
    }

    // -------------------------------------------------------------------------
    // Maintenance
    // -------------------------------------------------------------------------

    /// Flush the backend to durable storage.
    pub fn sync(&self) -> Result<()> {
        self.shared.backend.sync()
    }

    /// Reclaim backend space.
    pub fn compact(&self) -> Result<()> {
        self.shared.backend.compact()
    }

    // -------------------------------------------------------------------------
    // Statistics
    // -------------------------------------------------------------------------

    pub fn stats(&self) -> EngineStats {
        self.shared.stats.read().clone()
    }

    pub fn reset_stats(&self) {
        *self.shared.stats.write() = EngineStats::default();
    }

    pub fn storage_stats(&self) -> StorageStats {
        self.shared.backend.stats()
    }
}

// =============================================================================
// Loading
// =============================================================================

type LoadedCollections = HashMap<String, Arc<Collection>>;

fn load(backend: &Arc<dyn StorageBackend>) -> Result<(LoadedCollections, u64)> {
    let mut last_seq = match backend.get(&record::commit_seq_key())? {
        Some(bytes) => record::decode::<CommitSeq>(&record::commit_seq_key(), &bytes)?.0,
        None => 0,
    };

    let mut collections = HashMap::new();
    for (key, value) in backend.scan_prefix(&record::collections_prefix())? {
        let meta: CollectionRecord = record::decode(&key, &value)?;

        let specs = backend
            .scan_prefix(&record::index_prefix(&meta.name))?
            .into_iter()
            .map(|(key, value)| record::decode::<IndexSpec>(&key, &value))
            .collect::<Result<Vec<_>>>()?;

        let documents = backend
            .scan_prefix(&record::document_prefix(&meta.name))?
            .into_iter()
            .map(|(key, value)| record::decode::<Document>(&key, &value))
            .collect::<Result<Vec<_>>>()?;

        if let Some(max) = documents.iter().map(|d| d.version().0).max() {
            last_seq = last_seq.max(max);
        }

        tracing::debug!(
            collection = %meta.name,
            indexes = specs.len(),
            documents = documents.len(),
            "collection loaded"
        );
        let name = meta.name.clone();
        let collection = Collection::restore(meta, backend.clone(), specs, documents);
        collections.insert(name, Arc::new(collection));
    }

    Ok((collections, last_seq))
}

// =============================================================================
// Tests
// =============================================================================
