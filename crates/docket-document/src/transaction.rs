//! Docket Transactions - Sessions and Commit Coordination
//!
//! A session owns one open transaction at a time: an ordered buffer of
//! staged document inserts and removes. Reads through a session see the
//! committed data plus its own staged mutations. Commit writes every staged
//! mutation to the backend as one atomic batch and then applies it to the
//! in-memory documents and indexes. Index and collection DDL never goes
//! through a transaction.
//!
//! Key Features:
//! - Cheap cloneable session handles, safe to share across threads
//! - Atomic multi-collection commits through one `WriteBatch`
//! - Explicit rollback and implicit rollback on last-handle drop
//! - Staged mutations left intact when the backend rejects a commit
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::collection::{Collection, CollectionHandle, DropResult};
use crate::engine::EngineShared;
use crate::record;
use crate::types::{Document, DocumentKey};
use docket_common::{Result, TransactionId};
use docket_storage::WriteBatch;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

// =============================================================================
// Staged Operations
// =============================================================================

#[derive(Debug, Clone)]
pub(crate) enum StagedOp {
    Insert(Document),
    Remove(DocumentKey),
}

#[derive(Clone)]
pub(crate) struct Staged {
    collection: Arc<Collection>,
    op: StagedOp,
}

/// One session's staged mutations for a single collection.
#[derive(Debug, Default)]
pub(crate) struct StagedView {
    pub(crate) inserts: Vec<Document>,
    pub(crate) removed: HashSet<DocumentKey>,
}

// =============================================================================
// Transaction
// =============================================================================

/// Ordered buffer of staged document mutations.
pub(crate) struct Transaction {
    id: TransactionId,
    ops: Vec<Staged>,
}

impl Transaction {
    fn new(id: TransactionId) -> Self {
        Self {
            id,
            ops: Vec::new(),
        }
    }

    /// Number of staged mutations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn view(&self, collection: &Arc<Collection>) -> StagedView {
        let mut view = StagedView::default();
        for staged in self.ops.iter().filter(|s| Arc::ptr_eq(&s.collection, collection)) {
            match &staged.op {
                StagedOp::Insert(doc) => view.inserts.push(doc.clone()),
                StagedOp::Remove(key) => {
                    view.removed.insert(key.clone());
                }
            }
        }
        view
    }

    /// Drop a staged insert. Returns false if it is no longer staged.
    fn unstage_insert(&mut self, collection: &Arc<Collection>, key: &DocumentKey) -> bool {
        let position = self.ops.iter().position(|s| {
            Arc::ptr_eq(&s.collection, collection)
                && matches!(&s.op, StagedOp::Insert(doc) if doc.key() == key)
        });
        match position {
            Some(i) => {
                self.ops.remove(i);
                true
            }
            None => false,
        }
    }

    /// Put back the mutations of a failed commit, ahead of anything staged
    /// since.
    fn restore(&mut self, groups: CommitGroups) {
        let mut restored: Vec<Staged> = groups
            .into_iter()
            .flat_map(|(collection, ops)| {
                ops.into_iter().map(move |op| Staged {
                    collection: collection.clone(),
                    op,
                })
            })
            .collect();
        restored.append(&mut self.ops);
        self.ops = restored;
    }
}

/// Staged operations grouped per collection, in lock order.
type CommitGroups = Vec<(Arc<Collection>, Vec<StagedOp>)>;

fn group_by_collection(ops: Vec<Staged>) -> CommitGroups {
    let mut groups: CommitGroups = Vec::new();
    for staged in ops {
        match groups
            .iter_mut()
            .find(|(c, _)| Arc::ptr_eq(c, &staged.collection))
        {
            Some((_, group)) => group.push(staged.op),
            None => groups.push((staged.collection, vec![staged.op])),
        }
    }
    groups.sort_by(|(a, _), (b, _)| {
        a.name()
            .cmp(b.name())
            .then_with(|| Arc::as_ptr(a).cmp(&Arc::as_ptr(b)))
    });
    groups
}

// =============================================================================
// Session
// =============================================================================

struct SessionInner {
    engine: Arc<EngineShared>,
    txn: Mutex<Transaction>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let txn = self.txn.get_mut();
        if !txn.is_empty() {
            tracing::debug!(
                tx = %txn.id,
                discarded = txn.len(),
                "session closed without commit, rolling back"
            );
            self.engine.stats.write().rollbacks += 1;
        }
    }
}

/// Explicit context for a caller's work against a database.
///
/// Clones share the same open transaction. Dropping the last clone without
/// committing discards the staged mutations.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub(crate) fn new(engine: Arc<EngineShared>) -> Self {
        let txn = Transaction::new(engine.next_transaction_id());
        Self {
            inner: Arc::new(SessionInner {
                engine,
                txn: Mutex::new(txn),
            }),
        }
    }

    pub(crate) fn engine(&self) -> &Arc<EngineShared> {
        &self.inner.engine
    }

    /// Identifier of the currently open transaction.
    pub fn transaction_id(&self) -> TransactionId {
        self.inner.txn.lock().id
    }

    /// Number of staged, uncommitted mutations.
    pub fn pending(&self) -> usize {
        self.inner.txn.lock().len()
    }

    // -------------------------------------------------------------------------
    // Collection Registry
    // -------------------------------------------------------------------------

    /// Create a collection. An existing name fails with `DuplicateName` or
    /// opens the existing collection, per the configured policy.
    pub fn create_collection(&self, name: &str) -> Result<CollectionHandle> {
        let collection = self.inner.engine.create_collection(name)?;
        Ok(CollectionHandle::new(self.clone(), collection))
    }

    pub fn open_collection(&self, name: &str) -> Option<CollectionHandle> {
        self.inner
            .engine
            .open_collection(name)
            .map(|collection| CollectionHandle::new(self.clone(), collection))
    }

    /// Drop a collection by name; `{dropped: false}` if it does not exist.
    pub fn drop_collection(&self, name: &str) -> Result<DropResult> {
        self.inner.engine.drop_collection_named(name)
    }

    /// Names of all live collections, sorted.
    pub fn collection_names(&self) -> Vec<String> {
        self.inner.engine.collection_names()
    }

    // -------------------------------------------------------------------------
    // Staging
    // -------------------------------------------------------------------------

    pub(crate) fn stage_inserts(&self, collection: &Arc<Collection>, docs: Vec<Document>) {
        let mut txn = self.inner.txn.lock();
        txn.ops.extend(docs.into_iter().map(|doc| Staged {
            collection: collection.clone(),
            op: StagedOp::Insert(doc),
        }));
    }

    pub(crate) fn staged_view(&self, collection: &Arc<Collection>) -> StagedView {
        self.inner.txn.lock().view(collection)
    }

    /// Stage removal of documents. Staged inserts are simply unstaged;
    /// committed documents get a staged remove.
    pub(crate) fn stage_removals(
        &self,
        collection: &Arc<Collection>,
        staged: Vec<DocumentKey>,
        committed: Vec<DocumentKey>,
    ) -> usize {
        let mut txn = self.inner.txn.lock();
        let count = staged.len() + committed.len();
        for key in staged {
            // Committed by another clone in the meantime.
            if !txn.unstage_insert(collection, &key) {
                txn.ops.push(Staged {
                    collection: collection.clone(),
                    op: StagedOp::Remove(key),
                });
            }
        }
        txn.ops.extend(committed.into_iter().map(|key| Staged {
            collection: collection.clone(),
            op: StagedOp::Remove(key),
        }));
        count
    }

    // -------------------------------------------------------------------------
    // Commit / Rollback
    // -------------------------------------------------------------------------

    /// Make every staged mutation visible to other sessions.
    ///
    /// On a backend failure nothing is applied and the staged mutations stay
    /// in the transaction.
    pub fn commit(&self) -> Result<()> {
        let engine = &self.inner.engine;
        let mut txn = self.inner.txn.lock();
        if txn.is_empty() {
            return Ok(());
        }

        let groups = group_by_collection(std::mem::take(&mut txn.ops));

        // Lock every touched collection, in name order.
        let mut locked = Vec::with_capacity(groups.len());
        for (collection, ops) in &groups {
            let state = collection.lock_state();
            if collection.is_dropped() {
                tracing::warn!(
                    tx = %txn.id,
                    collection = %collection.name(),
                    discarded = ops.len(),
                    "collection dropped before commit, discarding staged mutations"
                );
                continue;
            }
            locked.push((collection, state, ops));
        }

        if locked.is_empty() {
            txn.id = engine.next_transaction_id();
            return Ok(());
        }

        let seq = engine.next_commit_seq();
        let prepared = (|| -> Result<_> {
            let mut batch = WriteBatch::new();
            let mut applied = Vec::with_capacity(locked.len());
            for (collection, state, ops) in &locked {
                let mut inserts = Vec::new();
                let mut removes = Vec::new();
                for op in ops.iter() {
                    match op {
                        StagedOp::Insert(doc) => {
                            let mut doc = doc.clone();
                            doc.meta.version = seq;
                            let key = record::document_key(collection.name(), doc.key().as_str());
                            batch.put(key, record::encode(&doc)?);
                            inserts.push(doc);
                        }
                        StagedOp::Remove(key) => {
                            if state.documents.contains_key(key) {
                                batch.delete(record::document_key(collection.name(), key.as_str()));
                                removes.push(key.clone());
                            }
                        }
                    }
                }
                applied.push((inserts, removes));
            }
            batch.put(record::commit_seq_key(), record::encode(&seq)?);
            engine.backend.apply(batch)?;
            Ok(applied)
        })();

        let applied = match prepared {
            Ok(applied) => applied,
            Err(e) => {
                tracing::warn!(tx = %txn.id, error = %e, "commit failed, staged mutations kept");
                drop(locked);
                txn.restore(groups);
                return Err(e);
            }
        };

        let mut inserted = 0u64;
        let mut removed = 0u64;
        for ((_, mut state, _), (inserts, removes)) in locked.into_iter().zip(applied) {
            let state = &mut *state;
            for key in removes {
                if let Some(doc) = state.documents.remove(&key) {
                    for index in state.indexes.values_mut() {
                        index.remove(&doc);
                    }
                    removed += 1;
                }
            }
            for doc in inserts {
                for index in state.indexes.values_mut() {
                    index.insert(&doc);
                }
                state.documents.insert(doc.key().clone(), doc);
                inserted += 1;
            }
        }

        {
            let mut stats = engine.stats.write();
            stats.commits += 1;
            stats.documents_inserted += inserted;
            stats.documents_removed += removed;
        }

        tracing::debug!(
            tx = %txn.id,
            seq = %seq,
            inserted,
            removed,
            "transaction committed"
        );
        txn.id = engine.next_transaction_id();
        Ok(())
    }

    /// Discard every staged mutation. DDL performed through this session is
    /// unaffected.
    pub fn rollback(&self) {
        let engine = &self.inner.engine;
        let mut txn = self.inner.txn.lock();
        if !txn.is_empty() {
            tracing::debug!(tx = %txn.id, discarded = txn.len(), "transaction rolled back");
            txn.ops.clear();
            engine.stats.write().rollbacks += 1;
        }
        txn.id = engine.next_transaction_id();
    }
}

// =============================================================================
// Tests
// =============================================================================
