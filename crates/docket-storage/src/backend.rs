//! Docket Backend - Storage Backend Abstraction
//!
//! Defines the record-level storage interface the document engine depends on:
//! keyed get, ordered prefix scans, and atomic application of write batches.
//! Keys are opaque byte strings; values are opaque byte buffers.
//!
//! Key Features:
//! - Atomic multi-record commits through `WriteBatch`
//! - Ordered prefix scans for collection reloads
//! - In-memory backend for tests and embedded use
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use bytes::Bytes;
use docket_common::Result;
use parking_lot::RwLock;
use std::collections::BTreeMap;

// =============================================================================
// Storage Backend Trait
// =============================================================================

/// Pluggable record storage interface.
pub trait StorageBackend: Send + Sync {
    /// Read a single record.
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    /// Read every record whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Bytes)>>;

    /// Apply every operation of the batch, or none of them.
    fn apply(&self, batch: WriteBatch) -> Result<()>;

    /// Sync all pending writes to durable storage.
    fn sync(&self) -> Result<()>;

    /// Rewrite the backend's storage to reclaim space. No-op by default.
    fn compact(&self) -> Result<()> {
        Ok(())
    }

    /// Get storage statistics.
    fn stats(&self) -> StorageStats;
}

// =============================================================================
// Write Batch
// =============================================================================

/// A single record mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Bytes },
    Delete { key: Vec<u8> },
    DeletePrefix { prefix: Vec<u8> },
}

/// An ordered group of mutations applied atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Bytes>) -> &mut Self {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Delete { key: key.into() });
        self
    }

    pub fn delete_prefix(&mut self, prefix: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::DeletePrefix {
            prefix: prefix.into(),
        });
        self
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl From<Vec<BatchOp>> for WriteBatch {
    fn from(ops: Vec<BatchOp>) -> Self {
        Self { ops }
    }
}

// =============================================================================
// Storage Statistics
// =============================================================================

/// Statistics about storage usage and operations.
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    pub total_records: u64,
    pub total_bytes: u64,
    pub read_ops: u64,
    pub write_ops: u64,
    pub delete_ops: u64,
    pub batches_applied: u64,
}

// =============================================================================
// Record Map
// =============================================================================

/// Ordered in-memory record table shared by the backends.
#[derive(Debug, Default)]
pub(crate) struct RecordMap {
    records: BTreeMap<Vec<u8>, Bytes>,
    total_bytes: u64,
}

impl RecordMap {
    pub(crate) fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.records.get(key).cloned()
    }

    pub(crate) fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Bytes)> {
        self.records
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Apply a batch, updating `stats` write/delete counters.
    pub(crate) fn apply(&mut self, ops: &[BatchOp], stats: &mut StorageStats) {
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    if let Some(old) = self.records.insert(key.clone(), value.clone()) {
                        self.total_bytes -= old.len() as u64;
                    }
                    self.total_bytes += value.len() as u64;
                    stats.write_ops += 1;
                }
                BatchOp::Delete { key } => {
                    if let Some(old) = self.records.remove(key) {
                        self.total_bytes -= old.len() as u64;
                        stats.delete_ops += 1;
                    }
                }
                BatchOp::DeletePrefix { prefix } => {
                    let doomed: Vec<Vec<u8>> = self
                        .records
                        .range(prefix.clone()..)
                        .take_while(|(k, _)| k.starts_with(prefix))
                        .map(|(k, _)| k.clone())
                        .collect();
                    for key in doomed {
                        if let Some(old) = self.records.remove(&key) {
                            self.total_bytes -= old.len() as u64;
                            stats.delete_ops += 1;
                        }
                    }
                }
            }
        }
        stats.batches_applied += 1;
        stats.total_records = self.records.len() as u64;
        stats.total_bytes = self.total_bytes;
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Bytes)> {
        self.records.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}

// =============================================================================
// Memory Backend
// =============================================================================

/// In-memory storage backend for testing and embedded use.
pub struct MemoryBackend {
    records: RwLock<RecordMap>,
    stats: RwLock<StorageStats>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(RecordMap::default()),
            stats: RwLock::new(StorageStats::default()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let value = self.records.read().get(key);
        self.stats.write().read_ops += 1;
        Ok(value)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Bytes)>> {
        let rows = self.records.read().scan_prefix(prefix);
        self.stats.write().read_ops += rows.len() as u64;
        Ok(rows)
    }

    fn apply(&self, batch: WriteBatch) -> Result<()> {
        let mut records = self.records.write();
        let mut stats = self.stats.write();
        records.apply(batch.ops(), &mut stats);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn stats(&self) -> StorageStats {
        self.stats.read().clone()
    }
}

// =============================================================================
// Tests
// =============================================================================
