//! Docket Storage - Record Storage Backends
//!
//! Record-level storage underneath the document engine. Backends store
//! opaque byte-keyed records and apply write batches atomically; the engine
//! decides the key layout and value encoding.
//!
//! Key Features:
//! - Pluggable storage backends (memory, local append-only log)
//! - Atomic multi-record write batches
//! - Checksummed log frames with torn-tail recovery
//! - Log compaction
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod backend;
pub mod local;

pub use backend::{BatchOp, MemoryBackend, StorageBackend, StorageStats, WriteBatch};
pub use local::LocalBackend;

use docket_common::{BackendKind, Result, StorageConfig};
use std::sync::Arc;

/// Open the backend described by `config`.
pub fn open_backend(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>> {
    match config.backend {
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
        BackendKind::Local => Ok(Arc::new(LocalBackend::open(
            config.data_directory.clone(),
            config.sync_writes,
        )?)),
    }
}
