//! Docket Document Test Support
//!
//! Helpers shared by the unit test modules.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use bytes::Bytes;
use docket_common::{DocketError, Result};
use docket_storage::{MemoryBackend, StorageBackend, StorageStats, WriteBatch};
use std::sync::atomic::{AtomicBool, Ordering};

/// Backend that rejects batches while failing is switched on.
pub(crate) struct FlakyBackend {
    inner: MemoryBackend,
    fail: AtomicBool,
}

impl FlakyBackend {
    pub(crate) fn new() -> Self {
        Self {
            inner: MemoryBackend::new(),
            fail: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl StorageBackend for FlakyBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.inner.get(key)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Bytes)>> {
        self.inner.scan_prefix(prefix)
    }

    fn apply(&self, batch: WriteBatch) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DocketError::Storage("disk full".to_string()));
        }
        self.inner.apply(batch)
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn stats(&self) -> StorageStats {
        self.inner.stats()
    }
}
