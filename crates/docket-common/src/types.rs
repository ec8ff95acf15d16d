//! Docket Types - Core Identifier Types
//!
//! Type-safe identifiers shared by the storage and document layers.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Identifier Types
// =============================================================================

/// Unique identifier for a session transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// Commit sequence number. Every committed document carries the sequence of
/// the commit that made it visible; sequences grow monotonically.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct CommitSeq(pub u64);

impl CommitSeq {
    /// Sequence of a document that has not been committed yet.
    pub const UNCOMMITTED: CommitSeq = CommitSeq(0);

    pub fn is_committed(&self) -> bool {
        self.0 != 0
    }

    pub fn next(&self) -> CommitSeq {
        CommitSeq(self.0 + 1)
    }
}

impl fmt::Display for CommitSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_seq() {
        let seq = CommitSeq::UNCOMMITTED;
        assert!(!seq.is_committed());
        assert_eq!(seq.next(), CommitSeq(1));
        assert!(seq.next().is_committed());
        assert!(CommitSeq(2) > CommitSeq(1));
    }
}
