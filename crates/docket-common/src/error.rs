//! Docket Error - Unified Error Types
//!
//! Error handling for all Docket operations. Validation errors (bad index
//! specs, bad filters, missing arguments, name collisions) are raised before
//! any side effect; storage errors surface whatever the backend reported.
//!
//! Key Features:
//! - Domain-specific error variants for precise error handling
//! - Structured error kinds for callers that match on category
//! - Retryable and user error classification
//! - Seamless integration with std::io::Error
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Unified error type for all Docket operations.
#[derive(Error, Debug)]
pub enum DocketError {
    // Validation errors
    #[error("invalid property: {0}")]
    InvalidProperty(String),

    #[error("missing argument: {0}")]
    MissingArgument(String),

    #[error("duplicate name: {0}")]
    DuplicateName(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid index specification: {0}")]
    InvalidIndexSpec(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    // Resource errors
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    // Storage errors
    #[error("storage error: {0}")]
    Storage(String),

    #[error("corruption detected: {0}")]
    Corruption(String),

    // Transaction errors
    #[error("transaction error: {0}")]
    Transaction(String),

    // Serialization errors
    #[error("serialization error: {0}")]
    Serialization(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Category of a [`DocketError`], stable across message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidProperty,
    MissingArgument,
    DuplicateName,
    NotFound,
    InvalidIndexSpec,
    InvalidFilter,
    InvalidDocument,
    ResourceExhausted,
    Storage,
    Corruption,
    Transaction,
    Serialization,
    Configuration,
    Io,
}

// =============================================================================
// Type Aliases
// =============================================================================

/// Result type alias for Docket operations.
pub type Result<T> = std::result::Result<T, DocketError>;

// =============================================================================
// Error Classification
// =============================================================================

impl DocketError {
    /// The structured kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DocketError::InvalidProperty(_) => ErrorKind::InvalidProperty,
            DocketError::MissingArgument(_) => ErrorKind::MissingArgument,
            DocketError::DuplicateName(_) => ErrorKind::DuplicateName,
            DocketError::NotFound(_) => ErrorKind::NotFound,
            DocketError::InvalidIndexSpec(_) => ErrorKind::InvalidIndexSpec,
            DocketError::InvalidFilter(_) => ErrorKind::InvalidFilter,
            DocketError::InvalidDocument(_) => ErrorKind::InvalidDocument,
            DocketError::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            DocketError::Storage(_) => ErrorKind::Storage,
            DocketError::Corruption(_) => ErrorKind::Corruption,
            DocketError::Transaction(_) => ErrorKind::Transaction,
            DocketError::Serialization(_) => ErrorKind::Serialization,
            DocketError::Configuration(_) => ErrorKind::Configuration,
            DocketError::Io(_) => ErrorKind::Io,
        }
    }

    /// Returns true if the operation can be safely retried.
    ///
    /// Docket itself never retries; this only informs callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            DocketError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Returns true if this is a user error (vs system error).
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            DocketError::InvalidProperty(_)
                | DocketError::MissingArgument(_)
                | DocketError::DuplicateName(_)
                | DocketError::NotFound(_)
                | DocketError::InvalidIndexSpec(_)
                | DocketError::InvalidFilter(_)
                | DocketError::InvalidDocument(_)
        )
    }
}

impl From<serde_json::Error> for DocketError {
    fn from(err: serde_json::Error) -> Self {
        DocketError::Serialization(err.to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        let err = DocketError::InvalidProperty("foo".to_string());
        assert_eq!(err.kind(), ErrorKind::InvalidProperty);
        assert_eq!(err.to_string(), "invalid property: foo");

        let err = DocketError::MissingArgument("indexSpec".to_string());
        assert_eq!(err.kind(), ErrorKind::MissingArgument);
    }

    #[test]
    fn test_classification() {
        assert!(DocketError::DuplicateName("OFFICE_IDX".into()).is_user_error());
        assert!(!DocketError::Corruption("bad frame".into()).is_user_error());
        assert!(!DocketError::NotFound("coll".into()).is_retryable());

        let io = std::io::Error::new(std::io::ErrorKind::Interrupted, "signal");
        assert!(DocketError::from(io).is_retryable());
    }
}
