//! Docket Common - Shared Types and Utilities
//!
//! Foundational types, error handling, and utilities used across all Docket
//! crates. Provides the error and configuration types that keep behavior
//! consistent between the storage backends and the document engine.
//!
//! Key Features:
//! - Unified error type with structured kinds
//! - Core identifier types (TransactionId, CommitSeq)
//! - Engine configuration with TOML loading
//! - Checksum and size utilities
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub use config::{BackendKind, CollectionConfig, EngineConfig, OnExisting, StorageConfig};
pub use error::{DocketError, ErrorKind, Result};
pub use types::*;
