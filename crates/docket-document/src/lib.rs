//! Docket Document - Document Collection Engine
//!
//! Embeddable document-collection engine with secondary indexing. Stores
//! schemaless JSON documents in named collections, maintains path-based
//! secondary indexes, and answers filtered count and fetch queries with
//! per-session transactional visibility.
//!
//! Key Features:
//! - Schemaless JSON documents with system-assigned keys
//! - Composite path indexes with typed, ordered fields
//! - Index-assisted or full-scan query plans with identical results
//! - Session transactions for documents, immediate DDL for indexes
//! - Idempotent index and collection drops
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod types;
pub mod spec;
pub mod index;
pub mod filter;
pub mod query;
mod record;
pub mod collection;
pub mod transaction;
pub mod engine;
#[cfg(test)]
mod testing;

pub use types::{Document, DocumentKey, DocumentMeta, Value};
pub use spec::{DropIndexOptions, IndexDatatype, IndexField, IndexSpec, SortOrder};
pub use index::IndexInstance;
pub use filter::{Filter, Pattern};
pub use query::{CountResult, Query, QueryBuilder, RemoveResult, ScanStrategy};
pub use collection::{Collection, CollectionHandle, DropResult};
pub use transaction::Session;
pub use engine::{Database, EngineStats};
