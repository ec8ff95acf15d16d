//! Docket Config - Configuration Structures
//!
//! Configuration for an embedded Docket database. Supports loading from TOML
//! files and programmatic construction; every section has defaults suitable
//! for an in-process, in-memory database.
//!
//! Key Features:
//! - Storage configuration (backend choice, data directory, fsync policy)
//! - Collection creation policy for already existing names
//! - Resource limits (collection count, document size)
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::error::{DocketError, Result};
use crate::utils::parse_size;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

// =============================================================================
// Storage Configuration
// =============================================================================

/// Which record backend the database runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Volatile in-process storage.
    #[default]
    Memory,
    /// Append-only batch log in `data_directory`.
    Local,
}

/// Configuration for the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    pub data_directory: PathBuf,
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            data_directory: PathBuf::from("./data"),
            sync_writes: true,
        }
    }
}

// =============================================================================
// Collection Configuration
// =============================================================================

/// What `create_collection` does when the name is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OnExisting {
    /// Fail with `DuplicateName`.
    #[default]
    Fail,
    /// Return the existing collection.
    Open,
}

/// Configuration for collection management.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    pub on_existing: OnExisting,
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Top-level configuration for a Docket database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub collection: CollectionConfig,
    pub max_collections: usize,
    /// Bytes, or a size string such as `"512KB"` in TOML.
    #[serde(deserialize_with = "deserialize_size")]
    pub max_document_size: usize,
}

fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Bytes(u64),
        Text(String),
    }

    let bytes = match Size::deserialize(deserializer)? {
        Size::Bytes(bytes) => bytes,
        Size::Text(text) => parse_size(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid size '{}'", text)))?,
    };
    usize::try_from(bytes).map_err(serde::de::Error::custom)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            collection: CollectionConfig::default(),
            max_collections: 1000,
            max_document_size: 16 * 1024 * 1024, // 16 MB
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| DocketError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// In-memory configuration.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Configuration for a local data directory.
    pub fn local(data_directory: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig {
                backend: BackendKind::Local,
                data_directory: data_directory.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn with_on_existing(mut self, policy: OnExisting) -> Self {
        self.collection.on_existing = policy;
        self
    }

    /// Check limits for values that would make the database unusable.
    pub fn validate(&self) -> Result<()> {
        if self.max_collections == 0 {
            return Err(DocketError::Configuration(
                "max_collections must be greater than zero".to_string(),
            ));
        }
        if self.max_document_size == 0 {
            return Err(DocketError::Configuration(
                "max_document_size must be greater than zero".to_string(),
            ));
        }
        if self.storage.backend == BackendKind::Local
            && self.storage.data_directory.as_os_str().is_empty()
        {
            return Err(DocketError::Configuration(
                "local backend requires a data_directory".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
