//! Docket Record Layout
//!
//! Mapping between engine objects and backend records. Every record key
//! starts with a one-byte tag and NUL-separated name components:
//!
//! - `c\0<collection>` collection metadata
//! - `i\0<collection>\0<index>` index specification
//! - `d\0<collection>\0<document key>` document
//! - `m\0commit_seq` last commit sequence
//!
//! Values are JSON.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use chrono::{DateTime, Utc};
use docket_common::{DocketError, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

const SEP: u8 = 0;
const COLLECTION_TAG: u8 = b'c';
const INDEX_TAG: u8 = b'i';
const DOCUMENT_TAG: u8 = b'd';
const META_TAG: u8 = b'm';

/// Persisted collection metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct CollectionRecord {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

fn tagged(tag: u8, parts: &[&[u8]]) -> Vec<u8> {
    let len = 2 + parts.iter().map(|p| p.len() + 1).sum::<usize>();
    let mut key = Vec::with_capacity(len);
    key.push(tag);
    key.push(SEP);
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(SEP);
        }
        key.extend_from_slice(part);
    }
    key
}

pub(crate) fn collections_prefix() -> Vec<u8> {
    vec![COLLECTION_TAG, SEP]
}

pub(crate) fn collection_key(collection: &str) -> Vec<u8> {
    tagged(COLLECTION_TAG, &[collection.as_bytes()])
}

pub(crate) fn index_prefix(collection: &str) -> Vec<u8> {
    tagged(INDEX_TAG, &[collection.as_bytes(), b""])
}

pub(crate) fn index_key(collection: &str, index: &str) -> Vec<u8> {
    tagged(INDEX_TAG, &[collection.as_bytes(), index.as_bytes()])
}

pub(crate) fn document_prefix(collection: &str) -> Vec<u8> {
    tagged(DOCUMENT_TAG, &[collection.as_bytes(), b""])
}

pub(crate) fn document_key(collection: &str, key: &str) -> Vec<u8> {
    tagged(DOCUMENT_TAG, &[collection.as_bytes(), key.as_bytes()])
}

pub(crate) fn commit_seq_key() -> Vec<u8> {
    tagged(META_TAG, &[b"commit_seq".as_slice()])
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(key: &[u8], bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        DocketError::Corruption(format!(
            "record '{}' is unreadable: {}",
            String::from_utf8_lossy(key).replace('\0', "/"),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(collection_key("emp"), b"c\0emp".to_vec());
        assert_eq!(index_key("emp", "OFFICE_IDX"), b"i\0emp\0OFFICE_IDX".to_vec());
        assert_eq!(document_key("emp", "AB12"), b"d\0emp\0AB12".to_vec());
        assert!(index_key("emp", "X").starts_with(&index_prefix("emp")));
        assert!(document_key("emp", "AB12").starts_with(&document_prefix("emp")));
        assert!(collection_key("emp").starts_with(&collections_prefix()));
        assert_eq!(commit_seq_key(), b"m\0commit_seq".to_vec());
    }

    #[test]
    fn test_prefixes_do_not_overlap_similar_names() {
        assert!(!document_key("emp2", "A").starts_with(&document_prefix("emp")));
        assert!(!index_key("emp2", "A").starts_with(&index_prefix("emp")));
    }

    #[test]
    fn test_decode_reports_corruption() {
        let err = decode::<CollectionRecord>(b"c\0emp", b"{not json").unwrap_err();
        assert!(matches!(err, DocketError::Corruption(ref m) if m.contains("c/emp")));
    }
}
