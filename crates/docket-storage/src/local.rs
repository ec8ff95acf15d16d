//! Docket Local Backend - Append-Only Batch Log
//!
//! Durable backend for a local data directory. Every applied `WriteBatch` is
//! appended to `docket.log` as one checksummed frame before it becomes
//! visible; the full record table lives in memory and is rebuilt by
//! replaying the log on open.
//!
//! Frame layout: `payload_len u32 LE | payload | crc32(payload) u32 LE`.
//! Payload layout: `op_count u32 LE` followed by each op as
//! `tag u8 | key_len u32 LE | key | [value_len u32 LE | value]`.
//!
//! A torn or corrupt tail (crash during append) is truncated on open; frames
//! before it are kept.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::backend::{BatchOp, RecordMap, StorageBackend, StorageStats, WriteBatch};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use docket_common::utils::{crc32, verify_crc32};
use docket_common::{DocketError, Result};
use parking_lot::{Mutex, RwLock};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

// =============================================================================
// Constants
// =============================================================================

pub const LOG_FILE_NAME: &str = "docket.log";
const COMPACT_FILE_NAME: &str = "docket.log.compact";

/// Length prefix plus trailing checksum.
const FRAME_OVERHEAD: usize = 8;

const OP_PUT: u8 = 1;
const OP_DELETE: u8 = 2;
const OP_DELETE_PREFIX: u8 = 3;

// =============================================================================
// Frame Codec
// =============================================================================

/// Encode a batch as a single log frame.
pub(crate) fn encode_frame(ops: &[BatchOp]) -> Bytes {
    let mut payload = BytesMut::new();
    payload.put_u32_le(ops.len() as u32);

    for op in ops {
        match op {
            BatchOp::Put { key, value } => {
                payload.put_u8(OP_PUT);
                payload.put_u32_le(key.len() as u32);
                payload.put_slice(key);
                payload.put_u32_le(value.len() as u32);
                payload.put_slice(value);
            }
            BatchOp::Delete { key } => {
                payload.put_u8(OP_DELETE);
                payload.put_u32_le(key.len() as u32);
                payload.put_slice(key);
            }
            BatchOp::DeletePrefix { prefix } => {
                payload.put_u8(OP_DELETE_PREFIX);
                payload.put_u32_le(prefix.len() as u32);
                payload.put_slice(prefix);
            }
        }
    }

    let mut frame = BytesMut::with_capacity(payload.len() + FRAME_OVERHEAD);
    frame.put_u32_le(payload.len() as u32);
    frame.put_slice(&payload);
    frame.put_u32_le(crc32(&payload));
    frame.freeze()
}

fn take_u32(buf: &mut &[u8]) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(DocketError::Corruption("log payload truncated".to_string()));
    }
    Ok(buf.get_u32_le())
}

fn take_bytes(buf: &mut &[u8]) -> Result<Vec<u8>> {
    let len = take_u32(buf)? as usize;
    if buf.remaining() < len {
        return Err(DocketError::Corruption("log payload truncated".to_string()));
    }
    let out = buf[..len].to_vec();
    buf.advance(len);
    Ok(out)
}

/// Decode a checksum-verified frame payload.
pub(crate) fn decode_payload(payload: &[u8]) -> Result<Vec<BatchOp>> {
    let mut buf = payload;
    let count = take_u32(&mut buf)? as usize;
    let mut ops = Vec::with_capacity(count.min(4096));

    for _ in 0..count {
        if !buf.has_remaining() {
            return Err(DocketError::Corruption("log payload truncated".to_string()));
        }
        let op = match buf.get_u8() {
            OP_PUT => {
                let key = take_bytes(&mut buf)?;
                let value = Bytes::from(take_bytes(&mut buf)?);
                BatchOp::Put { key, value }
            }
            OP_DELETE => BatchOp::Delete {
                key: take_bytes(&mut buf)?,
            },
            OP_DELETE_PREFIX => BatchOp::DeletePrefix {
                prefix: take_bytes(&mut buf)?,
            },
            tag => {
                return Err(DocketError::Corruption(format!(
                    "unknown log op tag {}",
                    tag
                )))
            }
        };
        ops.push(op);
    }

    if buf.has_remaining() {
        return Err(DocketError::Corruption(
            "trailing bytes in log payload".to_string(),
        ));
    }

    Ok(ops)
}

// =============================================================================
// Replay
// =============================================================================

struct ReplayResult {
    records: RecordMap,
    stats: StorageStats,
    valid_len: u64,
    file_len: u64,
    frames: usize,
}

fn replay(path: &Path) -> Result<ReplayResult> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e.into()),
    };

    let mut records = RecordMap::default();
    let mut stats = StorageStats::default();
    let mut offset = 0usize;
    let mut frames = 0usize;

    while offset < data.len() {
        let remaining = data.len() - offset;
        if remaining < FRAME_OVERHEAD {
            tracing::warn!("Torn log frame header at offset {}", offset);
            break;
        }

        let mut header = &data[offset..];
        let payload_len = header.get_u32_le() as usize;
        if payload_len + FRAME_OVERHEAD > remaining {
            tracing::warn!("Torn log frame at offset {}", offset);
            break;
        }

        let payload = &data[offset + 4..offset + 4 + payload_len];
        let mut trailer = &data[offset + 4 + payload_len..];
        let checksum = trailer.get_u32_le();
        if !verify_crc32(payload, checksum) {
            tracing::warn!("Log frame checksum mismatch at offset {}", offset);
            break;
        }

        let ops = decode_payload(payload)?;
        records.apply(&ops, &mut stats);
        offset += payload_len + FRAME_OVERHEAD;
        frames += 1;
    }

    // Replay is not counted as I/O activity.
    let stats = StorageStats {
        total_records: stats.total_records,
        total_bytes: stats.total_bytes,
        ..Default::default()
    };

    Ok(ReplayResult {
        records,
        stats,
        valid_len: offset as u64,
        file_len: data.len() as u64,
        frames,
    })
}

// =============================================================================
// Log File
// =============================================================================

struct LogFile {
    file: File,
    len: u64,
}

impl LogFile {
    fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }

    /// Append a frame; on failure the file is cut back to its previous length
    /// so later frames never follow a torn one.
    fn append(&mut self, frame: &[u8], sync: bool) -> Result<()> {
        let result = self.file.write_all(frame).and_then(|_| {
            if sync {
                self.file.sync_data()
            } else {
                Ok(())
            }
        });

        match result {
            Ok(()) => {
                self.len += frame.len() as u64;
                Ok(())
            }
            Err(e) => {
                if let Err(trunc) = self.file.set_len(self.len) {
                    tracing::error!("Failed to truncate log after write error: {}", trunc);
                }
                Err(DocketError::Storage(format!("log append failed: {}", e)))
            }
        }
    }
}

// =============================================================================
// Local Backend
// =============================================================================

/// Local filesystem backend over an append-only batch log.
pub struct LocalBackend {
    data_dir: PathBuf,
    sync_writes: bool,
    log: Mutex<LogFile>,
    records: RwLock<RecordMap>,
    stats: RwLock<StorageStats>,
}

impl LocalBackend {
    /// Open (or create) the log in `data_dir` and replay it.
    pub fn open(data_dir: impl Into<PathBuf>, sync_writes: bool) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;

        let log_path = data_dir.join(LOG_FILE_NAME);
        let replayed = replay(&log_path)?;

        if replayed.valid_len < replayed.file_len {
            tracing::warn!(
                "Truncating {} trailing bytes from {:?}",
                replayed.file_len - replayed.valid_len,
                log_path
            );
            let file = OpenOptions::new().write(true).open(&log_path)?;
            file.set_len(replayed.valid_len)?;
            file.sync_all()?;
        }

        tracing::info!(
            "Replayed {} log frames ({} records) from {:?}",
            replayed.frames,
            replayed.records.len(),
            log_path
        );

        Ok(Self {
            data_dir,
            sync_writes,
            log: Mutex::new(LogFile::open(&log_path)?),
            records: RwLock::new(replayed.records),
            stats: RwLock::new(replayed.stats),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(LOG_FILE_NAME)
    }

    /// Current size of the log file in bytes.
    pub fn log_len(&self) -> u64 {
        self.log.lock().len
    }
}

impl StorageBackend for LocalBackend {
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
        if batch.is_empty() {
            return Ok(());
        }

        let frame = encode_frame(batch.ops());
        let mut log = self.log.lock();
        log.append(&frame, self.sync_writes)?;

        let mut records = self.records.write();
        let mut stats = self.stats.write();
        records.apply(batch.ops(), &mut stats);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.log.lock().file.sync_all()?;
        Ok(())
    }

    fn compact(&self) -> Result<()> {
        let mut log = self.log.lock();
        let records = self.records.read();

        let ops: Vec<BatchOp> = records
            .iter()
            .map(|(key, value)| BatchOp::Put {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();
        let frame = encode_frame(&ops);

        let tmp_path = self.data_dir.join(COMPACT_FILE_NAME);
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&frame)?;
            tmp.sync_all()?;
        }

        let log_path = self.log_path();
        let before = log.len;
        std::fs::rename(&tmp_path, &log_path)?;
        *log = LogFile::open(&log_path)?;

        tracing::info!(
            "Compacted log {:?}: {} -> {} bytes ({} records)",
            log_path,
            before,
            log.len,
            records.len()
        );
        Ok(())
    }

    fn stats(&self) -> StorageStats {
        self.stats.read().clone()
    }
}

// =============================================================================
// Tests
// =============================================================================
