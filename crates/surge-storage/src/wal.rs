//! Write-ahead log sink for SurgeDB.
//!
//! The buffer pool accepts a [`LogManager`] at construction so higher layers
//! can route their log records through the same handle; the pool itself never
//! writes to it. Recovery is out of scope, so the sink is append-only:
//!
//! ```text
//! +-------------+
//! | length (4B) |
//! +-------------+
//! | payload     |
//! +-------------+
//! ```

use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use surge_common::error::StorageError;
use surge_common::prelude::*;

/// Record length prefix size: 4 bytes
pub const WAL_FRAME_HEADER_SIZE: usize = 4;

/// Append-only write-ahead log sink.
pub struct LogManager {
    /// Path to the log file
    log_path: PathBuf,
    /// File handle, append mode
    file: Mutex<File>,
    /// LSN of the next record to append
    next_lsn: AtomicU64,
}

impl LogManager {
    /// Open (or create) the log file at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let log_path = path.as_ref().to_path_buf();
        if let Some(parent) = log_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            log_path,
            file: Mutex::new(file),
            next_lsn: AtomicU64::new(1),
        })
    }

    /// Append one record, returning its assigned LSN.
    pub fn append(&self, payload: &[u8]) -> Result<Lsn> {
        if payload.len() > u32::MAX as usize {
            return Err(StorageError::WalWriteFailed(format!(
                "record of {} bytes exceeds frame limit",
                payload.len()
            ))
            .into());
        }

        let mut framed = BytesMut::with_capacity(WAL_FRAME_HEADER_SIZE + payload.len());
        framed.put_u32_le(payload.len() as u32);
        framed.put_slice(payload);

        let mut file = self.file.lock();
        file.write_all(&framed)
            .map_err(|e| StorageError::WalWriteFailed(e.to_string()))?;
        // LSN assignment happens under the file lock so LSN order matches
        // file order.
        let lsn = Lsn(self.next_lsn.fetch_add(1, Ordering::Relaxed));
        trace!(lsn = lsn.0, len = payload.len(), "appended WAL record");
        Ok(lsn)
    }

    /// Sync appended records to durable storage.
    pub fn flush(&self) -> Result<()> {
        let file = self.file.lock();
        file.sync_all()?;
        Ok(())
    }

    /// LSN that the next append will receive.
    pub fn current_lsn(&self) -> Lsn {
        Lsn(self.next_lsn.load(Ordering::Relaxed))
    }

    /// Get the log file path.
    pub fn path(&self) -> &Path {
        &self.log_path
    }
}
