//! Disk manager for SurgeDB.
//!
//! Reads and writes fixed-size pages at `page_id * PAGE_SIZE` offsets in a
//! single database file. The buffer pool owns page-id allocation; the disk
//! manager only sees reads and writes on ids the pool considers valid.

use crate::PAGE_SIZE;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use surge_common::prelude::*;

/// Disk manager for reading and writing pages.
pub struct DiskManager {
    /// Path to the database file
    db_path: PathBuf,
    /// File handle
    file: Mutex<File>,
}

impl DiskManager {
    /// Create a new disk manager, creating the file if it doesn't exist.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        Ok(Self {
            db_path,
            file: Mutex::new(file),
        })
    }

    /// Read a page from disk into the caller-provided buffer.
    ///
    /// Pages the pool has allocated but never flushed have no bytes on disk
    /// yet; the portion past end-of-file reads as zeroes.
    pub fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        let offset = page_id.0 * PAGE_SIZE as u64;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if filled < buf.len() {
            trace!(page_id = page_id.0, filled, "short read, zero-filling tail");
            buf[filled..].fill(0);
        }
        Ok(())
    }

    /// Write a page to disk from the caller-provided buffer.
    pub fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        let offset = page_id.0 * PAGE_SIZE as u64;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        Ok(())
    }

    /// Sync file to disk.
    pub fn sync(&self) -> Result<()> {
        let file = self.file.lock();
        file.sync_all()?;
        Ok(())
    }

    /// Get the database file path.
    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surge_common::testing::{fixtures, TestContext};

    #[test]
    fn test_disk_manager_new() {
        let ctx = TestContext::new();
        let dm = DiskManager::new(ctx.path().join("test.db")).unwrap();
        assert!(dm.path().exists());
    }

    #[test]
    fn test_disk_manager_creates_parent_dirs() {
        let ctx = TestContext::new();
        let dm = DiskManager::new(ctx.data_dir().join("surge.db")).unwrap();
        assert!(dm.path().exists());
    }

    #[test]
    fn test_read_write_round_trip() {
        let ctx = TestContext::new();
        let dm = DiskManager::new(ctx.path().join("test.db")).unwrap();

        let payload = fixtures::patterned_page(PAGE_SIZE, 3);
        dm.write_page(PageId(3), &payload).unwrap();

        let mut buf = vec![0u8; PAGE_SIZE];
        dm.read_page(PageId(3), &mut buf).unwrap();
        assert_eq!(buf, payload);
    }

    #[test]
    fn test_unwritten_page_reads_zeroes() {
        let ctx = TestContext::new();
        let dm = DiskManager::new(ctx.path().join("test.db")).unwrap();

        let mut buf = fixtures::patterned_page(PAGE_SIZE, 1);
        dm.read_page(PageId(9), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_partial_tail_zero_filled() {
        let ctx = TestContext::new();
        let dm = DiskManager::new(ctx.path().join("test.db")).unwrap();

        // Write page 0 only; page 1 starts exactly at EOF.
        dm.write_page(PageId(0), &fixtures::patterned_page(PAGE_SIZE, 5))
            .unwrap();

        let mut buf = fixtures::patterned_page(PAGE_SIZE, 6);
        dm.read_page(PageId(1), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_writes_persist_across_reopen() {
        let ctx = TestContext::new();
        let path = ctx.path().join("test.db");
        let payload = fixtures::patterned_page(PAGE_SIZE, 11);

        {
            let dm = DiskManager::new(&path).unwrap();
            dm.write_page(PageId(2), &payload).unwrap();
            dm.sync().unwrap();
        }

        let dm = DiskManager::new(&path).unwrap();
        let mut buf = vec![0u8; PAGE_SIZE];
        dm.read_page(PageId(2), &mut buf).unwrap();
        assert_eq!(buf, payload);
    }
}
