//! Testing utilities and fixtures

use std::path::PathBuf;
use tempfile::TempDir;

/// Test context with automatic cleanup
pub struct TestContext {
    pub temp_dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.temp_dir.path().join("data")
    }

    pub fn wal_dir(&self) -> PathBuf {
        self.temp_dir.path().join("wal")
    }

    pub fn path(&self) -> &std::path::Path {
        self.temp_dir.path()
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Test fixtures for common scenarios
pub mod fixtures {
    /// Fill a buffer with a deterministic per-page byte pattern
    pub fn fill_patterned(buf: &mut [u8], seed: u64) {
        for (i, b) in buf.iter_mut().enumerate() {
            *b = (seed as u8).wrapping_add(i as u8).wrapping_mul(31);
        }
    }

    /// Generate a patterned page-sized payload
    pub fn patterned_page(len: usize, seed: u64) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        fill_patterned(&mut buf, seed);
        buf
    }

    /// Generate sample byte-string keys sharing prefixes
    pub fn sample_keys(count: usize) -> Vec<Vec<u8>> {
        (0..count)
            .map(|i| format!("key/{:04}", i).into_bytes())
            .collect()
    }
}
