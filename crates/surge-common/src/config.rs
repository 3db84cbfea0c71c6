//! Configuration types for SurgeDB

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory
    pub data_dir: PathBuf,

    /// WAL directory
    pub wal_dir: PathBuf,

    /// Number of frames in the buffer pool
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// K parameter of the LRU-K replacement policy
    #[serde(default = "default_replacer_k")]
    pub replacer_k: usize,
}

fn default_pool_size() -> usize {
    1024
}

fn default_replacer_k() -> usize {
    2
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            wal_dir: PathBuf::from("./wal"),
            pool_size: default_pool_size(),
            replacer_k: default_replacer_k(),
        }
    }
}

impl StorageConfig {
    /// Validate the configuration.
    /// Fatal errors are returned as `Err(Vec<String>)`.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.pool_size == 0 {
            errors.push("pool_size must be at least 1 frame".to_string());
        }

        if self.replacer_k == 0 {
            errors.push("replacer_k must be at least 1".to_string());
        }

        if self.data_dir == self.wal_dir {
            errors.push(format!(
                "data_dir and wal_dir must differ (both are {})",
                self.data_dir.display()
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
