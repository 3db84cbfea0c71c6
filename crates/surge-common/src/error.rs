//! Error types for SurgeDB

use thiserror::Error;

/// Result type alias using SurgeDB's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for SurgeDB
#[derive(Error, Debug)]
pub enum Error {
    // Storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    // Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Page not found: {0}")]
    PageNotFound(u64),

    #[error("Page {0} out of bounds (file holds {1} pages)")]
    PageOutOfBounds(u64, u64),

    #[error("Buffer pool full")]
    BufferPoolFull,

    #[error("WAL write failed: {0}")]
    WalWriteFailed(String),

    #[error("Disk full")]
    DiskFull,

    #[error("I/O error: {0}")]
    IoError(String),
}

impl Error {
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Error::Storage(StorageError::IoError(msg.into()))
    }
}
