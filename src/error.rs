//! Error types for relaykv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using RelayError
pub type Result<T> = std::result::Result<T, RelayError>;

/// Unified error type for relaykv operations
#[derive(Debug, Error)]
pub enum RelayError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Binlog Errors
    // -------------------------------------------------------------------------
    #[error("binlog corruption at offset {offset}: {reason}")]
    BinlogCorruption { offset: u64, reason: String },

    /// A frame header or payload runs past the end of the file. Scanners treat
    /// this as end-of-data; point reads report it.
    #[error("binlog frame truncated at offset {offset}")]
    BinlogTruncated { offset: u64 },

    #[error("log record format error: {0}")]
    RecordFormat(String),

    #[error("binlog disabled: no binlog directory configured")]
    BinlogDisabled,

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage corruption detected: {0}")]
    StorageCorruption(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network / Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Replication Errors
    // -------------------------------------------------------------------------
    #[error("position mismatch: response for '{echoed}', slave is at '{current}'")]
    PositionMismatch { echoed: String, current: String },

    #[error("requested position {file_index}:{offset} is ahead of the binlog end {end_index}:{end_offset}")]
    PositionAhead {
        file_index: i64,
        offset: i64,
        end_index: i64,
        end_offset: i64,
    },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for RelayError {
    fn from(e: bincode::Error) -> Self {
        RelayError::Serialization(e.to_string())
    }
}

impl From<hyper::Error> for RelayError {
    fn from(e: hyper::Error) -> Self {
        RelayError::Http(e.to_string())
    }
}

impl From<hyper::http::Error> for RelayError {
    fn from(e: hyper::http::Error) -> Self {
        RelayError::Http(e.to_string())
    }
}

impl RelayError {
    /// True for frame-level damage that a sequential scan should stop at
    /// rather than surface.
    pub fn is_torn_tail(&self) -> bool {
        matches!(self, RelayError::BinlogTruncated { .. })
    }
}
