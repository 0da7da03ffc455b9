//! Binlog Module
//!
//! Write-ahead log shared by durability and replication.
//!
//! ## Responsibilities
//! - Append one padded frame per mutation before the store is touched
//! - Detect torn and corrupt frames without a separate index
//! - Serve bounded batches of raw frames to slaves
//! - Name and discover rotation segments
//!
//! ## Directory Layout
//! ```text
//! {binlog_dir}/
//!   ├── binlog-00001     (sealed)
//!   ├── binlog-00002     (active, append-only)
//!   ├── closed           ("0" while running, "1" after a clean shutdown)
//!   └── slave-status     (replication cursor, slaves only)
//! ```

mod file;
mod frame;
mod record;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub use file::{FileFrames, LogFile};
pub use frame::{decode_header, encode_frame, padded_len, Frames, FRAME_HEADER_SIZE, FRAME_MAGIC};
pub use record::{LogRecord, Operation, FIXED_SIZE};

/// Filename prefix of binlog segments
pub const BINLOG_PREFIX: &str = "binlog-";

/// Clean-shutdown marker file
pub const CLOSED_FILE: &str = "closed";

/// Persisted slave cursor
pub const SLAVE_FILE: &str = "slave-status";

/// "binlog-00042" for index 42
pub fn binlog_file_name(index: i64) -> String {
    format!("{}{:05}", BINLOG_PREFIX, index)
}

pub fn binlog_path(dir: &Path, index: i64) -> PathBuf {
    dir.join(binlog_file_name(index))
}

/// "binlog-00042" → Some(42)
pub fn parse_binlog_index(name: &str) -> Option<i64> {
    let digits = name.strip_prefix(BINLOG_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|&n: &i64| n > 0)
}

/// Indices of all binlog segments in `dir`, ascending
pub fn list_binlog_indices(dir: &Path) -> Result<Vec<i64>> {
    let mut indices = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(index) = entry.file_name().to_str().and_then(parse_binlog_index) {
            indices.push(index);
        }
    }
    indices.sort_unstable();
    Ok(indices)
}
