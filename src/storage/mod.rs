//! Storage Module
//!
//! The ordered key-value engine underneath the binlog.
//!
//! ## Responsibilities
//! - Point get/put/delete by exact key
//! - Forward iteration over the key space (bootstrap range scans)
//! - Approximate byte size of a key range
//! - Durability of applied mutations across restarts
//!
//! The [`LogDb`](crate::logdb::LogDb) only talks to the [`KvEngine`] trait;
//! [`DiskStore`] is the implementation this crate ships.

mod journal;
mod memtable;
mod store;
mod table;

pub use journal::{Journal, JournalRecovery, StoreOp};
pub use memtable::MemTable;
pub use store::DiskStore;

pub(crate) use table::sync_parent_dir;

use crate::error::Result;

/// Ordered key-value storage engine
///
/// Reads must be safe to call concurrently with each other and with a
/// writer; the binlog layer never locks around them.
pub trait KvEngine: Send + Sync {
    /// Value stored under `key`
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Insert or replace
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove; absent keys are not an error
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Visit pairs in key order starting at `start` (inclusive) until
    /// `visit` returns false. The visitor must not call back into the engine.
    fn scan_from(&self, start: &[u8], visit: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> Result<()>;

    /// Approximate bytes stored for keys in `[start, end)`; empty `end` is
    /// unbounded
    fn approximate_size(&self, start: &[u8], end: &[u8]) -> Result<u64>;

    /// Flush buffered writes to stable storage
    fn sync(&self) -> Result<()>;

    /// Flush everything before shutdown
    fn close(&self) -> Result<()> {
        self.sync()
    }
}
