//! Disk-backed ordered store
//!
//! The default [`KvEngine`]: a full in-memory table made durable by a journal
//! and periodic table checkpoints.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::{Config, SyncStrategy};
use crate::error::Result;

use super::journal::{Journal, StoreOp};
use super::memtable::MemTable;
use super::table;
use super::KvEngine;

/// Ordered, durable key-value store
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader
///
/// - **Writes** (put/delete/checkpoint): serialized by the `journal` mutex;
///   journal append happens before the table is touched.
/// - **Reads** (get/scan/size): only take the table's read lock.
pub struct DiskStore {
    dir: PathBuf,
    table_path: PathBuf,
    memtable: MemTable,
    journal: Mutex<Journal>,
    checkpoint_threshold: u64,
}

impl DiskStore {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const JOURNAL_FILENAME: &'static str = "store.journal";
    const TABLE_FILENAME: &'static str = "store.table";

    /// Open or create the store described by `config`
    ///
    /// On startup:
    /// 1. Create the data directory
    /// 2. Load the last table checkpoint
    /// 3. Replay journal entries newer than the checkpoint
    pub fn open(config: &Config) -> Result<Self> {
        Self::open_with(&config.data_dir, config.sync_strategy, config.checkpoint_threshold)
    }

    /// Open with a path (convenience method), syncing every write
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open_with(path, SyncStrategy::EveryWrite, Config::default().checkpoint_threshold)
    }

    fn open_with(dir: &Path, sync_strategy: SyncStrategy, checkpoint_threshold: u64) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let table_path = dir.join(Self::TABLE_FILENAME);
        let journal_path = dir.join(Self::JOURNAL_FILENAME);

        let (checkpoint_lsn, entries) = table::read_table(&table_path)?;
        let memtable = MemTable::from_map(entries);

        let (journal, ops, recovery) = Journal::open(&journal_path, sync_strategy, checkpoint_lsn)?;
        for op in ops {
            match op {
                StoreOp::Put { key, value } => {
                    memtable.put(key, value);
                }
                StoreOp::Delete { key } => {
                    memtable.delete(&key);
                }
            }
        }

        if recovery.entries_recovered > 0 || recovery.was_truncated {
            tracing::info!(
                dir = %dir.display(),
                recovered = recovery.entries_recovered,
                skipped = recovery.entries_skipped,
                last_lsn = recovery.last_lsn,
                truncated = recovery.was_truncated,
                "store journal replayed"
            );
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            table_path,
            memtable,
            journal: Mutex::new(journal),
            checkpoint_threshold,
        })
    }

    /// Write the table and empty the journal
    pub fn checkpoint(&self) -> Result<()> {
        let mut journal = self.journal.lock();
        self.checkpoint_locked(&mut journal)
    }

    /// Called with the journal lock held, so no write can slip in between
    /// the table snapshot and the journal reset
    fn checkpoint_locked(&self, journal: &mut Journal) -> Result<()> {
        if journal.size() == 0 {
            return Ok(());
        }
        journal.sync()?;
        let last_lsn = journal.last_lsn();
        self.memtable
            .with_entries(|entries| table::write_table(&self.table_path, last_lsn, entries))?;
        journal.reset()?;
        tracing::debug!(
            dir = %self.dir.display(),
            last_lsn,
            entries = self.memtable.entry_count(),
            "store checkpoint written"
        );
        Ok(())
    }

    fn apply(&self, op: StoreOp) -> Result<()> {
        let mut journal = self.journal.lock();
        journal.append(&op)?;
        match op {
            StoreOp::Put { key, value } => {
                self.memtable.put(key, value);
            }
            StoreOp::Delete { key } => {
                self.memtable.delete(&key);
            }
        }
        if journal.size() >= self.checkpoint_threshold {
            self.checkpoint_locked(&mut journal)?;
        }
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_count(&self) -> usize {
        self.memtable.entry_count()
    }

    pub fn journal_size(&self) -> u64 {
        self.journal.lock().size()
    }
}

impl KvEngine for DiskStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.memtable.get(key))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.apply(StoreOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        })
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.apply(StoreOp::Delete { key: key.to_vec() })
    }

    fn scan_from(&self, start: &[u8], visit: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> Result<()> {
        self.memtable.scan_from(start, visit);
        Ok(())
    }

    fn approximate_size(&self, start: &[u8], end: &[u8]) -> Result<u64> {
        Ok(self.memtable.range_size(start, end))
    }

    fn sync(&self) -> Result<()> {
        self.journal.lock().sync()
    }

    fn close(&self) -> Result<()> {
        self.checkpoint()
    }
}
