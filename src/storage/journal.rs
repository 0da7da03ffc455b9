//! Store journal
//!
//! Append-only record of store mutations since the last table checkpoint.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Entry 1                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Entry 2 ...                             │
//! └─────────────────────────────────────────┘
//! ```
//! `Data` is a bincode-encoded [`StoreOp`]; the CRC covers `Data` only.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::SyncStrategy;
use crate::error::Result;

/// LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Upper bound on a single entry, guards against garbage length fields
const MAX_ENTRY_SIZE: usize = 256 * 1024 * 1024;

/// A journaled store mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// Outcome of replaying a journal on open
#[derive(Debug, Default)]
pub struct JournalRecovery {
    /// Entries replayed
    pub entries_recovered: u64,

    /// Entries skipped because a checkpoint already covers them
    pub entries_skipped: u64,

    /// Highest LSN seen
    pub last_lsn: u64,

    /// Whether a torn or corrupt tail was cut off
    pub was_truncated: bool,
}

/// Append handle over the journal file
pub struct Journal {
    file: File,
    path: PathBuf,
    next_lsn: u64,
    sync_strategy: SyncStrategy,
    unsynced: usize,
    len: u64,
}

impl Journal {
    /// Open the journal, returning it with the entries newer than
    /// `checkpoint_lsn` in log order
    pub fn open(
        path: &Path,
        sync_strategy: SyncStrategy,
        checkpoint_lsn: u64,
    ) -> Result<(Self, Vec<StoreOp>, JournalRecovery)> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;

        let mut recovery = JournalRecovery {
            last_lsn: checkpoint_lsn,
            ..Default::default()
        };
        let mut ops = Vec::new();
        let mut pos = 0usize;

        while pos < contents.len() {
            match decode_entry(&contents[pos..]) {
                Some((lsn, op, consumed)) => {
                    if lsn > checkpoint_lsn {
                        ops.push(op);
                        recovery.entries_recovered += 1;
                    } else {
                        recovery.entries_skipped += 1;
                    }
                    recovery.last_lsn = recovery.last_lsn.max(lsn);
                    pos += consumed;
                }
                None => {
                    tracing::warn!(
                        path = %path.display(),
                        offset = pos,
                        dropped = contents.len() - pos,
                        "store journal has a damaged tail, truncating"
                    );
                    file.set_len(pos as u64)?;
                    file.sync_all()?;
                    recovery.was_truncated = true;
                    break;
                }
            }
        }

        let journal = Self {
            file,
            path: path.to_path_buf(),
            next_lsn: recovery.last_lsn + 1,
            sync_strategy,
            unsynced: 0,
            len: pos as u64,
        };
        Ok((journal, ops, recovery))
    }

    /// Append an entry, returning its LSN
    pub fn append(&mut self, op: &StoreOp) -> Result<u64> {
        let data = bincode::serialize(op)?;
        let lsn = self.next_lsn;

        let mut buf = Vec::with_capacity(HEADER_SIZE + data.len());
        buf.extend_from_slice(&lsn.to_le_bytes());
        buf.extend_from_slice(&crc32fast::hash(&data).to_le_bytes());
        buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
        buf.extend_from_slice(&data);

        if let Err(e) = self.file.write_all(&buf) {
            tracing::error!(path = %self.path.display(), lsn, error = %e, "journal append failed");
            if let Err(trunc) = self.file.set_len(self.len) {
                // Replay truncates the partial entry on the next open
                tracing::error!(error = %trunc, "could not cut back partial journal entry");
            }
            return Err(e.into());
        }
        self.len += buf.len() as u64;
        self.next_lsn += 1;
        self.unsynced += 1;

        let due = match self.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNEntries { count } => self.unsynced >= count,
        };
        if due {
            self.sync()?;
        }
        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        if self.unsynced > 0 {
            self.file.sync_data()?;
            self.unsynced = 0;
        }
        Ok(())
    }

    /// Drop every entry; called once a checkpoint covers them
    pub fn reset(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.len = 0;
        self.unsynced = 0;
        Ok(())
    }

    /// LSN of the most recent entry
    pub fn last_lsn(&self) -> u64 {
        self.next_lsn - 1
    }

    /// Current file length in bytes
    pub fn size(&self) -> u64 {
        self.len
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Decode one entry at the start of `buf`; `None` for torn or corrupt data
fn decode_entry(buf: &[u8]) -> Option<(u64, StoreOp, usize)> {
    if buf.len() < HEADER_SIZE {
        return None;
    }
    let lsn = u64::from_le_bytes(buf[0..8].try_into().ok()?);
    let crc = u32::from_le_bytes(buf[8..12].try_into().ok()?);
    let len = u32::from_le_bytes(buf[12..16].try_into().ok()?) as usize;
    if len > MAX_ENTRY_SIZE || buf.len() < HEADER_SIZE + len {
        return None;
    }
    let data = &buf[HEADER_SIZE..HEADER_SIZE + len];
    if crc32fast::hash(data) != crc {
        return None;
    }
    let op = bincode::deserialize(data).ok()?;
    Some((lsn, op, HEADER_SIZE + len))
}
