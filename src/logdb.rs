//! Log Database
//!
//! Puts the binlog in front of the key-value store.
//!
//! ## Responsibilities
//! - Append every mutation to the binlog before it reaches the store
//! - Rotate binlog files by size
//! - Recover the last record after an unclean shutdown
//! - Answer binlog pulls, parking the ones that are already caught up
//! - Track this node's replication cursor when it is a slave
//!
//! ## Write Path
//! ```text
//!   write/remove/apply_log
//!          │
//!          ▼   (state lock held)
//!   ┌──────────────┐    ┌─────────────┐    ┌───────────────┐
//!   │ binlog-NNNNN │ ─► │  KvEngine   │ ─► │ parked pulls  │
//!   │   append     │    │ put/delete  │    │   answered    │
//!   └──────────────┘    └─────────────┘    └───────────────┘
//! ```
//! A failed append stops before the store is touched. A failed store write
//! after a good append is reported, but the frame stays and pulls are still
//! answered.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::binlog::{
    binlog_path, list_binlog_indices, LogFile, LogRecord, Operation, CLOSED_FILE, SLAVE_FILE,
};
use crate::config::{Config, MasterAddr};
use crate::error::{RelayError, Result};
use crate::protocol::{LogPos, SyncPos};
use crate::replication::{ParkedPull, ParkedPulls, PullBatch, SlaveStatus};
use crate::storage::KvEngine;

/// Outcome of a binlog pull
#[derive(Debug)]
pub enum Fetch {
    /// Data (possibly empty, when skipping to the next file) is available now
    Ready(PullBatch),

    /// The pull asked for the end of the binlog; await the handle
    Parked(ParkedPull),
}

/// The binlog-fronted key-value database
///
/// ## Concurrency Model
///
/// - **Mutations** (write/remove/apply) and binlog pulls serialize on
///   `state`: active file, rotation, parked pulls and slave cursor all live
///   behind that one mutex.
/// - **Reads** (get/scan) go straight to the store and never take it.
pub struct LogDb {
    config: Config,

    store: Arc<dyn KvEngine>,

    /// Binlog directory, `None` when the binlog is disabled
    binlog_dir: Option<PathBuf>,

    /// Where the slave status file lives
    status_path: PathBuf,

    state: Mutex<LogState>,

    next_pull_id: AtomicU64,
}

struct LogState {
    active: Option<ActiveLog>,
    parked: ParkedPulls,
    slave: Option<SlaveCursor>,
    closed: bool,
}

struct ActiveLog {
    index: i64,
    file: LogFile,
}

impl ActiveLog {
    fn end(&self) -> LogPos {
        LogPos::new(self.index, self.file.size() as i64)
    }
}

struct SlaveCursor {
    status: SlaveStatus,
    dirty: bool,
    last_flush: Instant,
}

impl LogDb {
    /// Open on top of an already opened store
    ///
    /// On startup:
    /// 1. Validate the node id when the binlog is enabled
    /// 2. Find the last binlog file, dropping a trailing empty one
    /// 3. After an unclean shutdown, re-apply the last record
    /// 4. Mark the binlog as open ("0") and open the active file
    /// 5. Load the slave cursor, if any
    pub fn open(config: Config, store: Arc<dyn KvEngine>) -> Result<Self> {
        let binlog_dir = config.binlog_dir.clone();

        // Step 1-4: binlog
        let active = match &binlog_dir {
            Some(dir) => {
                if config.node_id <= 0 {
                    return Err(RelayError::Config(format!(
                        "node id must be positive when the binlog is enabled, got {}",
                        config.node_id
                    )));
                }
                fs::create_dir_all(dir)?;
                Some(Self::open_binlog(dir, store.as_ref())?)
            }
            None => None,
        };

        // Step 5: slave cursor
        let status_dir = binlog_dir.as_deref().unwrap_or(&config.data_dir);
        fs::create_dir_all(status_dir)?;
        let status_path = status_dir.join(SLAVE_FILE);
        let slave = Self::load_slave(&status_path, config.master.as_ref())?.map(|status| {
            SlaveCursor {
                status,
                dirty: false,
                last_flush: Instant::now(),
            }
        });

        if let Some(active) = &active {
            info!(
                node_id = config.node_id,
                file_index = active.index,
                offset = active.file.size(),
                "binlog open"
            );
        } else {
            info!("binlog disabled");
        }

        Ok(Self {
            config,
            store,
            binlog_dir,
            status_path,
            state: Mutex::new(LogState {
                active,
                parked: ParkedPulls::new(),
                slave,
                closed: false,
            }),
            next_pull_id: AtomicU64::new(1),
        })
    }

    fn open_binlog(dir: &Path, store: &dyn KvEngine) -> Result<ActiveLog> {
        let mut indices = list_binlog_indices(dir)?;
        if let Some(&last) = indices.last() {
            if fs::metadata(binlog_path(dir, last))?.len() == 0 {
                indices.pop();
            }
        }
        let last = indices.last().copied();

        let marker = dir.join(CLOSED_FILE);
        match fs::read(&marker) {
            Ok(contents) if contents.as_slice() == b"1" => {}
            Ok(_) => {
                if let Some(last) = last {
                    warn!(file_index = last, "binlog was not closed cleanly");
                    Self::recover_last_record(&binlog_path(dir, last), store)?;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::write(&marker, b"0")?;

        let index = last.map_or(1, |l| l + 1);
        let file = LogFile::open(&binlog_path(dir, index), false)?;
        Ok(ActiveLog { index, file })
    }

    /// Re-apply the last record of `path` to the store
    ///
    /// The record may have reached the binlog without reaching the store.
    /// Applying it again is idempotent. A torn or corrupt tail means there is
    /// nothing to recover.
    fn recover_last_record(path: &Path, store: &dyn KvEngine) -> Result<()> {
        let mut file = LogFile::open(path, true)?;
        let mut frames = file.frames(0);
        let mut last = None;
        for frame in frames.by_ref() {
            match frame {
                Ok((offset, payload)) => last = Some((offset, payload)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt binlog tail, nothing to recover");
                    return Ok(());
                }
            }
        }
        if frames.hit_torn_tail() {
            warn!(path = %path.display(), offset = frames.offset(), "torn binlog tail, nothing to recover");
            return Ok(());
        }

        let Some((offset, payload)) = last else {
            return Ok(());
        };
        let record = match LogRecord::decode(&payload) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %path.display(), offset, error = %e, "last binlog record unreadable, nothing to recover");
                return Ok(());
            }
        };

        match record.operation {
            Operation::Write => store.put(&record.key, &record.value)?,
            Operation::Delete => store.delete(&record.key)?,
        }
        info!(
            path = %path.display(),
            offset,
            op = record.operation.as_str(),
            key = %String::from_utf8_lossy(&record.key),
            "re-applied last binlog record"
        );
        Ok(())
    }

    fn load_slave(path: &Path, configured: Option<&MasterAddr>) -> Result<Option<SlaveStatus>> {
        let saved = SlaveStatus::load(path)?;
        let status = match (saved, configured) {
            (Some(saved), Some(master)) if saved.master != *master => {
                warn!(
                    saved = %saved.master,
                    configured = %master,
                    "master changed, discarding saved slave position"
                );
                Some(SlaveStatus::new(master.clone()))
            }
            (Some(saved), _) => Some(saved),
            (None, Some(master)) => Some(SlaveStatus::new(master.clone())),
            (None, None) => None,
        };
        if let Some(status) = &status {
            info!(master = %status.master, pos = %status.pos, "slave position loaded");
        }
        Ok(status)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KvEngine> {
        &self.store
    }

    /// Node id stamped into records, `None` when the binlog is disabled
    pub fn node_id(&self) -> Option<i32> {
        self.binlog_dir.as_ref().map(|_| self.config.node_id)
    }

    pub fn binlog_dir(&self) -> Option<&Path> {
        self.binlog_dir.as_deref()
    }

    /// Current end of the binlog
    pub fn tail_position(&self) -> Result<LogPos> {
        let state = self.state.lock();
        state
            .active
            .as_ref()
            .map(ActiveLog::end)
            .ok_or(RelayError::BinlogDisabled)
    }

    /// Number of pulls waiting for data
    pub fn parked_count(&self) -> usize {
        self.state.lock().parked.len()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.store.get(key)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Store `value` under `key`
    pub fn write(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let record = LogRecord::write(self.config.node_id, key, value);
        self.commit(&record, &record.encode())
    }

    /// Remove `key`
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        let record = LogRecord::delete(self.config.node_id, key);
        self.commit(&record, &record.encode())
    }

    /// Apply an encoded record received from another node
    ///
    /// Records carrying this node's own id are dropped; they are writes this
    /// node made that came back around the replication loop.
    pub fn apply_log(&self, raw: &[u8]) -> Result<bool> {
        let record = LogRecord::decode(raw)?;
        if self.is_own(&record) {
            debug!(key = %String::from_utf8_lossy(&record.key), "skipping own record");
            return Ok(false);
        }
        self.commit(&record, raw)?;
        Ok(true)
    }

    /// Apply an already decoded record (bootstrap pairs)
    pub fn apply_record(&self, record: &LogRecord) -> Result<bool> {
        if self.is_own(record) {
            return Ok(false);
        }
        self.commit(record, &record.encode())?;
        Ok(true)
    }

    fn is_own(&self, record: &LogRecord) -> bool {
        self.node_id() == Some(record.origin_id)
    }

    fn commit(&self, record: &LogRecord, encoded: &[u8]) -> Result<()> {
        if self.binlog_dir.is_none() {
            return self.apply_to_store(record);
        }

        let mut state = self.state.lock();
        if state.closed {
            return Err(RelayError::Storage("log database is closed".to_string()));
        }

        // Step 1: binlog
        self.append_locked(&mut state, encoded)?;

        // Step 2: store
        let applied = self.apply_to_store(record);
        if let Err(e) = &applied {
            error!(
                op = record.operation.as_str(),
                key = %String::from_utf8_lossy(&record.key),
                error = %e,
                "store apply failed after binlog append"
            );
        }

        // Step 3: parked pulls
        self.notify_parked_locked(&mut state);

        applied
    }

    fn apply_to_store(&self, record: &LogRecord) -> Result<()> {
        match record.operation {
            Operation::Write => self.store.put(&record.key, &record.value),
            Operation::Delete => self.store.delete(&record.key),
        }
    }

    fn append_locked(&self, state: &mut LogState, encoded: &[u8]) -> Result<()> {
        let dir = self.binlog_dir.as_deref().ok_or(RelayError::BinlogDisabled)?;
        let active = state.active.as_mut().ok_or(RelayError::BinlogDisabled)?;

        if active.file.size() > self.config.binlog_size {
            // Sync and seal the old file, then open index + 1
            active.file.sync()?;
            let index = active.index + 1;
            let file = LogFile::open(&binlog_path(dir, index), false)?;
            let sealed = std::mem::replace(active, ActiveLog { index, file });
            info!(
                sealed = sealed.index,
                sealed_size = sealed.file.size(),
                file_index = index,
                "binlog rotated"
            );
        }

        active.file.append(encoded)?;
        Ok(())
    }

    // =========================================================================
    // Binlog Pulls
    // =========================================================================

    /// Pull binlog bytes starting at `pos`
    ///
    /// - `pos` equal to the end of the active file: parked until new data
    ///   or a heartbeat
    /// - `pos` past the end: rejected
    /// - otherwise: up to `batch_size` bytes of whole frames
    pub fn fetch_log(&self, pos: LogPos) -> Result<Fetch> {
        let mut state = self.state.lock();
        let end = state
            .active
            .as_ref()
            .map(ActiveLog::end)
            .ok_or(RelayError::BinlogDisabled)?;

        if pos == end {
            let id = self.next_pull_id.fetch_add(1, Ordering::Relaxed);
            debug!(id, pos = %pos, "binlog pull parked");
            return Ok(Fetch::Parked(state.parked.park(id, pos)));
        }

        self.read_batch_locked(&mut state, pos).map(Fetch::Ready)
    }

    fn read_batch_locked(&self, state: &mut LogState, pos: LogPos) -> Result<PullBatch> {
        let dir = self.binlog_dir.as_deref().ok_or(RelayError::BinlogDisabled)?;
        let active = state.active.as_mut().ok_or(RelayError::BinlogDisabled)?;
        let end = active.end();

        if pos > end || pos.offset < 0 {
            return Err(RelayError::PositionAhead {
                file_index: pos.file_index,
                offset: pos.offset,
                end_index: end.file_index,
                end_offset: end.offset,
            });
        }

        let batch_size = self.config.batch_size;
        let body = if pos.file_index == active.index {
            active.file.batch_record(pos.offset as u64, batch_size)?
        } else {
            match LogFile::open(&binlog_path(dir, pos.file_index), true) {
                Ok(mut sealed) => sealed.batch_record(pos.offset as u64, batch_size)?,
                Err(RelayError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(file_index = pos.file_index, "binlog file missing, skipping to the next one");
                    Vec::new()
                }
                Err(e) => return Err(e),
            }
        };

        let next = if body.is_empty() && pos.file_index < active.index {
            LogPos::new(pos.file_index + 1, 0)
        } else {
            LogPos::new(pos.file_index, pos.offset + body.len() as i64)
        };
        Ok(PullBatch { body, next })
    }

    fn notify_parked_locked(&self, state: &mut LogState) {
        if state.parked.is_empty() {
            return;
        }
        for (pos, reply) in state.parked.drain() {
            let batch = self.read_batch_locked(state, pos);
            if let Err(e) = &batch {
                warn!(pos = %pos, error = %e, "could not answer parked pull");
            }
            let _ = reply.send(batch);
        }
    }

    /// Answer every parked pull with no data (heartbeat)
    pub fn answer_parked_empty(&self) -> usize {
        let answered = self.state.lock().parked.answer_empty();
        if answered > 0 {
            debug!(answered, "parked pulls answered empty");
        }
        answered
    }

    // =========================================================================
    // Slave Cursor
    // =========================================================================

    /// Saved master and position, `None` when this node is not a slave
    pub fn slave_status(&self) -> Option<SlaveStatus> {
        self.state.lock().slave.as_ref().map(|s| s.status.clone())
    }

    /// Current replication cursor
    pub fn slave_pos(&self) -> Option<SyncPos> {
        self.state.lock().slave.as_ref().map(|s| s.status.pos.clone())
    }

    /// Advance the replication cursor
    ///
    /// The status file is rewritten at most once per flush interval; the
    /// latest position is always kept in memory.
    pub fn update_slave_pos(&self, pos: SyncPos) -> Result<()> {
        let mut state = self.state.lock();
        let slave = state
            .slave
            .as_mut()
            .ok_or_else(|| RelayError::Config("node has no master configured".to_string()))?;
        slave.status.pos = pos;
        slave.dirty = true;
        if slave.last_flush.elapsed() >= self.config.flush_slave_interval {
            Self::flush_slave_locked(slave, &self.status_path)?;
        }
        Ok(())
    }

    /// Write the slave status file now if it is behind
    pub fn flush_slave_status(&self) -> Result<()> {
        let mut state = self.state.lock();
        match state.slave.as_mut() {
            Some(slave) if slave.dirty => Self::flush_slave_locked(slave, &self.status_path),
            _ => Ok(()),
        }
    }

    fn flush_slave_locked(slave: &mut SlaveCursor, path: &Path) -> Result<()> {
        slave.status.save(path)?;
        slave.dirty = false;
        slave.last_flush = Instant::now();
        debug!(pos = %slave.status.pos, "slave position saved");
        Ok(())
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Shut down cleanly
    ///
    /// Answers parked pulls, saves the slave cursor, syncs the active file,
    /// writes the closed marker "1" and closes the store. Dropping without
    /// calling this leaves the marker at "0" and the next open recovers.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;

        state.parked.answer_empty();

        if let Some(slave) = state.slave.as_mut() {
            if slave.dirty {
                Self::flush_slave_locked(slave, &self.status_path)?;
            }
        }

        if let (Some(dir), Some(mut active)) = (self.binlog_dir.as_deref(), state.active.take()) {
            active.file.sync()?;
            fs::write(dir.join(CLOSED_FILE), b"1")?;
            info!(file_index = active.index, offset = active.file.size(), "binlog closed");
        }
        drop(state);

        self.store.close()
    }
}
