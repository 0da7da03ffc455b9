//! Configuration for relaykv
//!
//! Centralized configuration with sensible defaults. Every component gets the
//! values it needs from here at construction; nothing is read from globals.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::RelayError;

/// Main configuration for a relaykv node
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory of the key-value store
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── store.journal    (store journal)
    ///     └── store.table      (last checkpoint)
    pub data_dir: PathBuf,

    /// Sync strategy: how often to fsync the store journal
    pub sync_strategy: SyncStrategy,

    /// Journal size (in bytes) that triggers a table checkpoint
    pub checkpoint_threshold: u64,

    // -------------------------------------------------------------------------
    // Binlog Configuration
    // -------------------------------------------------------------------------
    /// Binlog directory; `None` disables the binlog and replication serving
    pub binlog_dir: Option<PathBuf>,

    /// This node's id, stamped into every record it produces (must be > 0
    /// when the binlog is enabled)
    pub node_id: i32,

    /// Rotate the active binlog file once it grows past this many bytes
    pub binlog_size: u64,

    // -------------------------------------------------------------------------
    // Replication Configuration
    // -------------------------------------------------------------------------
    /// Max key/value pairs in one range-get response
    pub batch_count: usize,

    /// Max bytes in one range-get or binlog response
    pub batch_size: usize,

    /// Master to replicate from, if this node is a slave
    pub master: Option<MasterAddr>,

    /// Delay before reconnecting to the master after a failure
    pub reconnect_delay: Duration,

    /// Min time between two writes of the slave position file
    pub flush_slave_interval: Duration,

    /// How often parked binlog pulls are answered with empty data
    pub heartbeat_interval: Duration,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// HTTP listen address
    pub listen_addr: String,
}

/// Journal sync strategy
#[derive(Debug, Clone, Copy)]
pub enum SyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

/// Address of a replication master
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterAddr {
    pub host: String,
    pub port: u16,
}

impl MasterAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for MasterAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for MasterAddr {
    type Err = RelayError;

    /// Parse "host:port"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| RelayError::Config(format!("master address '{}' is not host:port", s)))?;
        if host.is_empty() {
            return Err(RelayError::Config(format!("master address '{}' has no host", s)));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| RelayError::Config(format!("master port in '{}': {}", s, e)))?;
        Ok(Self::new(host, port))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./relaykv_data"),
            sync_strategy: SyncStrategy::EveryNEntries { count: 100 },
            checkpoint_threshold: 64 * 1024 * 1024, // 64 MB
            binlog_dir: None,
            node_id: 0,
            binlog_size: 64 * 1024 * 1024, // 64 MB
            batch_count: 100 * 1000,
            batch_size: 3 * 1024 * 1024, // 3 MB
            master: None,
            reconnect_delay: Duration::from_secs(3),
            flush_slave_interval: Duration::from_secs(3),
            heartbeat_interval: Duration::from_secs(10),
            listen_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Whether this node writes a binlog
    pub fn binlog_enabled(&self) -> bool {
        self.binlog_dir.is_some()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the store directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the journal sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the journal size that triggers a checkpoint (in bytes)
    pub fn checkpoint_threshold(mut self, bytes: u64) -> Self {
        self.config.checkpoint_threshold = bytes;
        self
    }

    /// Enable the binlog in the given directory
    pub fn binlog_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.binlog_dir = Some(path.into());
        self
    }

    /// Set this node's id
    pub fn node_id(mut self, id: i32) -> Self {
        self.config.node_id = id;
        self
    }

    /// Set the binlog rotation threshold (in bytes)
    pub fn binlog_size(mut self, bytes: u64) -> Self {
        self.config.binlog_size = bytes;
        self
    }

    /// Set the max pairs per range-get response
    pub fn batch_count(mut self, count: usize) -> Self {
        self.config.batch_count = count;
        self
    }

    /// Set the max bytes per replication response
    pub fn batch_size(mut self, bytes: usize) -> Self {
        self.config.batch_size = bytes;
        self
    }

    /// Replicate from the given master
    pub fn master(mut self, master: MasterAddr) -> Self {
        self.config.master = Some(master);
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    pub fn flush_slave_interval(mut self, interval: Duration) -> Self {
        self.config.flush_slave_interval = interval;
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Set the HTTP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
