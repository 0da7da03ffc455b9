//! # relaykv
//!
//! A key-value store fronted by HTTP with:
//! - A padded, append-only binlog written ahead of every mutation
//! - Recovery of the last record after an unclean shutdown
//! - Asynchronous master → slave replication over long-polling HTTP
//! - Echo suppression by origin node id
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Server                             │
//! │         /d/<key>   /range-get/<key>   /binlog/?f=&off=       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     Log Database                             │
//! │        (one mutex: active binlog, parked pulls, cursor)      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Binlog    │          │  KvEngine   │
//!   │  (Append)   │          │ (DiskStore) │
//!   └─────────────┘          └─────────────┘
//!
//!   Slave Sync ── HTTP pulls ──► master's /range-get, /binlog
//!        └── applies through its own Log Database
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod binlog;
pub mod logdb;
pub mod network;
pub mod protocol;
pub mod replication;
pub mod storage;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, MasterAddr, SyncStrategy};
pub use error::{RelayError, Result};
pub use logdb::{Fetch, LogDb};
pub use storage::{DiskStore, KvEngine};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of relaykv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
