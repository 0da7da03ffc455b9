//! Replication Module
//!
//! Asynchronous master → slave replication over long-polling HTTP.
//!
//! ## Responsibilities
//! - Master: bounded range scans for bootstrap ([`scan_range`]) and parked
//!   binlog pulls answered on the next write ([`ParkedPulls`])
//! - Slave: the pull loop ([`SlaveSync`]) and its persisted cursor
//!   ([`SlaveStatus`])
//!
//! ## Flow
//! ```text
//!   slave                                   master
//!     │  GET /range-get/<key>  req-info ──►   │  scan_range
//!     │  ◄── pairs, next-info, origin-id      │
//!     │           ... key space exhausted ... │
//!     │  GET /binlog/?f=&off=  req-info ──►   │  fetch_log (parks at end)
//!     │  ◄── frames, next-info                │
//! ```

mod master;
mod parked;
mod slave;
mod status;

pub use master::{scan_range, RangeBatch};
pub use parked::{ParkedPull, ParkedPulls, PullBatch, PullReply};
pub use slave::{apply_frames, apply_pairs, apply_response, SlaveSync};
pub use status::SlaveStatus;
