//! Replication position cursor
//!
//! Carried in the `req-info` / `next-info` headers as
//! `"<fileIndex> <byteOffset> <bootstrapDone> <resumeKey>"`. The key is
//! percent-encoded, which keeps the header visible ASCII for any key bytes.
//! It is also the last field, so a legacy unescaped key with spaces still
//! parses.

use std::fmt;

use super::{escape_key, unescape_key};
use crate::error::{RelayError, Result};

/// A byte position in the binlog: segment index and offset within it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogPos {
    pub file_index: i64,
    pub offset: i64,
}

impl LogPos {
    pub fn new(file_index: i64, offset: i64) -> Self {
        Self { file_index, offset }
    }
}

impl fmt::Display for LogPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_index, self.offset)
    }
}

/// Replication bookmark of a slave
///
/// Field order gives the derived progress order:
/// `(bootstrap_done, file_index, offset, resume_key)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SyncPos {
    /// false: copying the master's key range; true: tailing its binlog
    pub bootstrap_done: bool,

    pub file_index: i64,

    pub offset: i64,

    /// Last key copied during bootstrap; empty once tailing
    pub resume_key: Vec<u8>,
}

impl SyncPos {
    /// Cursor of a slave that has copied nothing yet
    pub fn initial() -> Self {
        Self::default()
    }

    /// Cursor tailing the binlog at `pos`
    pub fn tailing(pos: LogPos) -> Self {
        Self {
            bootstrap_done: true,
            file_index: pos.file_index,
            offset: pos.offset,
            resume_key: Vec::new(),
        }
    }

    pub fn log_pos(&self) -> LogPos {
        LogPos::new(self.file_index, self.offset)
    }

    /// Header form
    pub fn to_header(&self) -> String {
        format!(
            "{} {} {} {}",
            self.file_index,
            self.offset,
            u8::from(self.bootstrap_done),
            escape_key(&self.resume_key)
        )
    }

    /// Parse the header form
    pub fn parse_header(value: &str) -> Result<Self> {
        let bad = |why: &str| RelayError::Protocol(format!("bad position '{}': {}", value, why));

        let mut fields = value.splitn(4, ' ');
        let file_index = fields
            .next()
            .and_then(|f| f.parse::<i64>().ok())
            .ok_or_else(|| bad("file index"))?;
        let offset = fields
            .next()
            .and_then(|f| f.parse::<i64>().ok())
            .ok_or_else(|| bad("offset"))?;
        let bootstrap_done = match fields.next() {
            Some("0") => false,
            Some("1") => true,
            _ => return Err(bad("bootstrap flag")),
        };
        let resume_key = unescape_key(fields.next().unwrap_or(""));

        if file_index < 0 || offset < 0 {
            return Err(bad("negative field"));
        }

        Ok(Self {
            bootstrap_done,
            file_index,
            offset,
            resume_key,
        })
    }

    /// Path and query of the pull that continues from this cursor
    pub fn request_uri(&self) -> String {
        if self.bootstrap_done {
            format!(
                "{}?f={:05}&off={}",
                super::BINLOG_PATH,
                self.file_index,
                self.offset
            )
        } else if self.resume_key.is_empty() {
            format!("{}?inc=1", super::RANGE_PREFIX)
        } else {
            format!(
                "{}{}?inc=0",
                super::RANGE_PREFIX,
                escape_key(&self.resume_key)
            )
        }
    }
}

impl fmt::Display for SyncPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_header())
    }
}
