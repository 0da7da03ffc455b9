//! Persisted slave status
//!
//! ```text
//! 127.0.0.1	# master host
//! 8080	# master port
//! user:42	# resume key
//! 3	# binlog file index
//! 4096	# binlog offset
//! 1	# bootstrap done
//! ```
//! One value per line, each followed by a tab-separated comment. The resume
//! key is percent-encoded so any key bytes fit on one line. Rewritten
//! through a temp file and a rename so a crash leaves either the old or the
//! new cursor.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::config::MasterAddr;
use crate::error::{RelayError, Result};
use crate::protocol::{escape_key, unescape_key, SyncPos};
use crate::storage::sync_parent_dir;

/// Where a slave replicates from and how far it got
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaveStatus {
    pub master: MasterAddr,
    pub pos: SyncPos,
}

impl SlaveStatus {
    pub fn new(master: MasterAddr) -> Self {
        Self {
            master,
            pos: SyncPos::initial(),
        }
    }

    /// Render the file contents
    pub fn to_text(&self) -> String {
        format!(
            "{}\t# master host\n{}\t# master port\n{}\t# resume key\n{}\t# binlog file index\n{}\t# binlog offset\n{}\t# bootstrap done\n",
            self.master.host,
            self.master.port,
            escape_key(&self.pos.resume_key),
            self.pos.file_index,
            self.pos.offset,
            u8::from(self.pos.bootstrap_done),
        )
    }

    /// Parse file contents
    pub fn parse(text: &str) -> Result<Self> {
        let values: Vec<&str> = text
            .lines()
            .map(|line| match line.split_once("\t#") {
                Some((value, _comment)) => value,
                None => line,
            })
            .collect();

        if values.len() < 5 {
            return Err(RelayError::Config(format!(
                "slave status needs at least 5 lines, found {}",
                values.len()
            )));
        }

        let field = |i: usize, what: &str| -> Result<i64> {
            values[i].trim().parse::<i64>().map_err(|_| {
                RelayError::Config(format!("slave status {}: '{}'", what, values[i]))
            })
        };

        let host = values[0].trim();
        if host.is_empty() {
            return Err(RelayError::Config("slave status has no master host".to_string()));
        }
        let port = u16::try_from(field(1, "port")?)
            .map_err(|_| RelayError::Config(format!("slave status port '{}'", values[1])))?;
        let resume_key = unescape_key(values[2]);
        let file_index = field(3, "file index")?;
        let offset = field(4, "offset")?;
        let bootstrap_done = match values.get(5).map(|v| v.trim()) {
            Some("1") => true,
            Some("0") => false,
            None | Some("") => file_index > 0,
            Some(other) => {
                return Err(RelayError::Config(format!(
                    "slave status bootstrap flag '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            master: MasterAddr::new(host, port),
            pos: SyncPos {
                bootstrap_done,
                file_index,
                offset,
                resume_key,
            },
        })
    }

    /// Load from `path`; `Ok(None)` when there is no such file
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to `path` via a temp file and rename
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(self.to_text().as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        sync_parent_dir(path);
        Ok(())
    }
}
