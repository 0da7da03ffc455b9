//! Table checkpoint file
//!
//! Immutable sorted snapshot of the whole key space.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (22 bytes)                                            │
//! │   Magic "RKVT" (4) | Version u16 (2) | Count u64 (8)         │
//! │   Last LSN u64 (8)                                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Data Block                                                   │
//! │   [KeyLen: u32][ValLen: u32][Key][Value] ... sorted by key   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Footer: DataCRC u32 (4)                                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//! Written to `<name>.tmp` and renamed into place, so a reader only ever sees
//! a complete table.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::error::{RelayError, Result};

const MAGIC: &[u8; 4] = b"RKVT";

const VERSION: u16 = 1;

/// Magic (4) + Version (2) + Count (8) + Last LSN (8)
const HEADER_SIZE: usize = 22;

const FOOTER_SIZE: usize = 4;

/// Write `entries` as the table at `path`, covering journal entries up to
/// `last_lsn`
pub fn write_table(path: &Path, last_lsn: u64, entries: &BTreeMap<Vec<u8>, Vec<u8>>) -> Result<()> {
    let tmp_path = path.with_extension("tmp");

    {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut writer = BufWriter::new(file);

        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&(entries.len() as u64).to_le_bytes())?;
        writer.write_all(&last_lsn.to_le_bytes())?;

        let mut hasher = crc32fast::Hasher::new();
        for (key, value) in entries {
            let mut header = [0u8; 8];
            header[0..4].copy_from_slice(&(key.len() as u32).to_le_bytes());
            header[4..8].copy_from_slice(&(value.len() as u32).to_le_bytes());
            for chunk in [&header[..], key.as_slice(), value.as_slice()] {
                hasher.update(chunk);
                writer.write_all(chunk)?;
            }
        }
        writer.write_all(&hasher.finalize().to_le_bytes())?;

        let file = writer
            .into_inner()
            .map_err(|e| RelayError::Io(e.into_error()))?;
        file.sync_all()?;
    }

    fs::rename(&tmp_path, path)?;
    sync_parent_dir(path);
    Ok(())
}

/// Load a table, returning its last LSN and entries
///
/// A missing file is an empty table at LSN 0.
pub fn read_table(path: &Path) -> Result<(u64, BTreeMap<Vec<u8>, Vec<u8>>)> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((0, BTreeMap::new())),
        Err(e) => return Err(e.into()),
    };

    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;

    if contents.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(corrupt(path, format!("file too short: {} bytes", contents.len())));
    }
    if &contents[0..4] != MAGIC {
        return Err(corrupt(path, format!("invalid magic {:?}", &contents[0..4])));
    }
    let version = u16::from_le_bytes([contents[4], contents[5]]);
    if version != VERSION {
        return Err(corrupt(path, format!("unsupported version {}", version)));
    }
    let count = u64_at(&contents, 6);
    let last_lsn = u64_at(&contents, 14);

    let data_end = contents.len() - FOOTER_SIZE;
    let data = &contents[HEADER_SIZE..data_end];
    let stored_crc = u32::from_le_bytes([
        contents[data_end],
        contents[data_end + 1],
        contents[data_end + 2],
        contents[data_end + 3],
    ]);
    if crc32fast::hash(data) != stored_crc {
        return Err(corrupt(path, "data CRC mismatch".to_string()));
    }

    let mut entries = BTreeMap::new();
    let mut pos = 0usize;
    while pos < data.len() {
        if data.len() - pos < 8 {
            return Err(corrupt(path, format!("entry header cut at {}", pos)));
        }
        let key_len = u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        let val_len = u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]]) as usize;
        let start = pos + 8;
        if data.len() - start < key_len + val_len {
            return Err(corrupt(path, format!("entry body cut at {}", pos)));
        }
        let key = data[start..start + key_len].to_vec();
        let value = data[start + key_len..start + key_len + val_len].to_vec();
        entries.insert(key, value);
        pos = start + key_len + val_len;
    }

    if entries.len() as u64 != count {
        return Err(corrupt(
            path,
            format!("header says {} entries, found {}", count, entries.len()),
        ));
    }
    Ok((last_lsn, entries))
}

fn u64_at(buf: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(raw)
}

fn corrupt(path: &Path, reason: String) -> RelayError {
    RelayError::StorageCorruption(format!("{}: {}", path.display(), reason))
}

/// Best effort fsync of the directory holding `path`, so a rename survives a
/// crash
#[cfg(unix)]
pub(crate) fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn sync_parent_dir(_path: &Path) {}
