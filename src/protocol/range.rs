//! Range-get body codec
//!
//! ```text
//! key "\n" length "\n" value "\n"      (repeated)
//! ```
//! `length` is decimal; `-1` marks a key that does not exist, with an empty
//! value line. Keys may not contain `'\n'`.

use crate::error::{RelayError, Result};

/// Length sentinel for an absent key
pub const ABSENT: i64 = -1;

/// Append one entry; `None` encodes an absent key
pub fn encode_kv(buf: &mut Vec<u8>, key: &[u8], value: Option<&[u8]>) {
    buf.extend_from_slice(key);
    buf.push(b'\n');
    match value {
        Some(v) => {
            buf.extend_from_slice(v.len().to_string().as_bytes());
            buf.push(b'\n');
            buf.extend_from_slice(v);
        }
        None => {
            buf.extend_from_slice(ABSENT.to_string().as_bytes());
            buf.push(b'\n');
        }
    }
    buf.push(b'\n');
}

/// Encoded size of one entry
pub fn kv_len(key: &[u8], value: Option<&[u8]>) -> usize {
    match value {
        Some(v) => key.len() + v.len() + v.len().to_string().len() + 3,
        None => key.len() + 5,
    }
}

/// Lazily decodes entries of a range-get body
pub struct KvEntries<'a> {
    buf: &'a [u8],
    failed: bool,
}

impl<'a> KvEntries<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, failed: false }
    }

    fn next_entry(&mut self) -> Result<(&'a [u8], Option<&'a [u8]>)> {
        let key = take_line(&mut self.buf, "key")?;
        let len_line = take_line(&mut self.buf, "length")?;
        let len = std::str::from_utf8(len_line)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| {
                RelayError::Protocol(format!(
                    "bad value length '{}'",
                    String::from_utf8_lossy(len_line)
                ))
            })?;

        if len == ABSENT {
            let rest = take_line(&mut self.buf, "absent marker")?;
            if !rest.is_empty() {
                return Err(RelayError::Protocol("absent key carries a value".to_string()));
            }
            return Ok((key, None));
        }
        if len < 0 {
            return Err(RelayError::Protocol(format!("negative value length {}", len)));
        }

        let len = len as usize;
        if self.buf.len() < len + 1 || self.buf[len] != b'\n' {
            return Err(RelayError::Protocol(format!(
                "value of {} bytes cut short",
                len
            )));
        }
        let value = &self.buf[..len];
        self.buf = &self.buf[len + 1..];
        Ok((key, Some(value)))
    }
}

impl<'a> Iterator for KvEntries<'a> {
    type Item = Result<(&'a [u8], Option<&'a [u8]>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.buf.is_empty() {
            return None;
        }
        let entry = self.next_entry();
        if entry.is_err() {
            self.failed = true;
        }
        Some(entry)
    }
}

fn take_line<'a>(buf: &mut &'a [u8], what: &str) -> Result<&'a [u8]> {
    let data: &'a [u8] = buf;
    let end = data
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| RelayError::Protocol(format!("missing newline after {}", what)))?;
    *buf = &data[end + 1..];
    Ok(&data[..end])
}
