//! Binlog frames
//!
//! Physical unit of a binlog file.
//!
//! ```text
//! ┌───────────┬────────────┬──────────────┬──────────────────┐
//! │ Magic (8) │ Length (8) │ Payload      │ Zero pad to 8    │
//! └───────────┴────────────┴──────────────┴──────────────────┘
//! ```
//!
//! Frames start on 8-byte boundaries, so a reader can resume at any offset it
//! was previously handed and can spot a torn tail without an index.

use crate::error::{RelayError, Result};

/// Frame magic, `"########"`
pub const FRAME_MAGIC: u64 = 0x2323_2323_2323_2323;

/// Magic (8) + Length (8)
pub const FRAME_HEADER_SIZE: usize = 16;

/// Total on-disk size of a frame carrying `payload_len` bytes
pub fn padded_len(payload_len: usize) -> usize {
    (FRAME_HEADER_SIZE + payload_len + 7) / 8 * 8
}

/// Build one padded frame around `payload`
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let total = padded_len(payload.len());
    let mut buf = Vec::with_capacity(total);
    buf.extend_from_slice(&FRAME_MAGIC.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    buf.extend_from_slice(payload);
    buf.resize(total, 0);
    buf
}

/// Parse a frame header, returning the payload length.
///
/// `offset` is only used for error messages.
pub fn decode_header(header: &[u8; FRAME_HEADER_SIZE], offset: u64) -> Result<usize> {
    let mut magic = [0u8; 8];
    magic.copy_from_slice(&header[0..8]);
    let magic = u64::from_le_bytes(magic);
    if magic != FRAME_MAGIC {
        return Err(RelayError::BinlogCorruption {
            offset,
            reason: format!("bad magic {:#018x}", magic),
        });
    }

    let mut len = [0u8; 8];
    len.copy_from_slice(&header[8..16]);
    let len = i64::from_le_bytes(len);
    if len < 0 {
        return Err(RelayError::BinlogCorruption {
            offset,
            reason: format!("negative frame length {}", len),
        });
    }
    Ok(len as usize)
}

/// Lazy sequence of frame payloads inside an in-memory buffer, such as a
/// binlog pull response body.
///
/// Yields `Err` once and then stops if the buffer holds a damaged or partial
/// frame.
pub struct Frames<'a> {
    buf: &'a [u8],
    offset: u64,
    failed: bool,
}

impl<'a> Frames<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            offset: 0,
            failed: false,
        }
    }

    /// Bytes consumed so far
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl<'a> Iterator for Frames<'a> {
    type Item = Result<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.buf.is_empty() {
            return None;
        }
        if self.buf.len() < FRAME_HEADER_SIZE {
            self.failed = true;
            return Some(Err(RelayError::BinlogTruncated { offset: self.offset }));
        }

        let mut header = [0u8; FRAME_HEADER_SIZE];
        header.copy_from_slice(&self.buf[..FRAME_HEADER_SIZE]);
        let len = match decode_header(&header, self.offset) {
            Ok(len) => len,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        };

        // A final frame may arrive without its padding
        let end = FRAME_HEADER_SIZE + len;
        if self.buf.len() < end {
            self.failed = true;
            return Some(Err(RelayError::BinlogTruncated { offset: self.offset }));
        }
        let payload = &self.buf[FRAME_HEADER_SIZE..end];

        let step = padded_len(len).min(self.buf.len());
        self.buf = &self.buf[step..];
        self.offset += step as u64;
        Some(Ok(payload))
    }
}
