//! Binlog file
//!
//! One rotation segment: an append-only sequence of padded frames.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{RelayError, Result};

use super::frame::{self, FRAME_HEADER_SIZE};

/// A binlog segment file
///
/// `len` tracks the end of data as seen through this handle; it is read from
/// the file on open and advanced by `append`.
pub struct LogFile {
    file: File,
    path: PathBuf,
    len: u64,
    readonly: bool,
}

impl LogFile {
    /// Open a binlog file, creating it when writable
    pub fn open(path: &Path, readonly: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(!readonly)
            .create(!readonly)
            .open(path)?;
        let len = file.metadata()?.len();

        tracing::trace!(path = %path.display(), len, readonly, "binlog file opened");

        Ok(Self {
            file,
            path: path.to_path_buf(),
            len,
            readonly,
        })
    }

    /// Append one frame carrying `payload`, returning the bytes written
    ///
    /// A failed write is cut back off the file so the next frame still starts
    /// on an aligned offset.
    pub fn append(&mut self, payload: &[u8]) -> Result<u64> {
        if self.readonly {
            return Err(RelayError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("binlog {} opened read-only", self.path.display()),
            )));
        }

        let frame = frame::encode_frame(payload);
        if let Err(e) = self.file.write_all(&frame) {
            tracing::error!(path = %self.path.display(), error = %e, "binlog append failed");
            if let Err(trunc) = self.file.set_len(self.len) {
                tracing::error!(error = %trunc, "could not cut back partial binlog frame");
            }
            return Err(RelayError::Io(e));
        }

        self.len += frame.len() as u64;
        Ok(frame.len() as u64)
    }

    /// Read exactly one frame at `offset`
    ///
    /// Returns `Ok(None)` at end of file, `BinlogTruncated` when the frame
    /// runs past the file, and `BinlogCorruption` for a bad header.
    pub fn get_record(&mut self, offset: u64) -> Result<Option<Vec<u8>>> {
        if offset >= self.len {
            return Ok(None);
        }
        let payload_len = self.read_frame_header(offset)?;
        let mut payload = vec![0u8; payload_len];
        self.read_at(offset + FRAME_HEADER_SIZE as u64, &mut payload)?;
        Ok(Some(payload))
    }

    /// Read whole frames starting at `offset`, up to `max_bytes` of them
    ///
    /// Stops at end of data, at a torn tail frame, or before the frame that
    /// would overflow the budget. A first frame larger than the budget is
    /// returned on its own. Corrupt frames are an error.
    pub fn batch_record(&mut self, offset: u64, max_bytes: usize) -> Result<Vec<u8>> {
        let mut pos = offset;
        let mut total = 0usize;

        while pos < self.len {
            let payload_len = match self.read_frame_header(pos) {
                Ok(len) => len,
                Err(e) if e.is_torn_tail() => {
                    tracing::debug!(path = %self.path.display(), offset = pos, "batch read stopped at torn frame");
                    break;
                }
                Err(e) => return Err(e),
            };
            let frame_len = frame::padded_len(payload_len);

            if total + frame_len > max_bytes {
                if total > 0 {
                    break;
                }
                tracing::warn!(
                    path = %self.path.display(),
                    offset = pos,
                    frame_len,
                    max_bytes,
                    "frame exceeds batch budget, sending it alone"
                );
                total = frame_len;
                break;
            }

            total += frame_len;
            pos += frame_len as u64;
        }

        let mut out = vec![0u8; total];
        if total > 0 {
            self.read_at(offset, &mut out)?;
        }
        Ok(out)
    }

    /// Iterate frames from `offset` to the end of the file
    pub fn frames(&mut self, offset: u64) -> FileFrames<'_> {
        FileFrames {
            file: self,
            offset,
            done: false,
            torn: false,
        }
    }

    /// Force written frames to stable storage
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// End of data
    pub fn size(&self) -> u64 {
        self.len
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Validate the frame at `offset` and return its payload length
    fn read_frame_header(&mut self, offset: u64) -> Result<usize> {
        if offset % 8 != 0 {
            return Err(RelayError::BinlogCorruption {
                offset,
                reason: "frame offset is not 8-byte aligned".to_string(),
            });
        }
        if self.len - offset < FRAME_HEADER_SIZE as u64 {
            return Err(RelayError::BinlogTruncated { offset });
        }

        let mut header = [0u8; FRAME_HEADER_SIZE];
        self.read_at(offset, &mut header)?;
        let payload_len = frame::decode_header(&header, offset)?;

        if offset + frame::padded_len(payload_len) as u64 > self.len {
            return Err(RelayError::BinlogTruncated { offset });
        }
        Ok(payload_len)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }
}

/// Frames of a binlog file, yielded as `(offset, payload)`
///
/// A torn tail ends the sequence quietly; corruption is yielded once as an
/// error.
pub struct FileFrames<'a> {
    file: &'a mut LogFile,
    offset: u64,
    done: bool,
    torn: bool,
}

impl<'a> FileFrames<'a> {
    /// Offset of the next frame to be read
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Whether the scan ended on a partially written frame
    pub fn hit_torn_tail(&self) -> bool {
        self.torn
    }
}

impl<'a> Iterator for FileFrames<'a> {
    type Item = Result<(u64, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let at = self.offset;
        match self.file.get_record(at) {
            Ok(Some(payload)) => {
                self.offset += frame::padded_len(payload.len()) as u64;
                Some(Ok((at, payload)))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) if e.is_torn_tail() => {
                tracing::warn!(path = %self.file.path.display(), offset = at, "torn frame at binlog tail");
                self.done = true;
                self.torn = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
