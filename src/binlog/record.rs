//! Log record codec
//!
//! One mutation as it is stored in a binlog frame payload.
//!
//! ```text
//! ┌────────────┬───────────────┬────────┬─────────┬─────┬─────────┬───────┐
//! │ Origin (4) │ Timestamp (8) │ Op (4) │ KLen(4) │ Key │ VLen(4) │ Value │
//! └────────────┴───────────────┴────────┴─────────┴─────┴─────────┴───────┘
//! ```
//!
//! All integers are little-endian. The two length fields must account for
//! every byte of the buffer; anything else is reported as a format error.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{RelayError, Result};

/// Bytes of a record with empty key and value
pub const FIXED_SIZE: usize = 4 + 8 + 4 + 4 + 4;

/// Mutation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Operation {
    Write = 1,
    Delete = 2,
}

impl TryFrom<i32> for Operation {
    type Error = RelayError;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            1 => Ok(Operation::Write),
            2 => Ok(Operation::Delete),
            _ => Err(RelayError::RecordFormat(format!(
                "unknown operation code {}",
                code
            ))),
        }
    }
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Write => "WRITE",
            Operation::Delete => "DELETE",
        }
    }
}

/// A single mutation produced by some node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Node that produced the mutation
    pub origin_id: i32,

    /// Seconds since the unix epoch
    pub timestamp: i64,

    pub operation: Operation,

    pub key: Vec<u8>,

    /// Empty for deletes
    pub value: Vec<u8>,
}

impl LogRecord {
    /// A write stamped with the current time
    pub fn write(origin_id: i32, key: &[u8], value: &[u8]) -> Self {
        Self {
            origin_id,
            timestamp: unix_now(),
            operation: Operation::Write,
            key: key.to_vec(),
            value: value.to_vec(),
        }
    }

    /// A delete stamped with the current time
    pub fn delete(origin_id: i32, key: &[u8]) -> Self {
        Self {
            origin_id,
            timestamp: unix_now(),
            operation: Operation::Delete,
            key: key.to_vec(),
            value: Vec::new(),
        }
    }

    /// Size of the encoded record
    pub fn encoded_len(&self) -> usize {
        FIXED_SIZE + self.key.len() + self.value.len()
    }

    /// Encode to the flat binary layout
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&self.origin_id.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&(self.operation as i32).to_le_bytes());
        buf.extend_from_slice(&(self.key.len() as i32).to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&(self.value.len() as i32).to_le_bytes());
        buf.extend_from_slice(&self.value);
        buf
    }

    /// Decode a record, checking that the length fields consume the buffer
    /// exactly
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FIXED_SIZE {
            return Err(RelayError::RecordFormat(format!(
                "record too short: {} bytes (min {})",
                bytes.len(),
                FIXED_SIZE
            )));
        }

        let origin_id = i32::from_le_bytes(array(&bytes[0..4]));
        let timestamp = i64::from_le_bytes(array(&bytes[4..12]));
        let operation = Operation::try_from(i32::from_le_bytes(array(&bytes[12..16])))?;

        let key_len = read_len(&bytes[16..20], "key")?;
        let key_end = 20 + key_len;
        if bytes.len() < key_end + 4 {
            return Err(RelayError::RecordFormat(format!(
                "key length {} runs past record of {} bytes",
                key_len,
                bytes.len()
            )));
        }
        let key = bytes[20..key_end].to_vec();

        let value_len = read_len(&bytes[key_end..key_end + 4], "value")?;
        let value_start = key_end + 4;
        if bytes.len() != value_start + value_len {
            return Err(RelayError::RecordFormat(format!(
                "length fields cover {} bytes, record has {}",
                value_start + value_len,
                bytes.len()
            )));
        }
        let value = bytes[value_start..].to_vec();

        Ok(Self {
            origin_id,
            timestamp,
            operation,
            key,
            value,
        })
    }
}

fn read_len(field: &[u8], what: &str) -> Result<usize> {
    let len = i32::from_le_bytes(array(field));
    if len < 0 {
        return Err(RelayError::RecordFormat(format!(
            "negative {} length {}",
            what, len
        )));
    }
    Ok(len as usize)
}

fn array<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    out
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
