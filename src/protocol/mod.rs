//! Protocol Module
//!
//! Wire formats of the HTTP data and replication endpoints.
//!
//! ## Endpoints
//! - `GET|POST|PUT|DELETE /d/<key>`          : point access
//! - `GET /range-get/<start>?end=&inc=`      : bootstrap range scan
//! - `GET /binlog/?f=<index>&off=<offset>`   : binlog tail (long-poll)
//!
//! ## Replication Headers
//! - `req-info`:  cursor the slave sent, echoed back by the master
//! - `next-info`: cursor the slave should request next
//! - `origin-id`: node id of the master answering a range scan
//!
//! Both cursors use `"<fileIndex> <byteOffset> <bootstrapDone> <resumeKey>"`.
//! Keys are arbitrary bytes, so wherever one lands in a URI path, a header or
//! the slave status file it is percent-encoded with [`escape_key`].

mod position;
mod range;

pub use position::{LogPos, SyncPos};
pub use range::{encode_kv, kv_len, KvEntries, ABSENT};

use crate::error::{RelayError, Result};

pub const REQ_INFO: &str = "req-info";
pub const NEXT_INFO: &str = "next-info";
pub const ORIGIN_ID: &str = "origin-id";

pub const DATA_PREFIX: &str = "/d/";
pub const RANGE_PREFIX: &str = "/range-get/";
pub const BINLOG_PATH: &str = "/binlog/";

/// Percent-encode a key into visible ASCII with no spaces
pub fn escape_key(key: &[u8]) -> String {
    urlencoding::encode_binary(key).into_owned()
}

/// Inverse of [`escape_key`]; text without escapes decodes to itself
pub fn unescape_key(text: &str) -> Vec<u8> {
    urlencoding::decode_binary(text.as_bytes()).into_owned()
}

/// Look up `name` in a `a=1&b=2` query string
pub fn query_arg<'a>(query: Option<&'a str>, name: &str) -> Option<&'a str> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

/// Parse a required integer query argument
pub fn query_i64(query: Option<&str>, name: &str) -> Result<i64> {
    let raw = query_arg(query, name)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RelayError::Protocol(format!("missing query argument '{}'", name)))?;
    raw.parse::<i64>()
        .map_err(|_| RelayError::Protocol(format!("query argument {}='{}' is not an integer", name, raw)))
}

/// Parameters of a bootstrap range scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    pub start: Vec<u8>,
    /// Exclusive upper bound; empty scans to the end of the key space
    pub end: Vec<u8>,
    /// Whether `start` itself is part of the range
    pub inclusive: bool,
}

impl RangeRequest {
    /// Build from the path suffix after `/range-get/` and the query string;
    /// both keys arrive percent-encoded
    pub fn parse(start: &str, query: Option<&str>) -> Result<Self> {
        let inclusive = match query_arg(query, "inc") {
            None | Some("") | Some("1") => true,
            Some("0") => false,
            Some(other) => {
                return Err(RelayError::Protocol(format!("inc must be 0 or 1, got '{}'", other)))
            }
        };
        Ok(Self {
            start: unescape_key(start),
            end: unescape_key(query_arg(query, "end").unwrap_or("")),
            inclusive,
        })
    }
}
