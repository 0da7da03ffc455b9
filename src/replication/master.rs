//! Master side of a bootstrap range pull

use tracing::trace;

use crate::error::Result;
use crate::protocol::{encode_kv, kv_len, RangeRequest, SyncPos};
use crate::storage::KvEngine;

/// One range-get response body and where the scan stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeBatch {
    pub body: Vec<u8>,

    /// Pairs in `body`, the absent-start marker included
    pub count: usize,

    /// Last key written to `body`
    pub last_key: Option<Vec<u8>>,

    /// No keys remain in the requested range
    pub finished: bool,
}

impl RangeBatch {
    /// Cursor the slave should send next, given the one it sent
    pub fn next_pos(&self, requested: &SyncPos) -> SyncPos {
        let mut next = requested.clone();
        match (&self.last_key, self.finished) {
            (Some(key), false) => {
                next.resume_key = key.clone();
            }
            _ => {
                next.bootstrap_done = true;
                next.resume_key.clear();
            }
        }
        next
    }
}

/// Scan `req` out of `store`, at most `max_count` pairs and roughly
/// `max_bytes` bytes; the first pair always fits.
pub fn scan_range(
    store: &dyn KvEngine,
    req: &RangeRequest,
    max_count: usize,
    max_bytes: usize,
) -> Result<RangeBatch> {
    let mut batch = RangeBatch {
        body: Vec::new(),
        count: 0,
        last_key: None,
        finished: true,
    };

    if req.inclusive && !req.start.is_empty() && store.get(&req.start)?.is_none() {
        encode_kv(&mut batch.body, &req.start, None);
        batch.count = 1;
        batch.last_key = Some(req.start.clone());
    }

    let max_count = max_count.max(1);
    store.scan_from(&req.start, &mut |key: &[u8], value: &[u8]| -> bool {
        if !req.inclusive && key == req.start.as_slice() {
            return true;
        }
        if !req.end.is_empty() && key >= req.end.as_slice() {
            return false;
        }
        if batch.count >= max_count
            || (batch.count > 0 && batch.body.len() + kv_len(key, Some(value)) > max_bytes)
        {
            batch.finished = false;
            return false;
        }
        encode_kv(&mut batch.body, key, Some(value));
        batch.count += 1;
        batch.last_key = Some(key.to_vec());
        true
    })?;

    trace!(
        count = batch.count,
        bytes = batch.body.len(),
        finished = batch.finished,
        "range scanned"
    );
    Ok(batch)
}
