//! Endpoint handlers
//!
//! Store and binlog access is blocking file IO, so every handler hops onto
//! the blocking pool for it. A parked binlog pull just awaits its one-shot
//! reply; no thread is held while it waits.

use std::sync::Arc;

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Method, Request};
use tracing::{debug, trace};

use crate::error::{RelayError, Result};
use crate::logdb::{Fetch, LogDb};
use crate::protocol::{query_i64, LogPos, RangeRequest, SyncPos, NEXT_INFO, ORIGIN_ID, REQ_INFO};
use crate::replication::{scan_range, PullBatch};

use super::response::{self, HttpResponse};

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RelayError::Storage(format!("blocking task failed: {}", e)))?
}

fn req_info(req: &Request<Incoming>) -> Result<Option<String>> {
    match req.headers().get(REQ_INFO) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|s| Some(s.to_string()))
            .map_err(|_| RelayError::Protocol("req-info header is not text".to_string())),
    }
}

// =============================================================================
// Data API
// =============================================================================

/// `GET|POST|PUT|DELETE /d/<key>`
pub async fn data(req: Request<Incoming>, db: Arc<LogDb>, key: Vec<u8>) -> HttpResponse {
    if key.is_empty() {
        return response::bad_request("empty key");
    }

    let method = req.method().clone();
    let result = match method {
        Method::GET => match blocking(move || db.get(&key)).await {
            Ok(Some(value)) => return response::ok(value),
            Ok(None) => return response::not_found(),
            Err(e) => Err(e),
        },
        Method::POST | Method::PUT => {
            let value = match req.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => return response::bad_request(&format!("could not read body: {}", e)),
            };
            blocking(move || db.write(&key, &value)).await
        }
        Method::DELETE => blocking(move || db.remove(&key)).await,
        _ => return response::method_not_allowed(),
    };

    match result {
        Ok(()) => response::ok(""),
        Err(e) => response::from_error(&e),
    }
}

// =============================================================================
// Replication: Range Pull
// =============================================================================

/// `GET /range-get/<start>?end=&inc=`
pub async fn range_get(req: Request<Incoming>, db: Arc<LogDb>, start: &str) -> HttpResponse {
    match range_get_inner(req, db, start).await {
        Ok(response) => response,
        Err(e) => response::from_error(&e),
    }
}

async fn range_get_inner(req: Request<Incoming>, db: Arc<LogDb>, start: &str) -> Result<HttpResponse> {
    let range = RangeRequest::parse(start, req.uri().query())?;
    let echo = req_info(&req)?;
    let requested = echo.as_deref().map(SyncPos::parse_header).transpose()?;

    let origin = db.config().node_id;
    let (batch, next) = blocking(move || {
        // A fresh slave is stamped with the binlog end before the copy, so it
        // tails from there once the key space is exhausted
        let requested = requested.map(|mut pos| {
            if !pos.bootstrap_done && pos.file_index == 0 {
                if let Ok(tail) = db.tail_position() {
                    pos.file_index = tail.file_index;
                    pos.offset = tail.offset;
                }
            }
            pos
        });

        let config = db.config();
        let batch = scan_range(db.store().as_ref(), &range, config.batch_count, config.batch_size)?;
        let next = requested.map(|pos| batch.next_pos(&pos));
        Ok((batch, next))
    })
    .await?;

    debug!(
        start = %start,
        pairs = batch.count,
        bytes = batch.body.len(),
        finished = batch.finished,
        "range pull answered"
    );

    let mut response = response::ok(batch.body);
    response = response::with_header(response, ORIGIN_ID, &origin.to_string())?;
    if let (Some(echo), Some(next)) = (echo, next) {
        response = response::with_header(response, REQ_INFO, &echo)?;
        response = response::with_header(response, NEXT_INFO, &next.to_header())?;
    }
    Ok(response)
}

// =============================================================================
// Replication: Binlog Pull
// =============================================================================

/// `GET /binlog/?f=<index>&off=<offset>`
pub async fn binlog(req: Request<Incoming>, db: Arc<LogDb>) -> HttpResponse {
    match binlog_inner(req, db).await {
        Ok(response) => response,
        Err(e) => response::from_error(&e),
    }
}

async fn binlog_inner(req: Request<Incoming>, db: Arc<LogDb>) -> Result<HttpResponse> {
    let query = req.uri().query();
    let pos = LogPos::new(query_i64(query, "f")?, query_i64(query, "off")?);
    if pos.file_index < 0 || pos.offset < 0 {
        return Err(RelayError::Protocol(format!("negative binlog position {}", pos)));
    }
    let echo = match req_info(&req)? {
        Some(echo) => echo,
        None => SyncPos::tailing(pos).to_header(),
    };

    let batch = match blocking(move || db.fetch_log(pos)).await? {
        Fetch::Ready(batch) => batch,
        Fetch::Parked(parked) => match parked.reply.await {
            Ok(reply) => reply?,
            // Registry dropped without answering: treat as no new data
            Err(_) => PullBatch::empty(pos),
        },
    };

    trace!(pos = %pos, next = %batch.next, bytes = batch.body.len(), "binlog pull answered");

    let next = SyncPos::tailing(batch.next).to_header();
    let response = response::ok(batch.body);
    let response = response::with_header(response, REQ_INFO, &echo)?;
    response::with_header(response, NEXT_INFO, &next)
}
