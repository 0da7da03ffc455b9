//! Slave pull loop
//!
//! ```text
//!   ┌────────────┐  range-get   ┌────────────┐
//!   │ Bootstrap  │ ───────────► │  Tailing   │ ◄─┐ binlog pull
//!   │ (copy keys)│  key space   │ (frames)   │ ──┘ (long-poll)
//!   └────────────┘   exhausted  └────────────┘
//! ```
//! One HTTP/1 connection carries one request at a time. Every response is
//! checked against the cursor it answers, applied through the local
//! [`LogDb`], and its `next-info` becomes the new cursor. Any transport or
//! apply failure drops the connection; the loop reconnects after
//! `reconnect_delay` and resumes from the saved cursor.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::header::{HeaderMap, HOST};
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::binlog::{Frames, LogRecord};
use crate::config::MasterAddr;
use crate::error::{RelayError, Result};
use crate::logdb::LogDb;
use crate::protocol::{KvEntries, SyncPos, NEXT_INFO, ORIGIN_ID, REQ_INFO};

/// Replicates a master into the local [`LogDb`]
pub struct SlaveSync {
    db: Arc<LogDb>,
    master: MasterAddr,
    reconnect_delay: Duration,
}

impl SlaveSync {
    /// Build from the database's saved slave status
    pub fn new(db: Arc<LogDb>) -> Result<Self> {
        let status = db
            .slave_status()
            .ok_or_else(|| RelayError::Config("no master configured".to_string()))?;
        let reconnect_delay = db.config().reconnect_delay;
        Ok(Self {
            db,
            master: status.master,
            reconnect_delay,
        })
    }

    pub fn master(&self) -> &MasterAddr {
        &self.master
    }

    /// Pull from the master until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(master = %self.master, "slave sync started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                result = self.session() => {
                    if let Err(e) = result {
                        warn!(master = %self.master, error = %e, "replication connection lost");
                    }
                }
                _ = shutdown.changed() => break,
            }

            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        if let Err(e) = self.db.flush_slave_status() {
            warn!(error = %e, "could not save slave position");
        }
        info!(master = %self.master, "slave sync stopped");
    }

    /// One connection's worth of pulls
    async fn session(&self) -> Result<()> {
        let addr = (self.master.host.as_str(), self.master.port);
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| RelayError::Network(format!("connect to {}: {}", self.master, e)))?;
        let io = TokioIo::new(stream);

        let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "replication connection closed");
            }
        });
        info!(master = %self.master, "connected to master");

        loop {
            let cursor = self
                .db
                .slave_pos()
                .ok_or_else(|| RelayError::Config("slave cursor vanished".to_string()))?;

            let req = Request::builder()
                .method(Method::GET)
                .uri(cursor.request_uri())
                .header(HOST, self.master.to_string())
                .header(REQ_INFO, cursor.to_header())
                .body(Empty::<Bytes>::new())?;

            sender.ready().await?;
            let response = sender.send_request(req).await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.into_body().collect().await?.to_bytes();
                return Err(RelayError::Http(format!(
                    "master answered {}: {}",
                    status,
                    String::from_utf8_lossy(&body)
                )));
            }

            let (parts, body) = response.into_parts();
            let body = body.collect().await?.to_bytes();

            // Store and binlog work is blocking file IO
            let db = Arc::clone(&self.db);
            let outcome =
                tokio::task::spawn_blocking(move || apply_response(&db, &parts.headers, &body))
                    .await
                    .map_err(|e| RelayError::Storage(format!("apply task failed: {}", e)))?;

            match outcome {
                Ok(next) => trace!(next = %next, "cursor advanced"),
                Err(e @ RelayError::PositionMismatch { .. }) => {
                    warn!(error = %e, "dropping response for a stale cursor");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Check, apply and account for one master response
///
/// Returns the new cursor. A response whose `req-info` is not the current
/// cursor is rejected with `PositionMismatch` and changes nothing.
pub fn apply_response(db: &LogDb, headers: &HeaderMap, body: &[u8]) -> Result<SyncPos> {
    let current = db
        .slave_pos()
        .ok_or_else(|| RelayError::Config("node has no master configured".to_string()))?;

    let echoed = SyncPos::parse_header(header_str(headers, REQ_INFO)?)?;
    if echoed != current {
        return Err(RelayError::PositionMismatch {
            echoed: echoed.to_header(),
            current: current.to_header(),
        });
    }
    let next = SyncPos::parse_header(header_str(headers, NEXT_INFO)?)?;
    if next < current {
        return Err(RelayError::Protocol(format!(
            "next position '{}' is behind '{}'",
            next, current
        )));
    }

    let applied = if current.bootstrap_done {
        apply_frames(db, body)?
    } else {
        let origin = header_str(headers, ORIGIN_ID)?
            .trim()
            .parse::<i32>()
            .map_err(|_| RelayError::Protocol("origin-id is not an integer".to_string()))?;
        apply_pairs(db, origin, body)?
    };

    if !current.bootstrap_done && next.bootstrap_done {
        info!(
            file_index = next.file_index,
            offset = next.offset,
            "bootstrap complete, tailing binlog"
        );
    }
    if applied > 0 {
        debug!(applied, next = %next, "replicated batch applied");
    }

    db.update_slave_pos(next.clone())?;
    Ok(next)
}

/// Apply raw binlog frames through `apply_log`
pub fn apply_frames(db: &LogDb, body: &[u8]) -> Result<usize> {
    let mut applied = 0;
    for payload in Frames::new(body) {
        if db.apply_log(payload?)? {
            applied += 1;
        }
    }
    Ok(applied)
}

/// Apply range-get pairs as records from `origin`
pub fn apply_pairs(db: &LogDb, origin: i32, body: &[u8]) -> Result<usize> {
    let mut applied = 0;
    for entry in KvEntries::new(body) {
        let record = match entry? {
            (key, Some(value)) => LogRecord::write(origin, key, value),
            (key, None) => LogRecord::delete(origin, key),
        };
        if db.apply_record(&record)? {
            applied += 1;
        }
    }
    Ok(applied)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str> {
    headers
        .get(name)
        .ok_or_else(|| RelayError::Protocol(format!("missing '{}' header", name)))?
        .to_str()
        .map_err(|_| RelayError::Protocol(format!("'{}' header is not text", name)))
}
