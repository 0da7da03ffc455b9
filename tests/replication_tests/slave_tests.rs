//! Tests for slave-side response handling

use std::time::Duration;

use hyper::header::{HeaderMap, HeaderValue};
use relaykv::binlog::{encode_frame, LogRecord};
use relaykv::protocol::{encode_kv, LogPos, SyncPos, NEXT_INFO, ORIGIN_ID, REQ_INFO};
use relaykv::replication::apply_response;
use relaykv::{MasterAddr, RelayError};
use tempfile::TempDir;

use crate::{node_config, open_db};

// =============================================================================
// Helper Functions
// =============================================================================

const SLAVE_ID: i32 = 2;
const MASTER_ID: i32 = 1;

fn slave(temp: &TempDir) -> std::sync::Arc<relaykv::LogDb> {
    open_db(
        node_config(temp.path(), SLAVE_ID)
            .master(MasterAddr::new("127.0.0.1", 1))
            .flush_slave_interval(Duration::ZERO)
            .build(),
    )
}

fn headers(req: &SyncPos, next: &SyncPos, origin: Option<i32>) -> HeaderMap {
    let mut map = HeaderMap::new();
    map.insert(REQ_INFO, HeaderValue::from_str(&req.to_header()).unwrap());
    map.insert(NEXT_INFO, HeaderValue::from_str(&next.to_header()).unwrap());
    if let Some(origin) = origin {
        map.insert(ORIGIN_ID, HeaderValue::from_str(&origin.to_string()).unwrap());
    }
    map
}

fn bootstrapping(file_index: i64, offset: i64, key: &str) -> SyncPos {
    SyncPos {
        bootstrap_done: false,
        file_index,
        offset,
        resume_key: key.as_bytes().to_vec(),
    }
}

// =============================================================================
// Bootstrap Response Tests
// =============================================================================

#[test]
fn test_bootstrap_pairs_applied_with_origin() {
    let temp = TempDir::new().unwrap();
    let db = slave(&temp);
    db.write(b"stale", b"x").unwrap();

    let mut body = Vec::new();
    encode_kv(&mut body, b"stale", None);
    encode_kv(&mut body, b"user:1", Some(b"alice"));
    let next = bootstrapping(1, 48, "user:1");

    let applied = apply_response(
        &db,
        &headers(&SyncPos::initial(), &next, Some(MASTER_ID)),
        &body,
    )
    .unwrap();

    assert_eq!(applied, next);
    assert_eq!(db.slave_pos(), Some(next));
    assert_eq!(db.get(b"stale").unwrap(), None);
    assert_eq!(db.get(b"user:1").unwrap(), Some(b"alice".to_vec()));
}

#[test]
fn test_bootstrap_requires_origin_id() {
    let temp = TempDir::new().unwrap();
    let db = slave(&temp);

    let mut body = Vec::new();
    encode_kv(&mut body, b"k", Some(b"v"));
    let result = apply_response(
        &db,
        &headers(&SyncPos::initial(), &bootstrapping(1, 0, "k"), None),
        &body,
    );

    assert!(matches!(result, Err(RelayError::Protocol(_))));
    assert_eq!(db.get(b"k").unwrap(), None);
    assert_eq!(db.slave_pos(), Some(SyncPos::initial()));
}

#[test]
fn test_bootstrap_completion_switches_to_tailing() {
    let temp = TempDir::new().unwrap();
    let db = slave(&temp);

    let next = SyncPos::tailing(LogPos::new(3, 120));
    apply_response(
        &db,
        &headers(&SyncPos::initial(), &next, Some(MASTER_ID)),
        b"",
    )
    .unwrap();

    let pos = db.slave_pos().unwrap();
    assert!(pos.bootstrap_done);
    assert_eq!(pos.request_uri(), "/binlog/?f=00003&off=120");
}

// =============================================================================
// Tailing Response Tests
// =============================================================================

#[test]
fn test_frames_applied_and_own_records_skipped() {
    let temp = TempDir::new().unwrap();
    let db = slave(&temp);
    let current = SyncPos::tailing(LogPos::new(1, 0));
    db.update_slave_pos(current.clone()).unwrap();

    let mut body = encode_frame(&LogRecord::write(MASTER_ID, b"a", b"1").encode());
    body.extend(encode_frame(&LogRecord::write(SLAVE_ID, b"echo", b"x").encode()));
    body.extend(encode_frame(&LogRecord::delete(MASTER_ID, b"gone").encode()));
    let next = SyncPos::tailing(LogPos::new(1, body.len() as i64));

    apply_response(&db, &headers(&current, &next, None), &body).unwrap();

    assert_eq!(db.get(b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(db.get(b"echo").unwrap(), None);
    assert_eq!(db.slave_pos(), Some(next));
}

#[test]
fn test_heartbeat_keeps_cursor() {
    let temp = TempDir::new().unwrap();
    let db = slave(&temp);
    let current = SyncPos::tailing(LogPos::new(2, 64));
    db.update_slave_pos(current.clone()).unwrap();

    apply_response(&db, &headers(&current, &current, None), b"").unwrap();
    assert_eq!(db.slave_pos(), Some(current));
}

// =============================================================================
// Rejection Tests
// =============================================================================

#[test]
fn test_mismatched_echo_is_dropped() {
    let temp = TempDir::new().unwrap();
    let db = slave(&temp);
    let current = SyncPos::tailing(LogPos::new(1, 48));
    db.update_slave_pos(current.clone()).unwrap();

    let stale = SyncPos::tailing(LogPos::new(1, 0));
    let body = encode_frame(&LogRecord::write(MASTER_ID, b"dup", b"1").encode());
    let next = SyncPos::tailing(LogPos::new(1, 48));

    let result = apply_response(&db, &headers(&stale, &next, None), &body);
    assert!(matches!(result, Err(RelayError::PositionMismatch { .. })));
    assert_eq!(db.get(b"dup").unwrap(), None);
    assert_eq!(db.slave_pos(), Some(current));
}

#[test]
fn test_backwards_next_is_rejected() {
    let temp = TempDir::new().unwrap();
    let db = slave(&temp);
    let current = SyncPos::tailing(LogPos::new(2, 0));
    db.update_slave_pos(current.clone()).unwrap();

    let back = SyncPos::tailing(LogPos::new(1, 0));
    assert!(apply_response(&db, &headers(&current, &back, None), b"").is_err());
    assert_eq!(db.slave_pos(), Some(current));
}

#[test]
fn test_missing_headers() {
    let temp = TempDir::new().unwrap();
    let db = slave(&temp);
    assert!(matches!(
        apply_response(&db, &HeaderMap::new(), b""),
        Err(RelayError::Protocol(_))
    ));
}
