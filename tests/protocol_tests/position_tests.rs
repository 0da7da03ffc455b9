//! Tests for the replication position cursor

use relaykv::protocol::{LogPos, SyncPos};

// =============================================================================
// Header Form Tests
// =============================================================================

#[test]
fn test_header_roundtrip() {
    let pos = SyncPos {
        bootstrap_done: false,
        file_index: 3,
        offset: 4096,
        resume_key: b"user:42".to_vec(),
    };
    assert_eq!(pos.to_header(), "3 4096 0 user%3A42");
    assert_eq!(SyncPos::parse_header(&pos.to_header()).unwrap(), pos);
}

#[test]
fn test_header_accepts_unescaped_key_with_spaces() {
    let pos = SyncPos::parse_header("1 8 0 a key with spaces").unwrap();
    assert_eq!(pos.resume_key, b"a key with spaces");
}

#[test]
fn test_header_escapes_any_key_bytes() {
    let keys: [&[u8]; 4] = [
        "caf\u{e9}".as_bytes(),
        b"\xff\x00\x80",
        b"two words\nand a tab\t",
        b"100%",
    ];
    for key in keys {
        let pos = SyncPos {
            bootstrap_done: false,
            file_index: 1,
            offset: 96,
            resume_key: key.to_vec(),
        };
        let header = pos.to_header();
        assert!(
            header.bytes().all(|b| b.is_ascii_graphic() || b == b' '),
            "header {:?} is not visible ASCII",
            header
        );
        assert_eq!(header.matches(' ').count(), 3);
        assert_eq!(SyncPos::parse_header(&header).unwrap(), pos);
    }

    let pos = SyncPos::parse_header("1 96 0 caf%C3%A9").unwrap();
    assert_eq!(pos.resume_key, "caf\u{e9}".as_bytes());
}

#[test]
fn test_header_without_key() {
    let pos = SyncPos::parse_header("2 48 1").unwrap();
    assert_eq!(pos, SyncPos::tailing(LogPos::new(2, 48)));

    // Trailing separator with an empty key is the same cursor
    assert_eq!(SyncPos::parse_header("2 48 1 ").unwrap(), pos);
    assert_eq!(pos.to_header(), "2 48 1 ");
}

#[test]
fn test_header_rejects_garbage() {
    assert!(SyncPos::parse_header("").is_err());
    assert!(SyncPos::parse_header("x 0 0").is_err());
    assert!(SyncPos::parse_header("1 0 2").is_err());
    assert!(SyncPos::parse_header("1 -8 1").is_err());
    assert!(SyncPos::parse_header("1 8").is_err());
}

// =============================================================================
// Ordering Tests
// =============================================================================

#[test]
fn test_progress_order() {
    let bootstrapping = SyncPos {
        bootstrap_done: false,
        file_index: 9,
        offset: 900,
        resume_key: b"zzz".to_vec(),
    };
    let tailing = SyncPos::tailing(LogPos::new(1, 0));
    assert!(bootstrapping < tailing);

    assert!(SyncPos::tailing(LogPos::new(1, 800)) < SyncPos::tailing(LogPos::new(2, 0)));
    assert!(SyncPos::tailing(LogPos::new(2, 0)) < SyncPos::tailing(LogPos::new(2, 24)));

    let mut a = SyncPos::initial();
    a.resume_key = b"a".to_vec();
    let mut b = a.clone();
    b.resume_key = b"b".to_vec();
    assert!(a < b);
    assert_ne!(a, b);
}

#[test]
fn test_log_pos_order_and_display() {
    assert!(LogPos::new(1, 100) < LogPos::new(2, 0));
    assert_eq!(LogPos::new(3, 24).to_string(), "3:24");
    assert_eq!(SyncPos::tailing(LogPos::new(3, 24)).log_pos(), LogPos::new(3, 24));
}

// =============================================================================
// Request URI Tests
// =============================================================================

#[test]
fn test_request_uris() {
    assert_eq!(SyncPos::initial().request_uri(), "/range-get/?inc=1");

    let mut resuming = SyncPos::initial();
    resuming.resume_key = b"k42".to_vec();
    assert_eq!(resuming.request_uri(), "/range-get/k42?inc=0");

    resuming.resume_key = "caf\u{e9} au lait".as_bytes().to_vec();
    assert_eq!(resuming.request_uri(), "/range-get/caf%C3%A9%20au%20lait?inc=0");

    resuming.resume_key = b"a/b?c".to_vec();
    assert_eq!(resuming.request_uri(), "/range-get/a%2Fb%3Fc?inc=0");

    assert_eq!(
        SyncPos::tailing(LogPos::new(7, 128)).request_uri(),
        "/binlog/?f=00007&off=128"
    );
}
