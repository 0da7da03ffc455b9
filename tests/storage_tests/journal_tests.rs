//! Tests for the store journal

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use relaykv::storage::{Journal, StoreOp};
use relaykv::SyncStrategy;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_journal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store.journal");
    (temp_dir, path)
}

fn put(key: &str, value: &str) -> StoreOp {
    StoreOp::Put {
        key: key.as_bytes().to_vec(),
        value: value.as_bytes().to_vec(),
    }
}

// =============================================================================
// Append / Replay Tests
// =============================================================================

#[test]
fn test_append_assigns_sequential_lsns() {
    let (_temp, path) = setup_temp_journal();
    let (mut journal, ops, _) = Journal::open(&path, SyncStrategy::EveryWrite, 0).unwrap();
    assert!(ops.is_empty());

    assert_eq!(journal.append(&put("a", "1")).unwrap(), 1);
    assert_eq!(journal.append(&put("b", "2")).unwrap(), 2);
    assert_eq!(journal.last_lsn(), 2);
}

#[test]
fn test_replay_after_reopen() {
    let (_temp, path) = setup_temp_journal();
    {
        let (mut journal, _, _) = Journal::open(&path, SyncStrategy::EveryWrite, 0).unwrap();
        journal.append(&put("a", "1")).unwrap();
        journal.append(&StoreOp::Delete { key: b"a".to_vec() }).unwrap();
    }

    let (journal, ops, recovery) = Journal::open(&path, SyncStrategy::EveryWrite, 0).unwrap();
    assert_eq!(ops, vec![put("a", "1"), StoreOp::Delete { key: b"a".to_vec() }]);
    assert_eq!(recovery.entries_recovered, 2);
    assert!(!recovery.was_truncated);
    assert_eq!(journal.last_lsn(), 2);
}

#[test]
fn test_replay_skips_checkpointed_entries() {
    let (_temp, path) = setup_temp_journal();
    {
        let (mut journal, _, _) = Journal::open(&path, SyncStrategy::EveryWrite, 0).unwrap();
        journal.append(&put("a", "1")).unwrap();
        journal.append(&put("b", "2")).unwrap();
    }

    let (_, ops, recovery) = Journal::open(&path, SyncStrategy::EveryWrite, 1).unwrap();
    assert_eq!(ops, vec![put("b", "2")]);
    assert_eq!(recovery.entries_skipped, 1);
}

#[test]
fn test_damaged_tail_is_truncated() {
    let (_temp, path) = setup_temp_journal();
    let good_len = {
        let (mut journal, _, _) = Journal::open(&path, SyncStrategy::EveryWrite, 0).unwrap();
        journal.append(&put("a", "1")).unwrap();
        journal.size()
    };
    {
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0xFF; 10]).unwrap();
    }

    let (journal, ops, recovery) = Journal::open(&path, SyncStrategy::EveryWrite, 0).unwrap();
    assert_eq!(ops.len(), 1);
    assert!(recovery.was_truncated);
    assert_eq!(journal.size(), good_len);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len);
}

#[test]
fn test_partial_entry_left_by_failed_append_is_dropped() {
    let (_temp, path) = setup_temp_journal();
    let (good_len, full_len) = {
        let (mut journal, _, _) = Journal::open(&path, SyncStrategy::EveryWrite, 0).unwrap();
        journal.append(&put("a", "1")).unwrap();
        let good_len = journal.size();
        journal.append(&put("b", "2")).unwrap();
        (good_len, journal.size())
    };

    // Half of the second entry stays on disk, as if the cut-back failed
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(good_len + (full_len - good_len) / 2).unwrap();
    drop(file);

    let (mut journal, ops, recovery) = Journal::open(&path, SyncStrategy::EveryWrite, 0).unwrap();
    assert_eq!(ops, vec![put("a", "1")]);
    assert!(recovery.was_truncated);
    assert_eq!(journal.size(), good_len);
    assert_eq!(journal.append(&put("c", "3")).unwrap(), 2);
}

#[test]
fn test_reset_keeps_lsn_moving() {
    let (_temp, path) = setup_temp_journal();
    let (mut journal, _, _) =
        Journal::open(&path, SyncStrategy::EveryNEntries { count: 10 }, 0).unwrap();
    journal.append(&put("a", "1")).unwrap();
    journal.reset().unwrap();

    assert_eq!(journal.size(), 0);
    assert_eq!(journal.append(&put("b", "2")).unwrap(), 2);
}
