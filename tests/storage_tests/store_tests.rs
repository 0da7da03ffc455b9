//! Tests for DiskStore

use relaykv::{Config, DiskStore, KvEngine, SyncStrategy};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn collect_from(store: &DiskStore, start: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    store
        .scan_from(start, &mut |k: &[u8], v: &[u8]| {
            out.push((k.to_vec(), v.to_vec()));
            true
        })
        .unwrap();
    out
}

// =============================================================================
// Basic Operation Tests
// =============================================================================

#[test]
fn test_put_get_delete() {
    let temp = TempDir::new().unwrap();
    let store = DiskStore::open_path(temp.path()).unwrap();

    store.put(b"k", b"v1").unwrap();
    store.put(b"k", b"v2").unwrap();
    assert_eq!(store.get(b"k").unwrap(), Some(b"v2".to_vec()));

    store.delete(b"k").unwrap();
    assert_eq!(store.get(b"k").unwrap(), None);

    // Deleting an absent key is fine
    store.delete(b"never").unwrap();
}

#[test]
fn test_scan_and_size() {
    let temp = TempDir::new().unwrap();
    let store = DiskStore::open_path(temp.path()).unwrap();
    store.put(b"b", b"2").unwrap();
    store.put(b"a", b"1").unwrap();
    store.put(b"c", b"3").unwrap();

    let pairs = collect_from(&store, b"b");
    assert_eq!(
        pairs,
        vec![(b"b".to_vec(), b"2".to_vec()), (b"c".to_vec(), b"3".to_vec())]
    );
    assert_eq!(store.approximate_size(b"a", b"c").unwrap(), 4);
}

// =============================================================================
// Durability Tests
// =============================================================================

#[test]
fn test_reopen_replays_journal() {
    let temp = TempDir::new().unwrap();
    {
        let store = DiskStore::open_path(temp.path()).unwrap();
        store.put(b"a", b"1").unwrap();
        store.put(b"b", b"2").unwrap();
        store.delete(b"a").unwrap();
        // Dropped without close: only the journal has the data
    }

    let store = DiskStore::open_path(temp.path()).unwrap();
    assert_eq!(store.get(b"a").unwrap(), None);
    assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
    assert_eq!(store.entry_count(), 1);
}

#[test]
fn test_close_checkpoints() {
    let temp = TempDir::new().unwrap();
    {
        let store = DiskStore::open_path(temp.path()).unwrap();
        store.put(b"a", b"1").unwrap();
        store.close().unwrap();
        assert_eq!(store.journal_size(), 0);
    }

    let store = DiskStore::open_path(temp.path()).unwrap();
    assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_threshold_checkpoint_then_more_writes() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .sync_strategy(SyncStrategy::EveryWrite)
        .checkpoint_threshold(64)
        .build();
    {
        let store = DiskStore::open(&config).unwrap();
        for i in 0..20 {
            store
                .put(format!("key{:02}", i).as_bytes(), b"some value")
                .unwrap();
        }
        assert!(store.journal_size() < 64 + 64);
        store.delete(b"key00").unwrap();
    }

    let store = DiskStore::open(&config).unwrap();
    assert_eq!(store.entry_count(), 19);
    assert_eq!(store.get(b"key00").unwrap(), None);
    assert_eq!(store.get(b"key19").unwrap(), Some(b"some value".to_vec()));
}
