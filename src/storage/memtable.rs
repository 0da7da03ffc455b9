//! MemTable implementation
//!
//! BTreeMap-based ordered table with RwLock for concurrency. Holds the whole
//! key space; durability comes from the journal and table checkpoints.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

/// In-memory ordered key space
pub struct MemTable {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    /// Approximate size in bytes (keys + values)
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self::from_map(BTreeMap::new())
    }

    /// Wrap an already loaded map
    pub fn from_map(map: BTreeMap<Vec<u8>, Vec<u8>>) -> Self {
        let size = map.iter().map(|(k, v)| k.len() + v.len()).sum();
        Self {
            data: RwLock::new(map),
            size: AtomicUsize::new(size),
        }
    }

    /// Get a value by key (read lock)
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.read().get(key).cloned()
    }

    /// Insert or replace a value (write lock), returning the new table size
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> usize {
        let added = key.len() + value.len();
        let mut data = self.data.write();
        let removed = data
            .get(&key)
            .map(|old| key.len() + old.len())
            .unwrap_or(0);
        data.insert(key, value);
        self.resize(added, removed)
    }

    /// Remove a key (write lock), returning the new table size
    pub fn delete(&self, key: &[u8]) -> usize {
        let mut data = self.data.write();
        let removed = data
            .remove(key)
            .map(|old| key.len() + old.len())
            .unwrap_or(0);
        self.resize(0, removed)
    }

    /// Visit pairs in key order from `start` (inclusive) until `visit`
    /// returns false
    pub fn scan_from(&self, start: &[u8], visit: &mut dyn FnMut(&[u8], &[u8]) -> bool) {
        let data = self.data.read();
        let range = data.range::<[u8], _>((Bound::Included(start), Bound::Unbounded));
        for (key, value) in range {
            if !visit(key, value) {
                break;
            }
        }
    }

    /// Bytes held by keys in `[start, end)`; an empty `end` means no bound
    pub fn range_size(&self, start: &[u8], end: &[u8]) -> u64 {
        let upper = if end.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(end)
        };
        let data = self.data.read();
        data.range::<[u8], _>((Bound::Included(start), upper))
            .map(|(k, v)| (k.len() + v.len()) as u64)
            .sum()
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Get entry count
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Run `f` over a consistent view of the table (read lock held)
    pub fn with_entries<R>(&self, f: impl FnOnce(&BTreeMap<Vec<u8>, Vec<u8>>) -> R) -> R {
        f(&self.data.read())
    }

    fn resize(&self, added: usize, removed: usize) -> usize {
        // Only called with the write lock held, so load/store is not racy
        let size = self.size.load(Ordering::Acquire) + added - removed;
        self.size.store(size, Ordering::Release);
        size
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}
