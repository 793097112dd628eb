//! In-memory ordered map backing the LSM engine's write path. Grounded on
//! `examples/original_source/lsm/memtable.go`'s skip-map-backed `Memtable`;
//! `crossbeam_skiplist::SkipMap` plays the role the Go source gives
//! `skipmap.StringMap`.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_skiplist::SkipMap;

/// A mutable, concurrently-writable ordered map. Multiple threads may hold a
/// shared reference and call [`Memtable::put`] at once -- the skip-list is
/// internally synchronized, which is what lets the LSM engine's fast `Put`
/// path get away with only a *read* lock on the surrounding RO-data guard.
pub struct Memtable {
    data: SkipMap<Vec<u8>, Vec<u8>>,
    approx_size: AtomicUsize,
}

impl Memtable {
    pub fn new() -> Self {
        Memtable { data: SkipMap::new(), approx_size: AtomicUsize::new(0) }
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.get(key).map(|e| e.value().clone())
    }

    pub fn put(&self, key: &[u8], value: Vec<u8>) {
        self.approx_size.fetch_add(key.len() + value.len(), Ordering::Relaxed);
        self.data.insert(key.to_vec(), value);
    }

    /// Approximate byte size of all keys and values ever inserted. Grows
    /// monotonically (an overwrite is still counted) -- exactness isn't
    /// required, only that the memtable eventually reports itself full.
    pub fn size(&self) -> usize {
        self.approx_size.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Vec<u8>, Vec<u8>)> + '_ {
        self.data.iter().map(|e| (e.key().clone(), e.value().clone()))
    }

    pub fn into_readonly(self) -> ReadonlyMemtable {
        ReadonlyMemtable(self)
    }
}

impl Default for Memtable {
    fn default() -> Self {
        Self::new()
    }
}

/// An immutable snapshot of a [`Memtable`] awaiting flush to L0. Read-only
/// in name only -- nothing currently writes through it; the type exists to
/// keep "this memtable is done accepting writes" visible at the type level.
pub struct ReadonlyMemtable(Memtable);

impl ReadonlyMemtable {
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Vec<u8>, Vec<u8>)> + '_ {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_returns_latest_write() {
        let m = Memtable::new();
        m.put(b"a", vec![1]);
        m.put(b"a", vec![2]);
        assert_eq!(m.get(b"a"), Some(vec![2]));
        assert_eq!(m.get(b"missing"), None);
    }

    #[test]
    fn size_grows_with_inserts() {
        let m = Memtable::new();
        assert_eq!(m.size(), 0);
        m.put(b"a", vec![1, 2, 3]);
        assert!(m.size() > 0);
    }

    #[test]
    fn readonly_snapshot_still_readable() {
        let m = Memtable::new();
        m.put(b"a", vec![1]);
        let ro = m.into_readonly();
        assert_eq!(ro.get(b"a"), Some(vec![1]));
        assert_eq!(ro.iter().count(), 1);
    }

    #[test]
    fn iter_yields_keys_in_sorted_order() {
        let m = Memtable::new();
        m.put(b"c", vec![3]);
        m.put(b"a", vec![1]);
        m.put(b"b", vec![2]);
        let keys: Vec<_> = m.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }
}
