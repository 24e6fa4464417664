use std::collections::BTreeMap;
use std::sync::Mutex;

/// A value slot in the reference memtable: either a stored value or a
/// tombstone, versioned by the sequence number that wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Value(Vec<u8>),
    Tombstone,
}

/// Single-writer, multi-reader in-memory sorted table standing in for the
/// arena skiplist a real engine would use.
///
/// The pipeline's own `apply` stage already serializes mutation of whichever
/// memtable a batch was routed to (the host engine's `write` hook hands out
/// at most one memtable per batch, and batches are applied one at a time by
/// their own submitting thread), so this reference collaborator does not
/// need to be lock-free itself; a plain `Mutex`-guarded `BTreeMap` is
/// sufficient and keeps the reference environment free of `unsafe`.
#[derive(Default)]
pub struct Memtable {
    entries: Mutex<BTreeMap<Vec<u8>, (u64, Entry)>>,
}

impl Memtable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value` for `key` at `seq`, unless a newer version is
    /// already present.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>, seq: u64) {
        self.insert_versioned(key, Entry::Value(value), seq);
    }

    /// Records a deletion of `key` at `seq`, unless a newer version is
    /// already present.
    pub fn delete(&self, key: Vec<u8>, seq: u64) {
        self.insert_versioned(key, Entry::Tombstone, seq);
    }

    fn insert_versioned(&self, key: Vec<u8>, entry: Entry, seq: u64) {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(&key) {
            Some((existing_seq, _)) if *existing_seq > seq => {}
            _ => {
                entries.insert(key, (seq, entry));
            }
        }
    }

    /// Looks up the current entry for `key`, if any.
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .map(|(_, entry)| entry.clone())
    }

    /// Number of distinct keys currently tracked (including tombstones).
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let mem = Memtable::new();
        mem.put(b"k".to_vec(), b"v".to_vec(), 1);
        assert_eq!(mem.get(b"k"), Some(Entry::Value(b"v".to_vec())));
    }

    #[test]
    fn newer_version_wins_over_older() {
        let mem = Memtable::new();
        mem.put(b"k".to_vec(), b"v1".to_vec(), 5);
        mem.put(b"k".to_vec(), b"v2".to_vec(), 2);
        assert_eq!(mem.get(b"k"), Some(Entry::Value(b"v1".to_vec())), "stale write must not overwrite a newer one");
    }

    #[test]
    fn delete_records_a_tombstone() {
        let mem = Memtable::new();
        mem.put(b"k".to_vec(), b"v".to_vec(), 1);
        mem.delete(b"k".to_vec(), 2);
        assert_eq!(mem.get(b"k"), Some(Entry::Tombstone));
    }
}
