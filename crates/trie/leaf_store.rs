//! Content-addressed, reference-counted storage of leaf values.
//!
//! The store maps a leaf digest to the value bytes plus a refcount. Two
//! leaves with equal bytes share a single entry; upsert increments, leaf
//! removal decrements, and the entry is dropped when the count reaches
//! zero. The garbage collector rebuilds the store from the live roots,
//! which also reclaims counts leaked by edits that were never committed.

use std::collections::HashMap;

use primitive_types::H256;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::node_hash::leaf_digest;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LeafEntry {
    value: Vec<u8>,
    refs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeafStore {
    entries: HashMap<H256, LeafEntry>,
}

impl LeafStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `value`, incrementing its refcount, and returns its digest.
    pub fn insert(&mut self, value: &[u8]) -> H256 {
        let digest = leaf_digest(value);
        self.entries
            .entry(digest)
            .and_modify(|entry| entry.refs += 1)
            .or_insert_with(|| LeafEntry {
                value: value.to_vec(),
                refs: 1,
            });
        digest
    }

    pub fn get(&self, digest: &H256) -> Option<&[u8]> {
        self.entries.get(digest).map(|entry| entry.value.as_slice())
    }

    /// Decrements the refcount of `digest`, removing the entry at zero.
    ///
    /// Decrementing an absent digest is a no-op, observable only here.
    pub fn decr(&mut self, digest: &H256) {
        match self.entries.get_mut(digest) {
            Some(entry) if entry.refs > 1 => entry.refs -= 1,
            Some(_) => {
                self.entries.remove(digest);
            }
            None => debug!(digest = ?digest, "decr on absent leaf digest"),
        }
    }

    /// Current refcount of `digest`; zero when absent.
    pub fn refcount(&self, digest: &H256) -> u64 {
        self.entries.get(digest).map(|entry| entry.refs).unwrap_or(0)
    }

    /// Number of distinct values held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total bytes of stored values, for diagnostics.
    pub fn value_bytes(&self) -> u64 {
        self.entries
            .values()
            .map(|entry| entry.value.len() as u64)
            .sum()
    }

    /// Sum of all refcounts, for diagnostics and conservation checks.
    pub fn total_refs(&self) -> u64 {
        self.entries.values().map(|entry| entry.refs).sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn insert_dedups_and_counts() {
        let mut store = LeafStore::new();
        let a = store.insert(b"same");
        let b = store.insert(b"same");
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
        assert_eq!(store.refcount(&a), 2);
        assert_eq!(store.get(&a), Some(&b"same"[..]));
    }

    #[test]
    fn decr_removes_at_zero() {
        let mut store = LeafStore::new();
        let d = store.insert(b"v");
        store.insert(b"v");
        store.decr(&d);
        assert_eq!(store.refcount(&d), 1);
        store.decr(&d);
        assert_eq!(store.refcount(&d), 0);
        assert!(store.get(&d).is_none());
        // Absent decr is silent.
        store.decr(&d);
        assert!(store.is_empty());
    }
}
