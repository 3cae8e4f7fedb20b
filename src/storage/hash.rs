//! Hash index for TabulaDB
//!
//! Unordered value → positions map. Equality lookups only.

use std::collections::HashMap;

use super::cell::Cell;
use super::index::{insert_posting, remove_posting, shift_postings, Index, IndexKind, RowPosition};

/// Hash index over one column
#[derive(Debug, Default)]
pub struct HashIndex {
    buckets: HashMap<Cell, Vec<RowPosition>>,
    entries: usize,
}

impl HashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct keys
    pub fn distinct_keys(&self) -> usize {
        self.buckets.len()
    }
}

impl Index for HashIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Hash
    }

    fn insert(&mut self, key: Cell, position: RowPosition) {
        let postings = self.buckets.entry(key).or_default();
        let before = postings.len();
        insert_posting(postings, position);
        self.entries += postings.len() - before;
    }

    fn remove(&mut self, key: &Cell, position: RowPosition) -> bool {
        let Some(postings) = self.buckets.get_mut(key) else {
            return false;
        };
        let removed = remove_posting(postings, position);
        if postings.is_empty() {
            self.buckets.remove(key);
        }
        if removed {
            self.entries -= 1;
        }
        removed
    }

    fn lookup(&self, key: &Cell) -> Vec<RowPosition> {
        self.buckets.get(key).cloned().unwrap_or_default()
    }

    fn shift_down(&mut self, removed: RowPosition) {
        for postings in self.buckets.values_mut() {
            shift_postings(postings, removed);
        }
    }

    fn len(&self) -> usize {
        self.entries
    }
}
