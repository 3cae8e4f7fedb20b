//! Secondary index contract
//!
//! Both index kinds map a column value to the sorted set of row positions
//! holding that value. Positions are offsets into the owning table's
//! insertion-ordered row list, so the table rewrites them on every delete.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Bound;
use std::str::FromStr;

use super::cell::Cell;
use crate::error::UnknownName;

/// Position of a row in its table (0-based insertion order)
pub type RowPosition = usize;

/// Index kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Ordered B+ tree, supports range lookups
    BTree,
    /// Hash map, equality only
    Hash,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::BTree => write!(f, "btree"),
            IndexKind::Hash => write!(f, "hash"),
        }
    }
}

impl FromStr for IndexKind {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "btree" | "b+tree" | "bplustree" => Ok(IndexKind::BTree),
            "hash" => Ok(IndexKind::Hash),
            _ => Err(UnknownName {
                what: "index kind",
                name: s.to_string(),
                expected: "btree or hash",
            }),
        }
    }
}

/// Behaviour shared by every index kind
pub trait Index: fmt::Debug + Send + Sync {
    fn kind(&self) -> IndexKind;

    /// Record that the row at `position` holds `key`
    fn insert(&mut self, key: Cell, position: RowPosition);

    /// Forget one (key, position) entry; returns whether it existed
    fn remove(&mut self, key: &Cell, position: RowPosition) -> bool;

    /// Positions holding `key`, ascending
    fn lookup(&self, key: &Cell) -> Vec<RowPosition>;

    /// Positions whose key lies within the bounds, or `None` if this index
    /// kind cannot answer range queries
    fn range(&self, _lower: Bound<&Cell>, _upper: Bound<&Cell>) -> Option<Vec<RowPosition>> {
        None
    }

    /// Renumber after the row at `removed` was deleted: every position above
    /// it moves down by one
    fn shift_down(&mut self, removed: RowPosition);

    /// Number of (key, position) entries
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build an empty index of the given kind
pub fn new_index(kind: IndexKind, btree_order: usize) -> Box<dyn Index> {
    match kind {
        IndexKind::BTree => Box::new(super::btree::BPlusTree::new(btree_order)),
        IndexKind::Hash => Box::new(super::hash::HashIndex::new()),
    }
}

pub(crate) fn insert_posting(postings: &mut Vec<RowPosition>, position: RowPosition) {
    if let Err(at) = postings.binary_search(&position) {
        postings.insert(at, position);
    }
}

pub(crate) fn remove_posting(postings: &mut Vec<RowPosition>, position: RowPosition) -> bool {
    match postings.binary_search(&position) {
        Ok(at) => {
            postings.remove(at);
            true
        }
        Err(_) => false,
    }
}

pub(crate) fn shift_postings(postings: &mut [RowPosition], removed: RowPosition) {
    for position in postings.iter_mut().filter(|p| **p > removed) {
        *position -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_kind_names() {
        assert_eq!("BTREE".parse::<IndexKind>().unwrap(), IndexKind::BTree);
        assert_eq!("hash".parse::<IndexKind>().unwrap(), IndexKind::Hash);
        let err = "bitmap".parse::<IndexKind>().unwrap_err();
        assert_eq!(err.name, "bitmap");
        assert_eq!(err.what, "index kind");
        assert_eq!(IndexKind::BTree.to_string(), "btree");
    }

    #[test]
    fn test_postings_stay_sorted() {
        let mut postings = Vec::new();
        for p in [5, 1, 3, 3] {
            insert_posting(&mut postings, p);
        }
        assert_eq!(postings, vec![1, 3, 5]);

        assert!(remove_posting(&mut postings, 3));
        assert!(!remove_posting(&mut postings, 3));

        shift_postings(&mut postings, 2);
        assert_eq!(postings, vec![1, 4]);
    }
}
