//! B+ Tree Index for TabulaDB
//!
//! This module implements a B+ tree index for efficient key lookups.
//! The B+ tree is a self-balancing tree that keeps keys sorted, stores every
//! entry in its leaves and links the leaves left to right, so it answers
//! point lookups in O(log n) and range lookups in O(log n + k).
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. Each leaf
//! key is distinct and owns the sorted list of row positions holding it.
//! Deletion rebalances by borrowing from a sibling or merging with it, and
//! the root collapses when it loses its last separator.

use std::cmp::Ordering;
use std::ops::Bound;

use super::cell::Cell;
use super::index::{insert_posting, remove_posting, shift_postings, Index, IndexKind, RowPosition};
use crate::config::{DEFAULT_BTREE_ORDER, MIN_BTREE_ORDER};

type NodeId = usize;

/// A B+ tree node
///
/// Internal nodes hold `keys.len() + 1` children; child `i` covers keys in
/// `[keys[i - 1], keys[i])`. Leaves hold one posting list per key.
#[derive(Debug, Default)]
struct Node {
    leaf: bool,
    keys: Vec<Cell>,
    children: Vec<NodeId>,
    postings: Vec<Vec<RowPosition>>,
    /// Right sibling leaf
    next: Option<NodeId>,
}

impl Node {
    fn empty_leaf() -> Self {
        Self {
            leaf: true,
            ..Self::default()
        }
    }

    fn child_for(&self, key: &Cell) -> usize {
        self.keys.partition_point(|k| k <= key)
    }
}

/// B+ Tree Index
#[derive(Debug)]
pub struct BPlusTree {
    nodes: Vec<Node>,
    free: Vec<NodeId>,
    root: NodeId,
    /// Maximum number of children of an internal node
    order: usize,
    /// Number of (key, position) entries
    entries: usize,
}

impl Default for BPlusTree {
    fn default() -> Self {
        Self::new(DEFAULT_BTREE_ORDER)
    }
}

impl BPlusTree {
    /// Create an empty tree; orders below the minimum are raised to it
    pub fn new(order: usize) -> Self {
        Self {
            nodes: vec![Node::empty_leaf()],
            free: Vec::new(),
            root: 0,
            order: order.max(MIN_BTREE_ORDER),
            entries: 0,
        }
    }

    fn max_keys(&self) -> usize {
        self.order - 1
    }

    fn min_keys(&self) -> usize {
        (self.order - 1) / 2
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = node;
                id
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        self.nodes[id] = Node::default();
        self.free.push(id);
    }

    /// Number of levels from root to leaves
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut id = self.root;
        while !self.nodes[id].leaf {
            id = self.nodes[id].children[0];
            height += 1;
        }
        height
    }

    /// Number of distinct keys
    pub fn distinct_keys(&self) -> usize {
        self.leaves().map(|id| self.nodes[id].keys.len()).sum()
    }

    fn find_leaf(&self, key: &Cell) -> NodeId {
        let mut id = self.root;
        while !self.nodes[id].leaf {
            let node = &self.nodes[id];
            id = node.children[node.child_for(key)];
        }
        id
    }

    fn leftmost_leaf(&self) -> NodeId {
        let mut id = self.root;
        while !self.nodes[id].leaf {
            id = self.nodes[id].children[0];
        }
        id
    }

    /// Leaf ids in chain order
    fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(self.leftmost_leaf()), move |&id| self.nodes[id].next)
    }

    /// All keys with their positions, in ascending key order
    pub fn entries(&self) -> Vec<(Cell, Vec<RowPosition>)> {
        self.leaves()
            .flat_map(|id| {
                let node = &self.nodes[id];
                node.keys.iter().cloned().zip(node.postings.iter().cloned())
            })
            .collect()
    }

    // ========== Insertion ==========

    fn insert_into(&mut self, id: NodeId, key: Cell, position: RowPosition) -> Option<(Cell, NodeId)> {
        let max_keys = self.max_keys();

        if self.nodes[id].leaf {
            let node = &mut self.nodes[id];
            match node.keys.binary_search(&key) {
                Ok(at) => {
                    let before = node.postings[at].len();
                    insert_posting(&mut node.postings[at], position);
                    self.entries += node.postings[at].len() - before;
                    return None;
                }
                Err(at) => {
                    node.keys.insert(at, key);
                    node.postings.insert(at, vec![position]);
                }
            }
            self.entries += 1;
            return (self.nodes[id].keys.len() > max_keys).then(|| self.split_leaf(id));
        }

        let at = self.nodes[id].child_for(&key);
        let child = self.nodes[id].children[at];
        let (separator, right) = self.insert_into(child, key, position)?;

        let node = &mut self.nodes[id];
        node.keys.insert(at, separator);
        node.children.insert(at + 1, right);
        (node.keys.len() > max_keys).then(|| self.split_internal(id))
    }

    /// Split an overfull leaf; the separator is the right half's first key
    fn split_leaf(&mut self, id: NodeId) -> (Cell, NodeId) {
        let node = &mut self.nodes[id];
        let mid = node.keys.len() / 2;
        let right = Node {
            leaf: true,
            keys: node.keys.split_off(mid),
            children: Vec::new(),
            postings: node.postings.split_off(mid),
            next: node.next,
        };
        let separator = right.keys[0].clone();
        let right_id = self.alloc(right);
        self.nodes[id].next = Some(right_id);
        (separator, right_id)
    }

    /// Split an overfull internal node, promoting its middle key
    fn split_internal(&mut self, id: NodeId) -> (Cell, NodeId) {
        let node = &mut self.nodes[id];
        let mid = node.keys.len() / 2;
        let mut right_keys = node.keys.split_off(mid);
        let separator = right_keys.remove(0);
        let right = Node {
            leaf: false,
            keys: right_keys,
            children: node.children.split_off(mid + 1),
            postings: Vec::new(),
            next: None,
        };
        (separator, self.alloc(right))
    }

    // ========== Deletion ==========

    fn remove_from(&mut self, id: NodeId, key: &Cell, position: RowPosition) -> bool {
        if self.nodes[id].leaf {
            let node = &mut self.nodes[id];
            let Ok(at) = node.keys.binary_search(key) else {
                return false;
            };
            if !remove_posting(&mut node.postings[at], position) {
                return false;
            }
            if node.postings[at].is_empty() {
                node.keys.remove(at);
                node.postings.remove(at);
            }
            self.entries -= 1;
            return true;
        }

        let at = self.nodes[id].child_for(key);
        let child = self.nodes[id].children[at];
        let removed = self.remove_from(child, key, position);
        if removed && self.nodes[child].keys.len() < self.min_keys() {
            self.rebalance(id, at);
        }
        removed
    }

    /// Restore the minimum fill of `parent`'s child at `at`
    fn rebalance(&mut self, parent: NodeId, at: usize) {
        let min_keys = self.min_keys();
        let siblings = self.nodes[parent].children.len();
        let fill = |tree: &Self, idx: usize| tree.nodes[tree.nodes[parent].children[idx]].keys.len();

        if at > 0 && fill(self, at - 1) > min_keys {
            self.borrow_from_left(parent, at);
        } else if at + 1 < siblings && fill(self, at + 1) > min_keys {
            self.borrow_from_right(parent, at);
        } else if at > 0 {
            self.merge_children(parent, at - 1);
        } else if at + 1 < siblings {
            self.merge_children(parent, at);
        }
    }

    fn borrow_from_left(&mut self, parent: NodeId, at: usize) {
        let left_id = self.nodes[parent].children[at - 1];
        let child_id = self.nodes[parent].children[at];
        let mut left = std::mem::take(&mut self.nodes[left_id]);
        let mut child = std::mem::take(&mut self.nodes[child_id]);

        let last = left.keys.len() - 1;
        if child.leaf {
            child.keys.insert(0, left.keys.remove(last));
            child.postings.insert(0, left.postings.remove(last));
            self.nodes[parent].keys[at - 1] = child.keys[0].clone();
        } else {
            let separator = std::mem::replace(
                &mut self.nodes[parent].keys[at - 1],
                left.keys.remove(last),
            );
            child.keys.insert(0, separator);
            child.children.insert(0, left.children.remove(last + 1));
        }

        self.nodes[left_id] = left;
        self.nodes[child_id] = child;
    }

    fn borrow_from_right(&mut self, parent: NodeId, at: usize) {
        let child_id = self.nodes[parent].children[at];
        let right_id = self.nodes[parent].children[at + 1];
        let mut child = std::mem::take(&mut self.nodes[child_id]);
        let mut right = std::mem::take(&mut self.nodes[right_id]);

        if child.leaf {
            child.keys.push(right.keys.remove(0));
            child.postings.push(right.postings.remove(0));
            self.nodes[parent].keys[at] = right.keys[0].clone();
        } else {
            let separator =
                std::mem::replace(&mut self.nodes[parent].keys[at], right.keys.remove(0));
            child.keys.push(separator);
            child.children.push(right.children.remove(0));
        }

        self.nodes[child_id] = child;
        self.nodes[right_id] = right;
    }

    /// Fold the child at `at + 1` into the child at `at`
    fn merge_children(&mut self, parent: NodeId, at: usize) {
        let left_id = self.nodes[parent].children[at];
        let right_id = self.nodes[parent].children.remove(at + 1);
        let separator = self.nodes[parent].keys.remove(at);
        let right = std::mem::take(&mut self.nodes[right_id]);

        let left = &mut self.nodes[left_id];
        if left.leaf {
            left.keys.extend(right.keys);
            left.postings.extend(right.postings);
            left.next = right.next;
        } else {
            left.keys.push(separator);
            left.keys.extend(right.keys);
            left.children.extend(right.children);
        }
        self.release(right_id);
    }

    // ========== Diagnostics ==========

    /// Verify the structural invariants: sorted leaves, separators that
    /// partition their children, node fill bounds, uniform leaf depth, and a
    /// leaf chain that visits every key in ascending order.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let mut leaf_depth = None;
        let mut tree_keys = 0;
        self.check_node(self.root, None, None, 0, &mut leaf_depth, &mut tree_keys)?;

        let mut chained_keys = 0;
        let mut previous: Option<&Cell> = None;
        for id in self.leaves() {
            for key in &self.nodes[id].keys {
                if previous.is_some_and(|p| p >= key) {
                    return Err(format!("leaf chain out of order at key {}", key));
                }
                previous = Some(key);
                chained_keys += 1;
            }
        }
        if chained_keys != tree_keys {
            return Err(format!(
                "leaf chain visits {} keys, tree holds {}",
                chained_keys, tree_keys
            ));
        }

        let total: usize = self
            .leaves()
            .flat_map(|id| self.nodes[id].postings.iter())
            .map(Vec::len)
            .sum();
        if total != self.entries {
            return Err(format!("{} postings, {} entries recorded", total, self.entries));
        }
        Ok(())
    }

    fn check_node(
        &self,
        id: NodeId,
        lower: Option<&Cell>,
        upper: Option<&Cell>,
        depth: usize,
        leaf_depth: &mut Option<usize>,
        tree_keys: &mut usize,
    ) -> std::result::Result<(), String> {
        let node = &self.nodes[id];

        if node.keys.windows(2).any(|w| w[0] >= w[1]) {
            return Err(format!("node {} keys not strictly ascending", id));
        }
        if let (Some(lower), Some(first)) = (lower, node.keys.first()) {
            if first < lower {
                return Err(format!("node {} key {} below separator {}", id, first, lower));
            }
        }
        if let (Some(upper), Some(last)) = (upper, node.keys.last()) {
            if last.cmp(upper) != Ordering::Less {
                return Err(format!("node {} key {} not below separator {}", id, last, upper));
            }
        }
        if node.keys.len() > self.max_keys() {
            return Err(format!("node {} overfull", id));
        }
        if id != self.root && node.keys.len() < self.min_keys() {
            return Err(format!("node {} underfull", id));
        }

        if node.leaf {
            match *leaf_depth {
                None => *leaf_depth = Some(depth),
                Some(d) if d != depth => {
                    return Err(format!("leaf {} at depth {}, expected {}", id, depth, d))
                }
                Some(_) => {}
            }
            if node.postings.len() != node.keys.len()
                || node
                    .postings
                    .iter()
                    .any(|p| p.is_empty() || p.windows(2).any(|w| w[0] >= w[1]))
            {
                return Err(format!("leaf {} has malformed postings", id));
            }
            *tree_keys += node.keys.len();
            return Ok(());
        }

        if node.children.len() != node.keys.len() + 1 {
            return Err(format!("internal node {} has mismatched children", id));
        }
        if id == self.root && node.keys.is_empty() {
            return Err("internal root without separators".to_string());
        }
        for (i, &child) in node.children.iter().enumerate() {
            let child_lower = if i == 0 { lower } else { Some(&node.keys[i - 1]) };
            let child_upper = node.keys.get(i).or(upper);
            self.check_node(child, child_lower, child_upper, depth + 1, leaf_depth, tree_keys)?;
        }
        Ok(())
    }
}

fn within_lower(key: &Cell, lower: Bound<&Cell>) -> bool {
    match lower {
        Bound::Included(b) => key >= b,
        Bound::Excluded(b) => key > b,
        Bound::Unbounded => true,
    }
}

fn within_upper(key: &Cell, upper: Bound<&Cell>) -> bool {
    match upper {
        Bound::Included(b) => key <= b,
        Bound::Excluded(b) => key < b,
        Bound::Unbounded => true,
    }
}

impl Index for BPlusTree {
    fn kind(&self) -> IndexKind {
        IndexKind::BTree
    }

    fn insert(&mut self, key: Cell, position: RowPosition) {
        if let Some((separator, right)) = self.insert_into(self.root, key, position) {
            let root = Node {
                leaf: false,
                keys: vec![separator],
                children: vec![self.root, right],
                postings: Vec::new(),
                next: None,
            };
            self.root = self.alloc(root);
        }
    }

    fn remove(&mut self, key: &Cell, position: RowPosition) -> bool {
        let removed = self.remove_from(self.root, key, position);

        let root = &self.nodes[self.root];
        if !root.leaf && root.keys.is_empty() {
            let only_child = root.children[0];
            self.release(self.root);
            self.root = only_child;
        }
        removed
    }

    fn lookup(&self, key: &Cell) -> Vec<RowPosition> {
        let leaf = &self.nodes[self.find_leaf(key)];
        match leaf.keys.binary_search(key) {
            Ok(at) => leaf.postings[at].clone(),
            Err(_) => Vec::new(),
        }
    }

    fn range(&self, lower: Bound<&Cell>, upper: Bound<&Cell>) -> Option<Vec<RowPosition>> {
        let start = match lower {
            Bound::Included(key) | Bound::Excluded(key) => self.find_leaf(key),
            Bound::Unbounded => self.leftmost_leaf(),
        };

        let mut positions = Vec::new();
        let mut leaf = Some(start);
        'chain: while let Some(id) = leaf {
            let node = &self.nodes[id];
            for (key, postings) in node.keys.iter().zip(&node.postings) {
                if !within_upper(key, upper) {
                    break 'chain;
                }
                if within_lower(key, lower) {
                    positions.extend_from_slice(postings);
                }
            }
            leaf = node.next;
        }

        positions.sort_unstable();
        Some(positions)
    }

    fn shift_down(&mut self, removed: RowPosition) {
        for node in self.nodes.iter_mut().filter(|n| n.leaf) {
            for postings in &mut node.postings {
                shift_postings(postings, removed);
            }
        }
    }

    fn len(&self) -> usize {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> Cell {
        Cell::Integer(v)
    }

    #[test]
    fn test_btree_insert_and_lookup() {
        let mut tree = BPlusTree::new(4);

        for i in 0..100 {
            tree.insert(int(i), i as RowPosition);
        }

        assert_eq!(tree.len(), 100);
        assert!(tree.height() > 2);
        tree.check_invariants().unwrap();

        for i in 0..100 {
            assert_eq!(tree.lookup(&int(i)), vec![i as RowPosition]);
        }
        assert!(tree.lookup(&int(100)).is_empty());
    }

    #[test]
    fn test_btree_duplicate_keys_share_a_leaf_entry() {
        let mut tree = BPlusTree::new(4);
        tree.insert(int(7), 3);
        tree.insert(int(7), 1);
        tree.insert(int(7), 3);

        assert_eq!(tree.lookup(&int(7)), vec![1, 3]);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.distinct_keys(), 1);
    }

    #[test]
    fn test_btree_range_scan() {
        let mut tree = BPlusTree::new(4);

        // Insert in reverse so positions do not follow key order
        for (pos, key) in (0..50).rev().enumerate() {
            tree.insert(int(key * 2), pos);
        }

        let hits = tree
            .range(Bound::Included(&int(10)), Bound::Excluded(&int(20)))
            .unwrap();
        let mut expected: Vec<RowPosition> = (5..10).map(|k| 49 - k).collect();
        expected.sort_unstable();
        assert_eq!(hits, expected);

        let above = tree.range(Bound::Excluded(&int(94)), Bound::Unbounded).unwrap();
        assert_eq!(above, vec![0, 1]);

        let all = tree.range(Bound::Unbounded, Bound::Unbounded).unwrap();
        assert_eq!(all.len(), 50);

        let none = tree
            .range(Bound::Included(&int(11)), Bound::Included(&int(11)))
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_btree_delete_rebalances() {
        for order in [3, 4, 5, 8] {
            let mut tree = BPlusTree::new(order);
            for i in 0..200 {
                tree.insert(int((i * 37) % 200), i as RowPosition);
            }
            tree.check_invariants().unwrap();

            // Remove every key in an interleaved order
            for i in (0..200).step_by(2).chain((1..200).step_by(2)) {
                let key = int((i * 37) % 200);
                assert!(tree.remove(&key, i as RowPosition), "order {} key {}", order, key);
                tree.check_invariants()
                    .unwrap_or_else(|e| panic!("order {} after removing {}: {}", order, key, e));
            }

            assert!(tree.is_empty());
            assert_eq!(tree.height(), 1);
        }
    }

    #[test]
    fn test_btree_remove_missing_entry() {
        let mut tree = BPlusTree::new(4);
        tree.insert(int(1), 0);

        assert!(!tree.remove(&int(2), 0));
        assert!(!tree.remove(&int(1), 5));
        assert!(tree.remove(&int(1), 0));
        assert!(!tree.remove(&int(1), 0));
    }

    #[test]
    fn test_btree_reuses_released_nodes() {
        let mut tree = BPlusTree::new(3);
        let mut high_water = 0;
        for round in 0..5 {
            for i in 0..64 {
                tree.insert(int(i), i as RowPosition);
            }
            if round == 0 {
                high_water = tree.nodes.len();
            }
            assert!(tree.nodes.len() <= high_water, "round {}", round);
            for i in 0..64 {
                tree.remove(&int(i), i as RowPosition);
            }
            assert!(tree.is_empty(), "round {}", round);
        }
    }

    #[test]
    fn test_btree_shift_down() {
        let mut tree = BPlusTree::new(4);
        for (pos, name) in ["d", "a", "c", "b"].iter().enumerate() {
            tree.insert(Cell::Text(name.to_string()), pos);
        }

        tree.remove(&Cell::Text("a".to_string()), 1);
        tree.shift_down(1);

        let keys: Vec<(String, Vec<RowPosition>)> = tree
            .entries()
            .into_iter()
            .map(|(k, p)| (k.to_string(), p))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("b".to_string(), vec![2]),
                ("c".to_string(), vec![1]),
                ("d".to_string(), vec![0]),
            ]
        );
    }
}
