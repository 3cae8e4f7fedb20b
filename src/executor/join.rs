//! Join engine
//!
//! Two-table equi-joins with two interchangeable strategies:
//!
//! - **Nested loop**: for each left row, scan the right table, or probe an
//!   index on the right join column when one exists.
//! - **Hash join**: build a map from right key to right positions in one pass,
//!   then probe it once per left row.
//!
//! Both strategies emit the same rows in the same order: for each left row in
//! storage order its right matches in storage order (or one null-padded row
//! when the kind keeps unmatched left rows), followed by the unmatched right
//! rows in storage order when the kind keeps them.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use tracing::debug;

use crate::error::{Error, Result};
use crate::sql::JoinKind;
use crate::storage::{Cell, Row, RowPosition, Table};

/// A result row; `None` marks a null-padded field
pub type ResultRow = Vec<Option<Cell>>;

/// Join algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStrategy {
    NestedLoop,
    HashJoin,
}

impl fmt::Display for JoinStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinStrategy::NestedLoop => write!(f, "nested loop"),
            JoinStrategy::HashJoin => write!(f, "hash join"),
        }
    }
}

/// Combined rows of a join: left fields, then right fields
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinResult {
    pub kind: JoinKind,
    pub strategy: JoinStrategy,
    /// Whether the nested loop probed an index instead of scanning
    pub index_assisted: bool,
    pub left_width: usize,
    pub right_width: usize,
    pub rows: Vec<ResultRow>,
}

/// Wall time of both strategies on the same inputs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinBenchmark {
    pub nested_loop_millis: f64,
    pub hash_join_millis: f64,
    /// Rows produced (identical for both strategies)
    pub rows: usize,
}

type Pair = (Option<RowPosition>, Option<RowPosition>);

/// Join of `left.left_column = right.right_column`
pub struct JoinEngine<'a> {
    left: &'a Table,
    right: &'a Table,
    left_column: usize,
    right_column: usize,
    right_column_name: &'a str,
    /// INTEGER joined with DOUBLE: keys compare as DOUBLE
    promote: bool,
}

impl<'a> JoinEngine<'a> {
    /// Resolve the join columns; they must exist and be comparable
    pub fn new(left: &'a Table, right: &'a Table, left_column: &str, right_column: &str) -> Result<Self> {
        let left_index = left.column_index(left_column)?;
        let right_index = right.column_index(right_column)?;
        let left_type = left.schema().columns()[left_index].data_type;
        let right_col = &right.schema().columns()[right_index];

        if !left_type.is_comparable_with(&right_col.data_type) {
            return Err(Error::type_mismatch(
                format!("a {} column to join with {}.{}", left_type, left.name(), left_column),
                format!("{} column {}.{}", right_col.data_type, right.name(), right_column),
            ));
        }

        Ok(Self {
            left,
            right,
            left_column: left_index,
            right_column: right_index,
            right_column_name: &right_col.name,
            promote: left_type != right_col.data_type,
        })
    }

    /// Whether an index on the right join column can serve point lookups
    pub fn index_usable(&self) -> bool {
        !self.promote && self.right.point_index(self.right_column_name).is_some()
    }

    /// Nested loop when an index already answers the per-row lookups or the
    /// smaller input is below `threshold` rows, hash join otherwise
    pub fn choose_strategy(&self, threshold: usize) -> JoinStrategy {
        if self.index_usable() || self.left.len().min(self.right.len()) < threshold {
            JoinStrategy::NestedLoop
        } else {
            JoinStrategy::HashJoin
        }
    }

    /// Run the join with `strategy`; nested loop probes an index when usable
    pub fn execute(&self, kind: JoinKind, strategy: JoinStrategy) -> JoinResult {
        let result = match strategy {
            JoinStrategy::NestedLoop => self.nested_loop(kind, true),
            JoinStrategy::HashJoin => self.hash_join(kind),
        };
        debug!(
            left = self.left.name(),
            right = self.right.name(),
            %kind,
            %strategy,
            index_assisted = result.index_assisted,
            rows = result.rows.len(),
            "join executed"
        );
        result
    }

    /// Nested-loop join; with `use_index` the inner scan becomes an index probe
    pub fn nested_loop(&self, kind: JoinKind, use_index: bool) -> JoinResult {
        let index = if use_index && !self.promote {
            self.right.point_index(self.right_column_name)
        } else {
            None
        };

        let pairs = match index {
            Some(index) => self.pair_up(kind, |left_key| index.lookup(left_key)),
            None => self.pair_up(kind, |left_key| {
                self.right
                    .rows()
                    .iter()
                    .enumerate()
                    .filter(|(_, row)| {
                        row.get(self.right_column)
                            .and_then(|right_key| left_key.compare(right_key))
                            == Some(Ordering::Equal)
                    })
                    .map(|(position, _)| position)
                    .collect()
            }),
        };

        self.materialize(kind, JoinStrategy::NestedLoop, index.is_some(), pairs)
    }

    /// Hash join building on the right input
    pub fn hash_join(&self, kind: JoinKind) -> JoinResult {
        let mut buckets: HashMap<Cell, Vec<RowPosition>> = HashMap::new();
        for (position, row) in self.right.rows().iter().enumerate() {
            if let Some(key) = row.get(self.right_column) {
                buckets.entry(self.key(key)).or_default().push(position);
            }
        }

        let pairs = self.pair_up(kind, |left_key| {
            buckets.get(&self.key(left_key)).cloned().unwrap_or_default()
        });
        self.materialize(kind, JoinStrategy::HashJoin, false, pairs)
    }

    /// Time both strategies on an INNER join; the nested loop is the plain scan
    pub fn benchmark(&self) -> JoinBenchmark {
        let start = Instant::now();
        let nested = self.nested_loop(JoinKind::Inner, false);
        let nested_loop_millis = start.elapsed().as_secs_f64() * 1000.0;

        let start = Instant::now();
        let hashed = self.hash_join(JoinKind::Inner);
        let hash_join_millis = start.elapsed().as_secs_f64() * 1000.0;

        debug_assert_eq!(nested.rows, hashed.rows);
        JoinBenchmark {
            nested_loop_millis,
            hash_join_millis,
            rows: hashed.rows.len(),
        }
    }

    fn key(&self, cell: &Cell) -> Cell {
        if self.promote {
            cell.promoted()
        } else {
            cell.clone()
        }
    }

    /// Walk the left rows, asking `matches` for the ascending right positions
    /// equal to each left key, and apply the kind's retention rules
    fn pair_up(&self, kind: JoinKind, mut matches: impl FnMut(&Cell) -> Vec<RowPosition>) -> Vec<Pair> {
        let mut pairs = Vec::new();
        let mut right_matched = vec![false; self.right.len()];

        for (left_position, row) in self.left.rows().iter().enumerate() {
            let hits = match row.get(self.left_column) {
                Some(key) => matches(key),
                None => Vec::new(),
            };

            if hits.is_empty() {
                if kind.keeps_left() {
                    pairs.push((Some(left_position), None));
                }
                continue;
            }
            for right_position in hits {
                right_matched[right_position] = true;
                pairs.push((Some(left_position), Some(right_position)));
            }
        }

        if kind.keeps_right() {
            pairs.extend(
                right_matched
                    .iter()
                    .enumerate()
                    .filter(|(_, matched)| !**matched)
                    .map(|(position, _)| (None, Some(position))),
            );
        }
        pairs
    }

    fn materialize(
        &self,
        kind: JoinKind,
        strategy: JoinStrategy,
        index_assisted: bool,
        pairs: Vec<Pair>,
    ) -> JoinResult {
        let left_width = self.left.schema().column_count();
        let right_width = self.right.schema().column_count();

        let rows = pairs
            .into_iter()
            .map(|(left, right)| {
                let mut row = Vec::with_capacity(left_width + right_width);
                extend_side(&mut row, left.and_then(|p| self.left.row(p)), left_width);
                extend_side(&mut row, right.and_then(|p| self.right.row(p)), right_width);
                row
            })
            .collect();

        JoinResult {
            kind,
            strategy,
            index_assisted,
            left_width,
            right_width,
            rows,
        }
    }
}

fn extend_side(row: &mut ResultRow, side: Option<&Row>, width: usize) {
    match side {
        Some(stored) => row.extend(stored.cells().iter().cloned().map(Some)),
        None => row.extend(std::iter::repeat(None).take(width)),
    }
}

/// Join `left` and `right` on `left.left_column = right.right_column`
pub fn join(
    left: &Table,
    right: &Table,
    left_column: &str,
    right_column: &str,
    kind: JoinKind,
    strategy: JoinStrategy,
) -> Result<JoinResult> {
    Ok(JoinEngine::new(left, right, left_column, right_column)?.execute(kind, strategy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DataType, Schema};
    use crate::config::DEFAULT_BTREE_ORDER;
    use crate::storage::IndexKind;

    fn table(name: &str, columns: &[(&str, DataType)], rows: &[&[&str]]) -> Table {
        let schema = Schema::new(name, columns.iter().copied(), None).unwrap();
        let mut table = Table::new(name, schema, DEFAULT_BTREE_ORDER);
        for row in rows {
            let cells = table
                .cells_from_literals(columns.iter().map(|(c, _)| *c).zip(row.iter().copied()))
                .unwrap();
            table.insert(cells).unwrap();
        }
        table
    }

    fn users() -> Table {
        table(
            "users",
            &[("id", DataType::Integer), ("name", DataType::String)],
            &[&["1", "Alice"], &["2", "Bob"], &["3", "Carol"]],
        )
    }

    fn orders() -> Table {
        table(
            "orders",
            &[("order_id", DataType::Integer), ("user_id", DataType::Integer)],
            &[&["101", "1"], &["102", "2"], &["103", "1"], &["104", "9"]],
        )
    }

    fn ids(result: &JoinResult) -> Vec<(Option<Cell>, Option<Cell>)> {
        result
            .rows
            .iter()
            .map(|row| (row[0].clone(), row[2].clone()))
            .collect()
    }

    fn int(v: i64) -> Option<Cell> {
        Some(Cell::Integer(v))
    }

    #[test]
    fn test_inner_join_order() {
        let (users, orders) = (users(), orders());
        let result = join(&users, &orders, "id", "user_id", JoinKind::Inner, JoinStrategy::HashJoin).unwrap();

        assert_eq!(result.left_width, 2);
        assert_eq!(result.right_width, 2);
        assert_eq!(
            ids(&result),
            vec![(int(1), int(101)), (int(1), int(103)), (int(2), int(102))]
        );
    }

    #[test]
    fn test_outer_joins_pad_with_nulls() {
        let (users, orders) = (users(), orders());
        let engine = JoinEngine::new(&users, &orders, "id", "user_id").unwrap();

        let left = engine.hash_join(JoinKind::Left);
        assert_eq!(
            ids(&left),
            vec![(int(1), int(101)), (int(1), int(103)), (int(2), int(102)), (int(3), None)]
        );
        assert!(left.rows[3][2..].iter().all(Option::is_none));

        let right = engine.nested_loop(JoinKind::Right, false);
        assert_eq!(
            ids(&right),
            vec![(int(1), int(101)), (int(1), int(103)), (int(2), int(102)), (None, int(104))]
        );

        let full = engine.nested_loop(JoinKind::FullOuter, false);
        assert_eq!(full.rows.len(), 3 + 1 + 1);
        assert_eq!(full.rows[3][..2], [int(3), Some(Cell::Text("Carol".to_string()))]);
        assert!(full.rows[4][..2].iter().all(Option::is_none));
    }

    #[test]
    fn test_strategies_agree() {
        let (users, orders) = (users(), orders());
        let engine = JoinEngine::new(&users, &orders, "id", "user_id").unwrap();

        for kind in [JoinKind::Inner, JoinKind::Left, JoinKind::Right, JoinKind::FullOuter] {
            let nested = engine.nested_loop(kind, false);
            let hashed = engine.hash_join(kind);
            assert_eq!(nested.rows, hashed.rows, "{}", kind);
            assert_eq!(nested.strategy, JoinStrategy::NestedLoop);
            assert_eq!(hashed.strategy, JoinStrategy::HashJoin);
        }
    }

    #[test]
    fn test_index_assisted_nested_loop() {
        let users = users();
        let mut orders = orders();
        orders.create_index("user_id", IndexKind::BTree).unwrap();

        let engine = JoinEngine::new(&users, &orders, "id", "user_id").unwrap();
        assert!(engine.index_usable());
        assert_eq!(engine.choose_strategy(0), JoinStrategy::NestedLoop);

        let assisted = engine.execute(JoinKind::FullOuter, JoinStrategy::NestedLoop);
        assert!(assisted.index_assisted);
        assert_eq!(assisted.rows, engine.hash_join(JoinKind::FullOuter).rows);
    }

    #[test]
    fn test_strategy_heuristic() {
        let (users, orders) = (users(), orders());
        let engine = JoinEngine::new(&users, &orders, "id", "user_id").unwrap();

        assert_eq!(engine.choose_strategy(100), JoinStrategy::NestedLoop);
        assert_eq!(engine.choose_strategy(3), JoinStrategy::HashJoin);
    }

    #[test]
    fn test_mixed_numeric_keys_are_promoted() {
        let users = users();
        let mut payments = table(
            "payments",
            &[("user_ref", DataType::Double)],
            &[&["1.0"], &["2.5"], &["3"]],
        );
        payments.create_index("user_ref", IndexKind::Hash).unwrap();

        let engine = JoinEngine::new(&users, &payments, "id", "user_ref").unwrap();
        assert!(!engine.index_usable());

        let nested = engine.execute(JoinKind::Inner, JoinStrategy::NestedLoop);
        let hashed = engine.execute(JoinKind::Inner, JoinStrategy::HashJoin);
        assert!(!nested.index_assisted);
        assert_eq!(nested.rows, hashed.rows);
        assert_eq!(
            nested.rows.iter().map(|r| r[0].clone()).collect::<Vec<_>>(),
            vec![int(1), int(3)]
        );
    }

    #[test]
    fn test_incomparable_join_columns() {
        let (users, orders) = (users(), orders());
        assert!(matches!(
            JoinEngine::new(&users, &orders, "name", "user_id"),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            JoinEngine::new(&users, &orders, "id", "customer"),
            Err(Error::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn test_benchmark_reports_both_strategies() {
        let (users, orders) = (users(), orders());
        let report = JoinEngine::new(&users, &orders, "id", "user_id")
            .unwrap()
            .benchmark();
        assert_eq!(report.rows, 3);
        assert!(report.nested_loop_millis >= 0.0);
        assert!(report.hash_join_millis >= 0.0);
    }
}
