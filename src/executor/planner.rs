//! Query Planner for TabulaDB
//!
//! This module turns a validated [`ParsedQuery`] into a [`LogicalPlan`]:
//! it picks the access path for the base table and the join strategy.

use std::fmt;
use std::ops::Bound;

use serde::Serialize;

use super::join::{JoinEngine, JoinStrategy};
use crate::catalog::DataType;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::sql::ast::*;
use crate::storage::{Cell, IndexKind, RowPosition, Table};

/// How base rows are fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccessPath {
    #[serde(rename = "hash")]
    Hash,
    #[serde(rename = "btree")]
    BTree,
    #[serde(rename = "full_scan")]
    FullScan,
}

impl From<IndexKind> for AccessPath {
    fn from(kind: IndexKind) -> Self {
        match kind {
            IndexKind::Hash => AccessPath::Hash,
            IndexKind::BTree => AccessPath::BTree,
        }
    }
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessPath::Hash => write!(f, "hash index"),
            AccessPath::BTree => write!(f, "B+ tree index"),
            AccessPath::FullScan => write!(f, "full table scan"),
        }
    }
}

/// A lookup an index may answer
#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    Exact(Cell),
    Range { lower: Bound<Cell>, upper: Bound<Cell> },
}

impl Probe {
    /// Probe equivalent to `column <op> key`; `!=` has none
    pub fn from_comparison(op: ComparisonOp, key: Cell) -> Option<Probe> {
        let (lower, upper) = match op {
            ComparisonOp::Eq => return Some(Probe::Exact(key)),
            ComparisonOp::NotEq => return None,
            ComparisonOp::Lt => (Bound::Unbounded, Bound::Excluded(key)),
            ComparisonOp::LtEq => (Bound::Unbounded, Bound::Included(key)),
            ComparisonOp::Gt => (Bound::Excluded(key), Bound::Unbounded),
            ComparisonOp::GtEq => (Bound::Included(key), Bound::Unbounded),
        };
        Some(Probe::Range { lower, upper })
    }

    /// The index that would serve this probe on `column`, if any
    pub fn access_path(&self, table: &Table, column: &str) -> AccessPath {
        match self {
            Probe::Exact(_) => table
                .point_index(column)
                .map(|index| index.kind().into())
                .unwrap_or(AccessPath::FullScan),
            Probe::Range { .. } => match table.index(column, IndexKind::BTree) {
                Some(_) => AccessPath::BTree,
                None => AccessPath::FullScan,
            },
        }
    }

    /// Matching positions, ascending, through the best index or a scan
    pub fn fetch(&self, table: &Table, column: &str) -> Result<(AccessPath, Vec<RowPosition>)> {
        let column_index = table.column_index(column)?;

        let indexed = match self {
            Probe::Exact(key) => table
                .point_index(column)
                .map(|index| (index.kind().into(), index.lookup(key))),
            Probe::Range { lower, upper } => table
                .index(column, IndexKind::BTree)
                .and_then(|index| index.range(lower.as_ref(), upper.as_ref()))
                .map(|positions| (AccessPath::BTree, positions)),
        };

        Ok(indexed.unwrap_or_else(|| {
            let positions = match self {
                Probe::Exact(key) => table.scan_equal(column_index, key),
                Probe::Range { lower, upper } => {
                    table.scan_range(column_index, lower.as_ref(), upper.as_ref())
                }
            };
            (AccessPath::FullScan, positions)
        }))
    }
}

/// Index key for `literal` against a column of `data_type`, when the literal
/// denotes exactly the column's type (INTEGER literals widen to DOUBLE)
pub fn index_key(data_type: DataType, literal: &Literal) -> Option<Cell> {
    match (data_type, literal) {
        (DataType::Integer, Literal::Integer(v)) => Some(Cell::Integer(*v)),
        (DataType::Double, Literal::Integer(v)) => Cell::real(*v as f64).ok(),
        (DataType::Double, Literal::Float(v)) => Cell::real(*v).ok(),
        (DataType::String, Literal::String(s)) => Some(Cell::Text(s.clone())),
        _ => None,
    }
}

/// Logical plan node
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalPlan {
    /// Every row of a table, in storage order
    Scan { table: String },
    /// Candidate rows of a table fetched through an index
    IndexScan {
        table: String,
        column: String,
        access: AccessPath,
        probe: Probe,
    },
    /// Equi-join of two tables
    Join {
        left: String,
        right: String,
        left_column: String,
        right_column: String,
        kind: JoinKind,
        strategy: JoinStrategy,
    },
    Filter {
        input: Box<LogicalPlan>,
        predicate: Predicate,
    },
    Sort {
        input: Box<LogicalPlan>,
        order_by: OrderBy,
    },
    Limit {
        input: Box<LogicalPlan>,
        count: usize,
    },
    Project {
        input: Box<LogicalPlan>,
        projection: Projection,
    },
}

impl LogicalPlan {
    fn input(&self) -> Option<&LogicalPlan> {
        match self {
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Sort { input, .. }
            | LogicalPlan::Limit { input, .. }
            | LogicalPlan::Project { input, .. } => Some(input),
            _ => None,
        }
    }

    /// The leaf that produces the rows
    pub fn source(&self) -> &LogicalPlan {
        let mut node = self;
        while let Some(input) = node.input() {
            node = input;
        }
        node
    }

    pub fn access_path(&self) -> AccessPath {
        match self.source() {
            LogicalPlan::IndexScan { access, .. } => *access,
            _ => AccessPath::FullScan,
        }
    }

    pub fn join_strategy(&self) -> Option<JoinStrategy> {
        match self.source() {
            LogicalPlan::Join { strategy, .. } => Some(*strategy),
            _ => None,
        }
    }
}

/// Query planner
pub struct Planner<'a> {
    config: &'a EngineConfig,
}

impl<'a> Planner<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Plan `query` over its FROM table and, when joined, the right table
    pub fn plan(&self, query: &ParsedQuery, base: &Table, joined: Option<&Table>) -> Result<LogicalPlan> {
        if base.name() != query.from {
            return Err(Error::TableNotFound(query.from.clone()));
        }

        let mut plan = match (&query.join, joined) {
            (Some(join), Some(right)) if right.name() == join.table => {
                self.plan_join(base, right, join)?
            }
            (Some(join), _) => return Err(Error::TableNotFound(join.table.clone())),
            (None, _) => self.plan_access(base, query.filter.as_ref())?,
        };

        if let Some(predicate) = &query.filter {
            plan = LogicalPlan::Filter {
                input: Box::new(plan),
                predicate: predicate.clone(),
            };
        }

        if let Some(order_by) = &query.order_by {
            plan = LogicalPlan::Sort {
                input: Box::new(plan),
                order_by: order_by.clone(),
            };
        }

        if let Some(count) = query.limit {
            plan = LogicalPlan::Limit {
                input: Box::new(plan),
                count,
            };
        }

        Ok(LogicalPlan::Project {
            input: Box::new(plan),
            projection: query.projection.clone(),
        })
    }

    fn plan_join(&self, left: &Table, right: &Table, join: &JoinClause) -> Result<LogicalPlan> {
        let engine = JoinEngine::new(left, right, &join.left_column.column, &join.right_column.column)?;
        let strategy = self
            .config
            .join_strategy
            .forced()
            .unwrap_or_else(|| engine.choose_strategy(self.config.nested_loop_threshold));

        Ok(LogicalPlan::Join {
            left: left.name().to_string(),
            right: right.name().to_string(),
            left_column: join.left_column.column.clone(),
            right_column: join.right_column.column.clone(),
            kind: join.kind,
            strategy,
        })
    }

    /// Index scan when the predicate's column has a suitable index and the
    /// literal has the column's type, full scan otherwise
    fn plan_access(&self, table: &Table, filter: Option<&Predicate>) -> Result<LogicalPlan> {
        let scan = LogicalPlan::Scan {
            table: table.name().to_string(),
        };
        let Some(predicate) = filter else {
            return Ok(scan);
        };

        let column = &predicate.column.column;
        let data_type = table.column_type(column)?;
        let probe = index_key(data_type, &predicate.value)
            .and_then(|key| Probe::from_comparison(predicate.op, key));

        Ok(match probe {
            Some(probe) => match probe.access_path(table, column) {
                AccessPath::FullScan => scan,
                access => LogicalPlan::IndexScan {
                    table: table.name().to_string(),
                    column: column.clone(),
                    access,
                    probe,
                },
            },
            None => scan,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Schema;
    use crate::config::{StrategyPreference, DEFAULT_BTREE_ORDER};

    fn users() -> Table {
        let schema = Schema::new(
            "users",
            [("id", DataType::Integer), ("name", DataType::String), ("age", DataType::Integer)],
            Some("id"),
        )
        .unwrap();
        let mut table = Table::new("users", schema, DEFAULT_BTREE_ORDER);
        for (id, name, age) in [("1", "Alice", "25"), ("2", "Bob", "30"), ("3", "Carol", "28")] {
            let cells = table
                .cells_from_literals([("id", id), ("name", name), ("age", age)])
                .unwrap();
            table.insert(cells).unwrap();
        }
        table
    }

    fn query(filter: Option<Predicate>) -> ParsedQuery {
        ParsedQuery {
            projection: Projection::All,
            from: "users".to_string(),
            join: None,
            filter,
            order_by: None,
            limit: Some(2),
        }
    }

    fn predicate(column: &str, op: ComparisonOp, value: Literal) -> Predicate {
        Predicate {
            column: ColumnRef::qualified("users", column),
            op,
            value,
        }
    }

    #[test]
    fn test_plan_shape() {
        let config = EngineConfig::default();
        let table = users();
        let plan = Planner::new(&config)
            .plan(&query(Some(predicate("age", ComparisonOp::Gt, Literal::Integer(25)))), &table, None)
            .unwrap();

        let LogicalPlan::Project { input, .. } = &plan else {
            panic!("expected projection at the root: {:?}", plan);
        };
        assert!(matches!(input.as_ref(), LogicalPlan::Limit { count: 2, .. }));
        assert_eq!(plan.source(), &LogicalPlan::Scan { table: "users".to_string() });
        assert_eq!(plan.access_path(), AccessPath::FullScan);
        assert_eq!(plan.join_strategy(), None);
    }

    #[test]
    fn test_index_access_paths() {
        let config = EngineConfig::default();
        let mut table = users();
        table.create_index("age", IndexKind::BTree).unwrap();
        table.create_index("name", IndexKind::Hash).unwrap();
        let planner = Planner::new(&config);

        let range = query(Some(predicate("age", ComparisonOp::GtEq, Literal::Integer(28))));
        assert_eq!(planner.plan(&range, &table, None).unwrap().access_path(), AccessPath::BTree);

        let point = query(Some(predicate("name", ComparisonOp::Eq, Literal::String("Bob".into()))));
        assert_eq!(planner.plan(&point, &table, None).unwrap().access_path(), AccessPath::Hash);

        // hash indexes cannot answer ranges; != never uses an index
        let hash_range = query(Some(predicate("name", ComparisonOp::Lt, Literal::String("C".into()))));
        assert_eq!(planner.plan(&hash_range, &table, None).unwrap().access_path(), AccessPath::FullScan);
        let not_equal = query(Some(predicate("age", ComparisonOp::NotEq, Literal::Integer(30))));
        assert_eq!(planner.plan(&not_equal, &table, None).unwrap().access_path(), AccessPath::FullScan);

        // a DOUBLE literal against an INTEGER column is compared, never probed
        let inexact = query(Some(predicate("age", ComparisonOp::Gt, Literal::Float(25.5))));
        assert_eq!(planner.plan(&inexact, &table, None).unwrap().access_path(), AccessPath::FullScan);
    }

    #[test]
    fn test_probe_fetch() {
        let mut table = users();
        let probe = Probe::from_comparison(ComparisonOp::Gt, Cell::Integer(25)).unwrap();
        assert_eq!(probe.fetch(&table, "age").unwrap(), (AccessPath::FullScan, vec![1, 2]));

        table.create_index("age", IndexKind::BTree).unwrap();
        assert_eq!(probe.fetch(&table, "age").unwrap(), (AccessPath::BTree, vec![1, 2]));

        let exact = Probe::Exact(Cell::Integer(28));
        assert_eq!(exact.fetch(&table, "age").unwrap(), (AccessPath::BTree, vec![2]));
        assert!(Probe::from_comparison(ComparisonOp::NotEq, Cell::Integer(1)).is_none());
    }

    #[test]
    fn test_join_strategy_selection() {
        let left = users();
        let right = users();
        let join_query = |table: &str| ParsedQuery {
            join: Some(JoinClause {
                table: table.to_string(),
                kind: JoinKind::Inner,
                left_column: ColumnRef::qualified("users", "id"),
                right_column: ColumnRef::qualified(table, "id"),
            }),
            ..query(None)
        };

        let config = EngineConfig::default();
        let plan = Planner::new(&config).plan(&join_query("users"), &left, Some(&right)).unwrap();
        assert_eq!(plan.join_strategy(), Some(JoinStrategy::NestedLoop));

        let forced = EngineConfig::default().with_join_strategy(StrategyPreference::HashJoin);
        let plan = Planner::new(&forced).plan(&join_query("users"), &left, Some(&right)).unwrap();
        assert_eq!(plan.join_strategy(), Some(JoinStrategy::HashJoin));

        let small = EngineConfig::default().with_nested_loop_threshold(1);
        let plan = Planner::new(&small).plan(&join_query("users"), &left, Some(&right)).unwrap();
        assert_eq!(plan.join_strategy(), Some(JoinStrategy::HashJoin));

        assert!(matches!(
            Planner::new(&config).plan(&join_query("orders"), &left, Some(&right)),
            Err(Error::TableNotFound(_))
        ));
    }

    #[test]
    fn test_index_key_requires_exact_type() {
        assert_eq!(index_key(DataType::Integer, &Literal::Integer(3)), Some(Cell::Integer(3)));
        assert_eq!(index_key(DataType::Double, &Literal::Integer(3)), Some(Cell::Real(3.0)));
        assert_eq!(index_key(DataType::Integer, &Literal::Float(3.0)), None);
        assert_eq!(index_key(DataType::String, &Literal::Integer(3)), None);
    }
}
