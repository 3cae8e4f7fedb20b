//! Query Executor for TabulaDB
//!
//! This module evaluates a [`LogicalPlan`] against locked tables. Every node
//! produces a [`Relation`]: bound columns plus materialized rows.

use std::cmp::Ordering;
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};
use tracing::debug;

use super::join::{JoinEngine, JoinStrategy, ResultRow};
use super::planner::{AccessPath, LogicalPlan, Planner};
use crate::catalog::DataType;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::sql::ast::*;
use crate::storage::{Cell, RowPosition, Table};

/// How a query was run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueryPlan {
    pub access_path: AccessPath,
    pub join_strategy: Option<JoinStrategy>,
}

/// Query execution result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    /// Output column names: bare for one table, `table.column` for joins
    pub columns: Vec<String>,
    pub rows: Vec<ResultRow>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub plan: QueryPlan,
}

impl QueryResult {
    pub fn elapsed_millis(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

fn serialize_millis<S: Serializer>(elapsed: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64() * 1000.0)
}

/// A column of an intermediate relation
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub table: String,
    pub column: String,
    pub data_type: DataType,
}

/// Intermediate result of a plan node
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Relation {
    pub columns: Vec<Binding>,
    pub rows: Vec<ResultRow>,
}

impl Relation {
    fn bindings(table: &Table) -> Vec<Binding> {
        table
            .schema()
            .columns()
            .iter()
            .map(|column| Binding {
                table: table.name().to_string(),
                column: column.name.clone(),
                data_type: column.data_type,
            })
            .collect()
    }

    fn from_positions(table: &Table, positions: impl IntoIterator<Item = RowPosition>) -> Self {
        let rows = positions
            .into_iter()
            .filter_map(|position| table.row(position))
            .map(|row| row.cells().iter().cloned().map(Some).collect())
            .collect();
        Self {
            columns: Self::bindings(table),
            rows,
        }
    }

    /// Position of a qualified column reference
    fn position_of(&self, column: &ColumnRef) -> Result<usize> {
        self.columns
            .iter()
            .position(|binding| {
                binding.column == column.column
                    && column.table.as_ref().map_or(true, |table| *table == binding.table)
            })
            .ok_or_else(|| {
                Error::column_not_found(column.column.clone(), column.table.clone().unwrap_or_default())
            })
    }
}

/// `column <op> literal` bound to a relation
struct CompiledPredicate {
    position: usize,
    op: ComparisonOp,
    value: Cell,
}

impl CompiledPredicate {
    /// Resolve the column and check the literal can be compared with it
    fn compile(relation: &Relation, predicate: &Predicate) -> Result<Self> {
        let position = relation.position_of(&predicate.column)?;
        let column_type = relation.columns[position].data_type;
        let value = Cell::from_literal(&predicate.value)?;

        if !column_type.is_comparable_with(&value.data_type()) {
            return Err(Error::type_mismatch(
                format!("a literal comparable with {} column {}", column_type, predicate.column),
                format!("{} literal {}", predicate.value.type_name(), predicate.value),
            ));
        }

        Ok(Self {
            position,
            op: predicate.op,
            value,
        })
    }

    /// Null fields never satisfy a comparison
    fn matches(&self, row: &ResultRow) -> bool {
        row[self.position]
            .as_ref()
            .and_then(|cell| cell.compare(&self.value))
            .is_some_and(|ordering| self.op.holds(ordering))
    }
}

/// Nulls sort before every value
fn compare_nullable(a: &Option<Cell>, b: &Option<Cell>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

/// Query execution engine over a fixed set of locked tables
pub struct QueryExecutor<'a> {
    config: &'a EngineConfig,
    tables: Vec<&'a Table>,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(config: &'a EngineConfig, tables: Vec<&'a Table>) -> Self {
        Self { config, tables }
    }

    fn table(&self, name: &str) -> Result<&'a Table> {
        self.tables
            .iter()
            .copied()
            .find(|table| table.name() == name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// Plan and run a validated query
    pub fn run(&self, query: &ParsedQuery) -> Result<QueryResult> {
        let start = Instant::now();

        let base = self.table(&query.from)?;
        let joined = match &query.join {
            Some(join) => Some(self.table(&join.table)?),
            None => None,
        };

        let plan = Planner::new(self.config).plan(query, base, joined)?;
        debug!(?plan, "query planned");

        let relation = self.execute(&plan)?;
        let qualify = query.join.is_some();
        let columns = relation
            .columns
            .iter()
            .map(|binding| {
                if qualify {
                    format!("{}.{}", binding.table, binding.column)
                } else {
                    binding.column.clone()
                }
            })
            .collect();

        Ok(QueryResult {
            columns,
            rows: relation.rows,
            elapsed: start.elapsed(),
            plan: QueryPlan {
                access_path: plan.access_path(),
                join_strategy: plan.join_strategy(),
            },
        })
    }

    /// Evaluate a plan node
    pub fn execute(&self, plan: &LogicalPlan) -> Result<Relation> {
        match plan {
            LogicalPlan::Scan { table } => {
                let table = self.table(table)?;
                debug!(table = table.name(), rows = table.len(), "full scan");
                Ok(Relation::from_positions(table, 0..table.len()))
            }

            LogicalPlan::IndexScan {
                table, column, probe, ..
            } => {
                let table = self.table(table)?;
                let (access, positions) = probe.fetch(table, column)?;
                debug!(table = table.name(), column = %column, %access, candidates = positions.len(), "index scan");
                Ok(Relation::from_positions(table, positions))
            }

            LogicalPlan::Join {
                left,
                right,
                left_column,
                right_column,
                kind,
                strategy,
            } => {
                let (left, right) = (self.table(left)?, self.table(right)?);
                let joined = JoinEngine::new(left, right, left_column, right_column)?.execute(*kind, *strategy);

                let mut columns = Relation::bindings(left);
                columns.extend(Relation::bindings(right));
                Ok(Relation {
                    columns,
                    rows: joined.rows,
                })
            }

            LogicalPlan::Filter { input, predicate } => {
                let mut relation = self.execute(input)?;
                let compiled = CompiledPredicate::compile(&relation, predicate)?;
                let before = relation.rows.len();
                relation.rows.retain(|row| compiled.matches(row));
                debug!(column = %predicate.column, op = %predicate.op, before, after = relation.rows.len(), "filter");
                Ok(relation)
            }

            LogicalPlan::Sort { input, order_by } => {
                let mut relation = self.execute(input)?;
                let position = relation.position_of(&order_by.column)?;
                let ascending = order_by.ascending;
                // stable: ties keep their input order
                relation.rows.sort_by(|a, b| {
                    let ordering = compare_nullable(&a[position], &b[position]);
                    if ascending {
                        ordering
                    } else {
                        ordering.reverse()
                    }
                });
                debug!(column = %order_by.column, ascending, "sort");
                Ok(relation)
            }

            LogicalPlan::Limit { input, count } => {
                let mut relation = self.execute(input)?;
                relation.rows.truncate(*count);
                Ok(relation)
            }

            LogicalPlan::Project { input, projection } => {
                let relation = self.execute(input)?;
                let Projection::Columns(columns) = projection else {
                    return Ok(relation);
                };

                let positions = columns
                    .iter()
                    .map(|column| relation.position_of(column))
                    .collect::<Result<Vec<_>>>()?;
                let rows = relation
                    .rows
                    .into_iter()
                    .map(|row| positions.iter().map(|&p| row[p].clone()).collect())
                    .collect();
                let columns = positions
                    .iter()
                    .map(|&p| relation.columns[p].clone())
                    .collect();
                Ok(Relation { columns, rows })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Schema, SchemaSource};
    use crate::config::DEFAULT_BTREE_ORDER;
    use crate::sql::parse_query;
    use crate::storage::IndexKind;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct Fixture {
        config: EngineConfig,
        tables: HashMap<String, Table>,
    }

    impl SchemaSource for Fixture {
        fn table_schema(&self, table: &str) -> Option<Arc<Schema>> {
            self.tables.get(table).map(Table::schema_handle)
        }
    }

    impl Fixture {
        fn new() -> Self {
            let mut fixture = Self {
                config: EngineConfig::default(),
                tables: HashMap::new(),
            };
            fixture.add(
                "users",
                &[("id", DataType::Integer), ("name", DataType::String), ("age", DataType::Integer)],
                &[&["1", "Alice", "25"], &["2", "Bob", "30"], &["3", "Carol", "28"]],
            );
            fixture.add(
                "orders",
                &[("order_id", DataType::Integer), ("user_id", DataType::Integer), ("amount", DataType::Double)],
                &[&["101", "1", "99.99"], &["102", "2", "149.50"], &["103", "1", "29.99"]],
            );
            fixture
        }

        fn add(&mut self, name: &str, columns: &[(&str, DataType)], rows: &[&[&str]]) {
            let schema = Schema::new(name, columns.iter().copied(), None).unwrap();
            let mut table = Table::new(name, schema, DEFAULT_BTREE_ORDER);
            for row in rows {
                let cells = table
                    .cells_from_literals(columns.iter().map(|(c, _)| *c).zip(row.iter().copied()))
                    .unwrap();
                table.insert(cells).unwrap();
            }
            self.tables.insert(name.to_string(), table);
        }

        fn query(&self, sql: &str) -> Result<QueryResult> {
            let query = parse_query(sql, self)?;
            QueryExecutor::new(&self.config, self.tables.values().collect()).run(&query)
        }
    }

    fn text(s: &str) -> Option<Cell> {
        Some(Cell::Text(s.to_string()))
    }

    fn int(v: i64) -> Option<Cell> {
        Some(Cell::Integer(v))
    }

    #[test]
    fn test_filter_and_project() {
        let result = Fixture::new()
            .query("SELECT name, age FROM users WHERE age > 25")
            .unwrap();
        assert_eq!(result.columns, vec!["name", "age"]);
        assert_eq!(result.rows, vec![vec![text("Bob"), int(30)], vec![text("Carol"), int(28)]]);
        assert_eq!(result.plan.access_path, AccessPath::FullScan);
        assert_eq!(result.plan.join_strategy, None);
    }

    #[test]
    fn test_join_columns_are_qualified() {
        let result = Fixture::new()
            .query("SELECT users.name, orders.amount FROM users JOIN orders ON users.id = orders.user_id")
            .unwrap();
        assert_eq!(result.columns, vec!["users.name", "orders.amount"]);
        assert_eq!(
            result.rows,
            vec![
                vec![text("Alice"), Some(Cell::Real(99.99))],
                vec![text("Alice"), Some(Cell::Real(29.99))],
                vec![text("Bob"), Some(Cell::Real(149.5))],
            ]
        );
        assert_eq!(result.plan.join_strategy, Some(JoinStrategy::NestedLoop));
    }

    #[test]
    fn test_sort_puts_nulls_first() {
        let result = Fixture::new()
            .query("SELECT users.name, orders.order_id FROM orders RIGHT JOIN users ON orders.user_id = users.id ORDER BY orders.order_id")
            .unwrap();
        assert_eq!(
            result.rows,
            vec![
                vec![text("Carol"), None],
                vec![text("Alice"), int(101)],
                vec![text("Bob"), int(102)],
                vec![text("Alice"), int(103)],
            ]
        );

        let result = Fixture::new()
            .query("SELECT name FROM users ORDER BY age DESC LIMIT 2")
            .unwrap();
        assert_eq!(result.rows, vec![vec![text("Bob")], vec![text("Carol")]]);
    }

    #[test]
    fn test_filter_on_null_padded_column() {
        let result = Fixture::new()
            .query("SELECT users.name FROM users LEFT JOIN orders ON users.id = orders.user_id WHERE orders.amount < 100")
            .unwrap();
        assert_eq!(result.rows, vec![vec![text("Alice")], vec![text("Alice")]]);
    }

    #[test]
    fn test_index_scan_matches_full_scan() {
        let mut fixture = Fixture::new();
        let sql = "SELECT * FROM users WHERE age >= 28";
        let scanned = fixture.query(sql).unwrap();

        fixture
            .tables
            .get_mut("users")
            .unwrap()
            .create_index("age", IndexKind::BTree)
            .unwrap();
        let indexed = fixture.query(sql).unwrap();

        assert_eq!(indexed.plan.access_path, AccessPath::BTree);
        assert_eq!(indexed.rows, scanned.rows);
        assert_eq!(indexed.rows.len(), 2);
    }

    #[test]
    fn test_type_mismatch_on_empty_table() {
        let mut fixture = Fixture::new();
        fixture.add("empty", &[("n", DataType::Integer)], &[]);
        let err = fixture.query("SELECT * FROM empty WHERE n = 'x'").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_numeric_comparison_across_types() {
        let result = Fixture::new()
            .query("SELECT order_id FROM orders WHERE amount > 50")
            .unwrap();
        assert_eq!(result.rows, vec![vec![int(101)], vec![int(102)]]);
    }
}
