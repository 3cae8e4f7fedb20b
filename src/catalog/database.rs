//! Database catalog for TabulaDB
//!
//! The [`Database`] owns every table by name and is the entry point for all
//! engine operations. The catalog map and each table sit behind their own
//! `RwLock`: mutations take one table's write lock, queries take read locks
//! on the tables they touch in name order, so writers never deadlock with
//! multi-table readers.

use std::ops::Bound;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::schema::{Column, Schema};
use super::types::DataType;
use super::SchemaSource;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::executor::{AccessPath, JoinBenchmark, JoinEngine, Probe, QueryExecutor, QueryResult};
use crate::sql::parse_query;
use crate::storage::{Cell, IndexKind, Row, RowPosition, Table};

type TableHandle = Arc<RwLock<Table>>;

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!("recovering a lock poisoned by a panicked writer");
        poisoned.into_inner()
    })
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!("recovering a lock poisoned by a panicked writer");
        poisoned.into_inner()
    })
}

/// One index of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub column: String,
    pub kind: IndexKind,
}

/// Table metadata as reported by [`Database::describe_table`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<Column>,
    pub primary_key: Option<String>,
    pub row_count: usize,
    /// In creation order
    pub indexes: Vec<IndexInfo>,
}

impl TableInfo {
    fn of(table: &Table) -> Self {
        Self {
            name: table.name().to_string(),
            columns: table.schema().columns().to_vec(),
            primary_key: table.schema().primary_key().map(|c| c.name.clone()),
            row_count: table.len(),
            indexes: table
                .indexes()
                .into_iter()
                .map(|(column, kind)| IndexInfo { column, kind })
                .collect(),
        }
    }
}

/// Lookup condition of [`Database::search`]; values are raw literal text
/// coerced to the column type
#[derive(Debug, Clone, PartialEq)]
pub enum SearchPredicate {
    Exact(String),
    /// Inclusive on both ends; a missing end is unbounded
    Range {
        min: Option<String>,
        max: Option<String>,
    },
}

/// Rows found by [`Database::search`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub rows: Vec<Row>,
    /// Ascending
    pub positions: Vec<RowPosition>,
    pub index_used: AccessPath,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: serde::Serializer>(elapsed: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64() * 1000.0)
}

/// In-memory database: a catalog of named tables
#[derive(Debug, Default)]
pub struct Database {
    /// Tables by name, in creation order
    tables: RwLock<IndexMap<String, TableHandle>>,
    config: EngineConfig,
}

impl Database {
    /// Create an empty database with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            tables: RwLock::new(IndexMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn handle(&self, table: &str) -> Result<TableHandle> {
        read_lock(&self.tables)
            .get(table)
            .cloned()
            .ok_or_else(|| Error::TableNotFound(table.to_string()))
    }

    /// Create an empty table
    pub fn create_table<S: Into<String>>(
        &self,
        name: &str,
        columns: impl IntoIterator<Item = (S, DataType)>,
        primary_key: Option<&str>,
    ) -> Result<TableInfo> {
        let schema = Schema::new(name, columns, primary_key)?;

        let mut tables = write_lock(&self.tables);
        if tables.contains_key(name) {
            return Err(Error::DuplicateTable(name.to_string()));
        }

        let table = Table::new(name, schema, self.config.btree_order);
        let table_info = TableInfo::of(&table);
        tables.insert(name.to_string(), Arc::new(RwLock::new(table)));

        info!(table = name, columns = table_info.columns.len(), primary_key = ?table_info.primary_key, "table created");
        Ok(table_info)
    }

    /// Drop a table with its rows and indexes
    pub fn drop_table(&self, name: &str) -> Result<()> {
        write_lock(&self.tables)
            .shift_remove(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))?;
        info!(table = name, "table dropped");
        Ok(())
    }

    /// Insert a row given as `column → literal` pairs covering every column
    pub fn insert_row<K, V>(&self, table: &str, values: impl IntoIterator<Item = (K, V)>) -> Result<RowPosition>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let handle = self.handle(table)?;
        let mut table = write_lock(&handle);
        let cells = table.cells_from_literals(values)?;
        table.insert(cells)
    }

    /// Insert a row of typed cells in schema order
    pub fn insert_cells(&self, table: &str, cells: Vec<Cell>) -> Result<RowPosition> {
        let handle = self.handle(table)?;
        let mut table = write_lock(&handle);
        table.insert(cells)
    }

    /// Delete the row at `position`; later rows move down by one
    pub fn delete_row(&self, table: &str, position: RowPosition) -> Result<Row> {
        let handle = self.handle(table)?;
        let mut table = write_lock(&handle);
        table.delete(position)
    }

    /// Build an index over the existing rows
    pub fn create_index(&self, table: &str, column: &str, kind: IndexKind) -> Result<()> {
        let handle = self.handle(table)?;
        let mut guard = write_lock(&handle);
        guard.create_index(column, kind)?;
        info!(table, column, %kind, rows = guard.len(), "index created");
        Ok(())
    }

    pub fn drop_index(&self, table: &str, column: &str, kind: IndexKind) -> Result<()> {
        let handle = self.handle(table)?;
        write_lock(&handle).drop_index(column, kind)?;
        info!(table, column, %kind, "index dropped");
        Ok(())
    }

    /// Table names in creation order
    pub fn list_tables(&self) -> Vec<String> {
        read_lock(&self.tables).keys().cloned().collect()
    }

    pub fn get_table_schema(&self, table: &str) -> Result<Arc<Schema>> {
        let handle = self.handle(table)?;
        let schema = read_lock(&handle).schema_handle();
        Ok(schema)
    }

    pub fn describe_table(&self, table: &str) -> Result<TableInfo> {
        let handle = self.handle(table)?;
        let info = TableInfo::of(&read_lock(&handle));
        Ok(info)
    }

    /// Snapshot of a table's rows in position order
    pub fn rows(&self, table: &str) -> Result<Vec<Row>> {
        let handle = self.handle(table)?;
        let rows = read_lock(&handle).rows().to_vec();
        Ok(rows)
    }

    /// Parse, plan and run one SELECT
    pub fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();
        let query = parse_query(sql, self)?;

        let mut names: Vec<&str> = query.tables();
        names.sort_unstable();
        names.dedup();
        let handles = names
            .iter()
            .map(|name| self.handle(name))
            .collect::<Result<Vec<_>>>()?;

        // name order keeps concurrent multi-table readers and writers deadlock free
        let guards: Vec<_> = handles.iter().map(|handle| read_lock(handle)).collect();
        let tables = guards.iter().map(|guard| &**guard).collect();

        let mut result = QueryExecutor::new(&self.config, tables).run(&query)?;
        result.elapsed = start.elapsed();
        debug!(sql, rows = result.rows.len(), elapsed_ms = result.elapsed_millis(), "query executed");
        Ok(result)
    }

    /// Time plain nested-loop and hash INNER joins of `left` and `right`
    pub fn benchmark_join(
        &self,
        left: &str,
        right: &str,
        left_column: &str,
        right_column: &str,
    ) -> Result<JoinBenchmark> {
        let (left_handle, right_handle) = (self.handle(left)?, self.handle(right)?);

        let report = if Arc::ptr_eq(&left_handle, &right_handle) {
            let table = read_lock(&left_handle);
            JoinEngine::new(&table, &table, left_column, right_column)?.benchmark()
        } else {
            let (first, second) = if left <= right {
                (&left_handle, &right_handle)
            } else {
                (&right_handle, &left_handle)
            };
            let first = read_lock(first);
            let second = read_lock(second);
            let (left_table, right_table) = if left <= right {
                (&*first, &*second)
            } else {
                (&*second, &*first)
            };
            JoinEngine::new(left_table, right_table, left_column, right_column)?.benchmark()
        };

        info!(
            left,
            right,
            rows = report.rows,
            nested_loop_ms = report.nested_loop_millis,
            hash_join_ms = report.hash_join_millis,
            "join benchmark"
        );
        Ok(report)
    }

    /// Find rows by `column`, through an index when one fits
    pub fn search(&self, table: &str, column: &str, predicate: &SearchPredicate) -> Result<SearchResult> {
        let start = Instant::now();
        let handle = self.handle(table)?;
        let table = read_lock(&handle);
        let data_type = table.column_type(column)?;

        let coerce = |raw: &Option<String>| -> Result<Bound<Cell>> {
            Ok(match raw {
                Some(raw) => Bound::Included(Cell::coerce(raw, data_type)?),
                None => Bound::Unbounded,
            })
        };
        let probe = match predicate {
            SearchPredicate::Exact(raw) => Probe::Exact(Cell::coerce(raw, data_type)?),
            SearchPredicate::Range { min, max } => Probe::Range {
                lower: coerce(min)?,
                upper: coerce(max)?,
            },
        };

        let (index_used, positions) = probe.fetch(&table, column)?;
        let rows = positions
            .iter()
            .filter_map(|&position| table.row(position).cloned())
            .collect();

        debug!(table = table.name(), column, %index_used, matches = positions.len(), "search");
        Ok(SearchResult {
            rows,
            positions,
            index_used,
            elapsed: start.elapsed(),
        })
    }
}

impl SchemaSource for Database {
    fn table_schema(&self, table: &str) -> Option<Arc<Schema>> {
        self.get_table_schema(table).ok()
    }
}

/// Builder for creating tables
#[derive(Debug, Clone, Default)]
pub struct TableBuilder {
    name: String,
    columns: Vec<(String, DataType)>,
    primary_key: Option<String>,
}

impl TableBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add a column
    pub fn column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push((name.into(), data_type));
        self
    }

    /// Add a column and make it the primary key
    pub fn primary_key(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        let name = name.into();
        self.primary_key = Some(name.clone());
        self.column(name, data_type)
    }

    /// Create the table in `database`
    pub fn build(self, database: &Database) -> Result<TableInfo> {
        database.create_table(&self.name, self.columns, self.primary_key.as_deref())
    }
}
