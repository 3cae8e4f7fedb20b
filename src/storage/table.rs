//! Table storage for TabulaDB
//!
//! A table owns its schema, its rows in insertion order and every secondary
//! index built on it. Each mutation validates first and then updates rows
//! and indexes together, so a failed call leaves the table untouched.

use std::collections::HashSet;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use super::cell::{Cell, Row};
use super::index::{new_index, Index, IndexKind, RowPosition};
use crate::catalog::{DataType, Schema};
use crate::error::{Error, Result};

/// Identifies one index of a table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IndexId {
    column: String,
    kind: IndexKind,
}

#[derive(Debug)]
struct IndexEntry {
    column_index: usize,
    index: Box<dyn Index>,
}

/// A table combining schema, rows and indexes
#[derive(Debug)]
pub struct Table {
    name: String,
    schema: Arc<Schema>,
    rows: Vec<Row>,
    /// Primary key values currently stored
    primary_keys: HashSet<Cell>,
    /// Indexes in creation order
    indexes: IndexMap<IndexId, IndexEntry>,
    btree_order: usize,
}

impl Table {
    /// Create an empty table
    pub fn new(name: impl Into<String>, schema: Schema, btree_order: usize) -> Self {
        Self {
            name: name.into(),
            schema: Arc::new(schema),
            rows: Vec::new(),
            primary_keys: HashSet::new(),
            indexes: IndexMap::new(),
            btree_order,
        }
    }

    /// Get table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get table schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Shared handle to the schema
    pub fn schema_handle(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows in insertion order
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Row at `position`
    pub fn row(&self, position: RowPosition) -> Option<&Row> {
        self.rows.get(position)
    }

    /// Column index by name, or `ColumnNotFound`
    pub fn column_index(&self, column: &str) -> Result<usize> {
        self.schema
            .get_column_index(column)
            .ok_or_else(|| Error::column_not_found(column, &self.name))
    }

    /// Declared type of a column
    pub fn column_type(&self, column: &str) -> Result<DataType> {
        let index = self.column_index(column)?;
        Ok(self.schema.columns()[index].data_type)
    }

    /// Build a row from `column → literal` pairs
    ///
    /// Every schema column must be given exactly once; each literal is
    /// coerced to the column's declared type.
    pub fn cells_from_literals<K, V>(
        &self,
        values: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Vec<Cell>>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut slots: Vec<Option<Cell>> = vec![None; self.schema.column_count()];

        for (column, raw) in values {
            let column = column.as_ref();
            let index = self
                .schema
                .get_column_index(column)
                .ok_or_else(|| self.mismatch(format!("unknown column '{}'", column)))?;
            if slots[index].is_some() {
                return Err(self.mismatch(format!("column '{}' given twice", column)));
            }
            let data_type = self.schema.columns()[index].data_type;
            slots[index] = Some(Cell::coerce(raw.as_ref(), data_type)?);
        }

        slots
            .into_iter()
            .zip(self.schema.columns())
            .map(|(slot, column)| {
                slot.ok_or_else(|| self.mismatch(format!("missing value for column '{}'", column.name)))
            })
            .collect()
    }

    fn mismatch(&self, reason: String) -> Error {
        Error::SchemaMismatch {
            table: self.name.clone(),
            reason,
        }
    }

    /// Append a row and index it
    pub fn insert(&mut self, cells: Vec<Cell>) -> Result<RowPosition> {
        self.schema.check_cells(&self.name, &cells)?;

        let primary_key = match self.schema.primary_key() {
            Some(column) => {
                let key = &cells[column.position];
                if self.primary_keys.contains(key) {
                    return Err(Error::DuplicateKey {
                        table: self.name.clone(),
                        column: column.name.clone(),
                        value: key.to_string(),
                    });
                }
                Some(key.clone())
            }
            None => None,
        };

        let position = self.rows.len();
        for entry in self.indexes.values_mut() {
            entry
                .index
                .insert(cells[entry.column_index].clone(), position);
        }
        if let Some(key) = primary_key {
            self.primary_keys.insert(key);
        }
        self.rows.push(Row::new(cells));

        debug!(table = %self.name, position, "row inserted");
        Ok(position)
    }

    /// Remove the row at `position`; later rows move down by one
    pub fn delete(&mut self, position: RowPosition) -> Result<Row> {
        if position >= self.rows.len() {
            return Err(Error::RowNotFound {
                table: self.name.clone(),
                position,
            });
        }

        let row = self.rows.remove(position);
        for entry in self.indexes.values_mut() {
            if let Some(key) = row.get(entry.column_index) {
                entry.index.remove(key, position);
            }
            entry.index.shift_down(position);
        }
        if let Some(column) = self.schema.primary_key() {
            if let Some(key) = row.get(column.position) {
                self.primary_keys.remove(key);
            }
        }

        debug!(table = %self.name, position, "row deleted");
        Ok(row)
    }

    /// Build an index over `column` from the current rows
    pub fn create_index(&mut self, column: &str, kind: IndexKind) -> Result<()> {
        let column_index = self.column_index(column)?;
        let id = IndexId {
            column: column.to_string(),
            kind,
        };
        if self.indexes.contains_key(&id) {
            return Err(Error::IndexExists {
                table: self.name.clone(),
                column: column.to_string(),
                kind,
            });
        }

        let mut index = new_index(kind, self.btree_order);
        for (position, row) in self.rows.iter().enumerate() {
            if let Some(key) = row.get(column_index) {
                index.insert(key.clone(), position);
            }
        }

        debug!(table = %self.name, column, %kind, entries = index.len(), "index built");
        self.indexes.insert(id, IndexEntry { column_index, index });
        Ok(())
    }

    /// Drop the `kind` index on `column`
    pub fn drop_index(&mut self, column: &str, kind: IndexKind) -> Result<()> {
        self.column_index(column)?;
        let id = IndexId {
            column: column.to_string(),
            kind,
        };
        match self.indexes.shift_remove(&id) {
            Some(_) => Ok(()),
            None => Err(Error::IndexNotFound {
                table: self.name.clone(),
                column: column.to_string(),
                kind,
            }),
        }
    }

    /// The `kind` index on `column`, if built
    pub fn index(&self, column: &str, kind: IndexKind) -> Option<&dyn Index> {
        let id = IndexId {
            column: column.to_string(),
            kind,
        };
        self.indexes.get(&id).map(|entry| entry.index.as_ref())
    }

    /// Best index for equality lookups on `column`: hash, then B+ tree
    pub fn point_index(&self, column: &str) -> Option<&dyn Index> {
        self.index(column, IndexKind::Hash)
            .or_else(|| self.index(column, IndexKind::BTree))
    }

    /// `(column, kind)` of every index, in creation order
    pub fn indexes(&self) -> Vec<(String, IndexKind)> {
        self.indexes
            .keys()
            .map(|id| (id.column.clone(), id.kind))
            .collect()
    }

    /// Positions whose `column` equals `key`, by linear scan
    pub fn scan_equal(&self, column_index: usize, key: &Cell) -> Vec<RowPosition> {
        self.scan_where(column_index, |cell| cell == key)
    }

    /// Positions whose `column` lies within the bounds, by linear scan
    pub fn scan_range(
        &self,
        column_index: usize,
        lower: Bound<&Cell>,
        upper: Bound<&Cell>,
    ) -> Vec<RowPosition> {
        self.scan_where(column_index, |cell| (lower, upper).contains(cell))
    }

    fn scan_where(&self, column_index: usize, keep: impl Fn(&Cell) -> bool) -> Vec<RowPosition> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.get(column_index).is_some_and(&keep))
            .map(|(position, _)| position)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_BTREE_ORDER;

    fn users() -> Table {
        let schema = Schema::new(
            "users",
            [
                ("id", DataType::Integer),
                ("name", DataType::String),
                ("age", DataType::Integer),
            ],
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

    #[test]
    fn test_insert_and_read_back() {
        let table = users();
        assert_eq!(table.len(), 3);
        assert_eq!(
            table.row(1).unwrap().cells(),
            &[Cell::Integer(2), Cell::Text("Bob".to_string()), Cell::Integer(30)]
        );
    }

    #[test]
    fn test_literal_validation() {
        let table = users();

        let err = table
            .cells_from_literals([("id", "4"), ("name", "Dave")])
            .unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { .. }));

        let err = table
            .cells_from_literals([("id", "4"), ("name", "Dave"), ("age", "30"), ("email", "x")])
            .unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { .. }));

        let err = table
            .cells_from_literals([("id", "4"), ("name", "Dave"), ("age", "abc")])
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_duplicate_primary_key_leaves_table_untouched() {
        let mut table = users();
        table.create_index("age", IndexKind::Hash).unwrap();

        let cells = vec![
            Cell::Integer(2),
            Cell::Text("Bobby".to_string()),
            Cell::Integer(99),
        ];
        let err = table.insert(cells).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { .. }));

        assert_eq!(table.len(), 3);
        let age = table.index("age", IndexKind::Hash).unwrap();
        assert!(age.lookup(&Cell::Integer(99)).is_empty());
        assert_eq!(age.len(), 3);
    }

    #[test]
    fn test_delete_maintains_indexes() {
        let mut table = users();
        table.create_index("age", IndexKind::BTree).unwrap();
        table.create_index("name", IndexKind::Hash).unwrap();

        let removed = table.delete(0).unwrap();
        assert_eq!(removed.get(1), Some(&Cell::Text("Alice".to_string())));

        let names = table.index("name", IndexKind::Hash).unwrap();
        assert!(names.lookup(&Cell::Text("Alice".to_string())).is_empty());
        assert_eq!(names.lookup(&Cell::Text("Carol".to_string())), vec![1]);

        let ages = table.index("age", IndexKind::BTree).unwrap();
        assert_eq!(
            ages.range(Bound::Included(&Cell::Integer(26)), Bound::Unbounded),
            Some(vec![0, 1])
        );

        // The primary key is free again
        table
            .insert(vec![
                Cell::Integer(1),
                Cell::Text("Alice".to_string()),
                Cell::Integer(25),
            ])
            .unwrap();

        assert!(matches!(
            table.delete(10),
            Err(Error::RowNotFound { position: 10, .. })
        ));
    }

    #[test]
    fn test_index_management() {
        let mut table = users();

        table.create_index("age", IndexKind::BTree).unwrap();
        table.create_index("age", IndexKind::Hash).unwrap();
        assert!(matches!(
            table.create_index("age", IndexKind::Hash),
            Err(Error::IndexExists { .. })
        ));
        assert!(matches!(
            table.create_index("email", IndexKind::Hash),
            Err(Error::ColumnNotFound { .. })
        ));
        assert_eq!(
            table.indexes(),
            vec![
                ("age".to_string(), IndexKind::BTree),
                ("age".to_string(), IndexKind::Hash),
            ]
        );
        assert_eq!(table.point_index("age").unwrap().kind(), IndexKind::Hash);

        table.drop_index("age", IndexKind::Hash).unwrap();
        assert!(matches!(
            table.drop_index("age", IndexKind::Hash),
            Err(Error::IndexNotFound { .. })
        ));
        assert_eq!(table.point_index("age").unwrap().kind(), IndexKind::BTree);
    }

    #[test]
    fn test_scans() {
        let table = users();
        assert_eq!(table.scan_equal(2, &Cell::Integer(30)), vec![1]);
        assert_eq!(
            table.scan_range(2, Bound::Excluded(&Cell::Integer(25)), Bound::Unbounded),
            vec![1, 2]
        );
    }
}
