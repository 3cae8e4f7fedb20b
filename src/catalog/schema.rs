//! Schema definitions for TabulaDB
//!
//! This module defines table schemas and column metadata.

use super::types::DataType;
use crate::error::{Error, Result};
use crate::storage::Cell;
use serde::Serialize;
use std::collections::HashMap;

/// Column definition in a table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Data type
    pub data_type: DataType,
    /// Column position (0-indexed)
    pub position: usize,
    /// Is this the primary key?
    pub primary_key: bool,
}

impl Column {
    /// Create a new column
    pub fn new(name: impl Into<String>, data_type: DataType, position: usize) -> Self {
        Self {
            name: name.into(),
            data_type,
            position,
            primary_key: false,
        }
    }

    /// Set primary key flag
    pub fn primary_key(mut self, pk: bool) -> Self {
        self.primary_key = pk;
        self
    }
}

/// Table schema - the ordered columns of a table and its optional primary key
#[derive(Debug, Clone, Serialize)]
pub struct Schema {
    /// Ordered list of columns
    columns: Vec<Column>,
    /// Column name to index mapping
    #[serde(skip)]
    name_to_index: HashMap<String, usize>,
    /// Position of the primary key column
    #[serde(skip)]
    primary_key: Option<usize>,
}

impl Schema {
    /// Build a validated schema for `table`
    ///
    /// Fails with `SchemaMismatch` for an empty column list or a repeated
    /// column name, and with `ColumnNotFound` if the primary key names no column.
    pub fn new<S: Into<String>>(
        table: &str,
        columns: impl IntoIterator<Item = (S, DataType)>,
        primary_key: Option<&str>,
    ) -> Result<Self> {
        let mut schema = Self {
            columns: Vec::new(),
            name_to_index: HashMap::new(),
            primary_key: None,
        };

        for (name, data_type) in columns {
            let name = name.into();
            if schema.has_column(&name) {
                return Err(Error::SchemaMismatch {
                    table: table.to_string(),
                    reason: format!("column '{}' declared twice", name),
                });
            }
            let position = schema.columns.len();
            schema.name_to_index.insert(name.clone(), position);
            schema.columns.push(Column::new(name, data_type, position));
        }

        if schema.columns.is_empty() {
            return Err(Error::SchemaMismatch {
                table: table.to_string(),
                reason: "a table needs at least one column".to_string(),
            });
        }

        if let Some(pk) = primary_key {
            let position = schema
                .get_column_index(pk)
                .ok_or_else(|| Error::column_not_found(pk, table))?;
            schema.columns[position].primary_key = true;
            schema.primary_key = Some(position);
        }

        Ok(schema)
    }

    /// Get column by name
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.name_to_index.get(name).map(|&idx| &self.columns[idx])
    }

    /// Get column index by name
    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Get all columns
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Get number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Check if column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.name_to_index.contains_key(name)
    }

    /// Get the primary key column
    pub fn primary_key(&self) -> Option<&Column> {
        self.primary_key.map(|idx| &self.columns[idx])
    }

    /// Get column names
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Check that `cells` has the arity and positional types of this schema
    pub fn check_cells(&self, table: &str, cells: &[Cell]) -> Result<()> {
        if cells.len() != self.columns.len() {
            return Err(Error::SchemaMismatch {
                table: table.to_string(),
                reason: format!(
                    "expected {} values, got {}",
                    self.columns.len(),
                    cells.len()
                ),
            });
        }

        for (column, cell) in self.columns.iter().zip(cells) {
            if cell.data_type() != column.data_type {
                return Err(Error::type_mismatch(
                    column.data_type,
                    format!("{} {} for column '{}'", cell.data_type(), cell, column.name),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_schema() -> Schema {
        Schema::new(
            "users",
            [
                ("id", DataType::Integer),
                ("name", DataType::String),
                ("age", DataType::Integer),
            ],
            Some("id"),
        )
        .unwrap()
    }

    #[test]
    fn test_schema_creation() {
        let schema = users_schema();

        assert_eq!(schema.column_count(), 3);
        assert!(schema.has_column("name"));
        assert!(!schema.has_column("unknown"));
        assert_eq!(schema.get_column_index("age"), Some(2));
        assert_eq!(schema.column_names(), vec!["id", "name", "age"]);

        let pk = schema.primary_key().unwrap();
        assert_eq!(pk.name, "id");
        assert!(pk.primary_key);
        assert!(!schema.get_column("name").unwrap().primary_key);
    }

    #[test]
    fn test_invalid_schemas() {
        let err = Schema::new(
            "t",
            [("a", DataType::Integer), ("a", DataType::String)],
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { .. }));

        let err = Schema::new("t", Vec::<(String, DataType)>::new(), None).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { .. }));

        let err = Schema::new("t", [("a", DataType::Integer)], Some("b")).unwrap_err();
        assert_eq!(err, Error::column_not_found("b", "t"));
    }

    #[test]
    fn test_check_cells() {
        let schema = users_schema();

        let row = vec![
            Cell::Integer(1),
            Cell::Text("Alice".to_string()),
            Cell::Integer(25),
        ];
        assert!(schema.check_cells("users", &row).is_ok());

        let short = vec![Cell::Integer(1)];
        assert!(matches!(
            schema.check_cells("users", &short),
            Err(Error::SchemaMismatch { .. })
        ));

        let wrong_type = vec![
            Cell::Integer(1),
            Cell::Integer(7),
            Cell::Integer(25),
        ];
        assert!(matches!(
            schema.check_cells("users", &wrong_type),
            Err(Error::TypeMismatch { .. })
        ));
    }
}
