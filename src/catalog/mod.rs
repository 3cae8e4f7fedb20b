//! Catalog module
//!
//! This module contains the database catalog, schema definitions, and data types.

pub mod database;
pub mod schema;
pub mod types;

use std::sync::Arc;

pub use database::{Database, IndexInfo, SearchPredicate, SearchResult, TableBuilder, TableInfo};
pub use schema::{Column, Schema};
pub use types::DataType;

/// Lookup of table schemas by name, used to validate queries
pub trait SchemaSource {
    fn table_schema(&self, table: &str) -> Option<Arc<Schema>>;
}
