//! Error types for TabulaDB
//!
//! Every fallible operation of the engine returns [`Result`]. Each variant
//! carries the offending identifier, token or value so callers can render a
//! precise message; [`Error::kind`] maps a variant onto the closed set of
//! error kinds exposed to presentation layers.

use serde::Serialize;
use thiserror::Error;

use crate::storage::IndexKind;

/// The main error type for TabulaDB
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // ========== Catalog Errors ==========
    #[error("Catalog error: table '{0}' not found")]
    TableNotFound(String),

    #[error("Catalog error: table '{0}' already exists")]
    DuplicateTable(String),

    #[error("Catalog error: column '{column}' not found in table '{table}'")]
    ColumnNotFound { column: String, table: String },

    #[error("Catalog error: {kind} index on '{table}.{column}' already exists")]
    IndexExists {
        table: String,
        column: String,
        kind: IndexKind,
    },

    #[error("Catalog error: no {kind} index on '{table}.{column}'")]
    IndexNotFound {
        table: String,
        column: String,
        kind: IndexKind,
    },

    // ========== Row Errors ==========
    #[error("Schema error: row does not match table '{table}': {reason}")]
    SchemaMismatch { table: String, reason: String },

    #[error("Type error: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Constraint error: duplicate value {value} for primary key '{table}.{column}'")]
    DuplicateKey {
        table: String,
        column: String,
        value: String,
    },

    #[error("Storage error: no row at position {position} in table '{table}'")]
    RowNotFound { table: String, position: usize },

    // ========== Query Errors ==========
    #[error("Syntax error at position {position}: unexpected '{token}', expected {expected}")]
    SyntaxError {
        token: String,
        position: usize,
        expected: String,
    },

    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),

    #[error("Invalid LIMIT '{0}': expected a non-negative integer")]
    InvalidLimit(String),
}

/// Closed set of error kinds, without context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    TableNotFound,
    DuplicateTable,
    ColumnNotFound,
    SchemaMismatch,
    TypeMismatch,
    DuplicateKey,
    RowNotFound,
    IndexExists,
    IndexNotFound,
    SyntaxError,
    UnsupportedExpression,
    InvalidLimit,
}

impl Error {
    /// The kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TableNotFound(_) => ErrorKind::TableNotFound,
            Error::DuplicateTable(_) => ErrorKind::DuplicateTable,
            Error::ColumnNotFound { .. } => ErrorKind::ColumnNotFound,
            Error::IndexExists { .. } => ErrorKind::IndexExists,
            Error::IndexNotFound { .. } => ErrorKind::IndexNotFound,
            Error::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            Error::RowNotFound { .. } => ErrorKind::RowNotFound,
            Error::SyntaxError { .. } => ErrorKind::SyntaxError,
            Error::UnsupportedExpression(_) => ErrorKind::UnsupportedExpression,
            Error::InvalidLimit(_) => ErrorKind::InvalidLimit,
        }
    }

    pub(crate) fn column_not_found(column: impl Into<String>, table: impl Into<String>) -> Self {
        Error::ColumnNotFound {
            column: column.into(),
            table: table.into(),
        }
    }

    pub(crate) fn type_mismatch(expected: impl ToString, found: impl Into<String>) -> Self {
        Error::TypeMismatch {
            expected: expected.to_string(),
            found: found.into(),
        }
    }
}

/// A type or index-kind name that is not recognized
#[derive(Error, Debug, Clone, PartialEq)]
#[error("unknown {what} '{name}', expected {expected}")]
pub struct UnknownName {
    pub what: &'static str,
    pub name: String,
    pub expected: &'static str,
}

/// Result type alias for TabulaDB operations
pub type Result<T> = std::result::Result<T, Error>;
