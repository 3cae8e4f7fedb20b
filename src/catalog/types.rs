//! Data types for TabulaDB
//!
//! The closed set of column types a schema may declare.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::UnknownName;

/// Column data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    /// 64-bit signed integer
    Integer,
    /// UTF-8 text
    String,
    /// Finite 64-bit float
    Double,
}

impl DataType {
    /// Check if this type is numeric
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Double)
    }

    /// Check if values of this type can be compared with values of another type
    pub fn is_comparable_with(&self, other: &DataType) -> bool {
        match (self, other) {
            (a, b) if a == b => true,
            (a, b) => a.is_numeric() && b.is_numeric(),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Integer => write!(f, "INTEGER"),
            DataType::String => write!(f, "STRING"),
            DataType::Double => write!(f, "DOUBLE"),
        }
    }
}

impl FromStr for DataType {
    type Err = UnknownName;

    /// Accepts the canonical names plus the usual SQL aliases
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "INTEGER" | "INT" | "BIGINT" => Ok(DataType::Integer),
            "STRING" | "TEXT" | "VARCHAR" => Ok(DataType::String),
            "DOUBLE" | "FLOAT" | "REAL" => Ok(DataType::Double),
            _ => Err(UnknownName {
                what: "data type",
                name: s.trim().to_string(),
                expected: "INTEGER, STRING or DOUBLE",
            }),
        }
    }
}
