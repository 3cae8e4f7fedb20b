//! Cell and Row types for TabulaDB
//!
//! This module defines how typed values are represented in memory.

use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::catalog::DataType;
use crate::error::{Error, Result};
use crate::sql::ast::Literal;

/// A single typed value
///
/// Doubles are always finite and `-0.0` is stored as `0.0`, so equality and
/// hashing can work on the bit pattern.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Cell {
    /// INTEGER value
    Integer(i64),
    /// STRING value
    Text(String),
    /// DOUBLE value
    Real(f64),
}

fn canonical_bits(value: f64) -> u64 {
    if value == 0.0 {
        0
    } else if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Cell::Integer(a), Cell::Integer(b)) => a == b,
            (Cell::Text(a), Cell::Text(b)) => a == b,
            (Cell::Real(a), Cell::Real(b)) => canonical_bits(*a) == canonical_bits(*b),
            _ => false,
        }
    }
}

impl Eq for Cell {}

impl Hash for Cell {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Cell::Integer(v) => v.hash(state),
            Cell::Text(v) => v.hash(state),
            Cell::Real(v) => canonical_bits(*v).hash(state),
        }
    }
}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Total order used for index keys. Within one type it is the natural order;
/// across types it orders by type, which never happens inside a single index.
impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Cell::Integer(a), Cell::Integer(b)) => a.cmp(b),
            (Cell::Text(a), Cell::Text(b)) => a.cmp(b),
            (Cell::Real(a), Cell::Real(b)) => f64::from_bits(canonical_bits(*a))
                .total_cmp(&f64::from_bits(canonical_bits(*b))),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Cell {
    /// Build a DOUBLE cell, rejecting NaN and infinities
    pub fn real(value: f64) -> Result<Cell> {
        if !value.is_finite() {
            return Err(Error::type_mismatch(
                "a finite DOUBLE",
                format!("{}", value),
            ));
        }
        Ok(Cell::Real(if value == 0.0 { 0.0 } else { value }))
    }

    /// Runtime type of this cell
    pub fn data_type(&self) -> DataType {
        match self {
            Cell::Integer(_) => DataType::Integer,
            Cell::Text(_) => DataType::String,
            Cell::Real(_) => DataType::Double,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Cell::Integer(_) => 0,
            Cell::Real(_) => 1,
            Cell::Text(_) => 2,
        }
    }

    /// Coerce a raw literal into a cell of the declared column type
    ///
    /// A STRING column keeps the raw text as-is. Numeric columns classify the
    /// literal first: an integer literal fits INTEGER and DOUBLE, a decimal
    /// literal fits only DOUBLE, anything else is a `TypeMismatch`.
    pub fn coerce(raw: &str, data_type: DataType) -> Result<Cell> {
        if data_type == DataType::String {
            return Ok(Cell::Text(raw.to_string()));
        }

        match (Literal::classify(raw), data_type) {
            (Literal::Integer(v), DataType::Integer) => Ok(Cell::Integer(v)),
            (Literal::Integer(v), DataType::Double) => Cell::real(v as f64),
            (Literal::Float(v), DataType::Double) => Cell::real(v),
            (literal, data_type) => Err(Error::type_mismatch(
                data_type,
                format!("{} literal '{}'", literal.type_name(), raw),
            )),
        }
    }

    /// The cell a parsed query literal denotes
    pub fn from_literal(literal: &Literal) -> Result<Cell> {
        match literal {
            Literal::Integer(v) => Ok(Cell::Integer(*v)),
            Literal::Float(v) => Cell::real(*v),
            Literal::String(s) => Ok(Cell::Text(s.clone())),
        }
    }

    /// Numeric view of this cell
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Integer(v) => Some(*v as f64),
            Cell::Real(v) => Some(*v),
            Cell::Text(_) => None,
        }
    }

    /// INTEGER cells promoted to DOUBLE, others unchanged
    pub fn promoted(&self) -> Cell {
        match self {
            Cell::Integer(v) => Cell::Real(*v as f64),
            other => other.clone(),
        }
    }

    /// Type-aware comparison: numeric across INTEGER and DOUBLE, lexicographic
    /// for STRING. Returns `None` for incomparable types.
    pub fn compare(&self, other: &Cell) -> Option<Ordering> {
        match (self, other) {
            (Cell::Integer(a), Cell::Integer(b)) => Some(a.cmp(b)),
            (Cell::Text(a), Cell::Text(b)) => Some(a.cmp(b)),
            (Cell::Text(_), _) | (_, Cell::Text(_)) => None,
            (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Integer(v) => write!(f, "{}", v),
            Cell::Text(v) => write!(f, "{}", v),
            Cell::Real(v) => write!(f, "{:?}", v),
        }
    }
}

/// A stored row: one cell per schema column, in schema order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row(Vec<Cell>);

impl Row {
    pub(crate) fn new(cells: Vec<Cell>) -> Self {
        Self(cells)
    }

    /// Get cell at column index
    pub fn get(&self, index: usize) -> Option<&Cell> {
        self.0.get(index)
    }

    /// All cells of the row
    pub fn cells(&self) -> &[Cell] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_cells(self) -> Vec<Cell> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_coerce_literals() {
        assert_eq!(
            Cell::coerce("25", DataType::Integer).unwrap(),
            Cell::Integer(25)
        );
        assert_eq!(
            Cell::coerce("25", DataType::Double).unwrap(),
            Cell::Real(25.0)
        );
        assert_eq!(
            Cell::coerce("99.99", DataType::Double).unwrap(),
            Cell::Real(99.99)
        );
        assert_eq!(
            Cell::coerce(" 007 ", DataType::String).unwrap(),
            Cell::Text(" 007 ".to_string())
        );

        for (raw, data_type) in [
            ("abc", DataType::Integer),
            ("1.5", DataType::Integer),
            ("abc", DataType::Double),
            ("NaN", DataType::Double),
        ] {
            let err = Cell::coerce(raw, data_type).unwrap_err();
            assert!(
                matches!(err, Error::TypeMismatch { .. }),
                "{} as {}",
                raw,
                data_type
            );
        }
    }

    #[test]
    fn test_negative_zero_is_canonical() {
        let a = Cell::real(-0.0).unwrap();
        let b = Cell::real(0.0).unwrap();
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_compare() {
        assert_eq!(
            Cell::Integer(3).compare(&Cell::Real(2.5)),
            Some(Ordering::Greater)
        );
        assert_eq!(
            Cell::Real(2.0).compare(&Cell::Integer(2)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Cell::Text("Bob".to_string()).compare(&Cell::Text("Alice".to_string())),
            Some(Ordering::Greater)
        );
        assert_eq!(Cell::Text("1".to_string()).compare(&Cell::Integer(1)), None);
    }

    #[test]
    fn test_display_and_json() {
        assert_eq!(Cell::Real(149.5).to_string(), "149.5");
        assert_eq!(Cell::Real(30.0).to_string(), "30.0");
        assert_eq!(Cell::Integer(-4).to_string(), "-4");

        let row = Row::new(vec![
            Cell::Integer(1),
            Cell::Text("Alice".to_string()),
            Cell::Real(99.99),
        ]);
        assert_eq!(serde_json::to_string(&row).unwrap(), r#"[1,"Alice",99.99]"#);
    }
}
