//! Parsed query structures
//!
//! A [`ParsedQuery`] is the only statement shape the engine runs: a single
//! SELECT over one base table, optionally joined with one other table.

use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// A column reference, optionally table-qualified
///
/// After validation against the catalog every reference is qualified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: Option<String>, column: impl Into<String>) -> Self {
        Self {
            table,
            column: column.into(),
        }
    }

    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::new(Some(table.into()), column)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.column),
            None => write!(f, "{}", self.column),
        }
    }
}

/// SELECT list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Projection {
    /// `*`: every column, in schema order (left table first when joined)
    All,
    /// Explicit columns, in the order written
    Columns(Vec<ColumnRef>),
}

/// Join kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    FullOuter,
}

impl JoinKind {
    /// Whether unmatched left rows are kept
    pub fn keeps_left(&self) -> bool {
        matches!(self, JoinKind::Left | JoinKind::FullOuter)
    }

    /// Whether unmatched right rows are kept
    pub fn keeps_right(&self) -> bool {
        matches!(self, JoinKind::Right | JoinKind::FullOuter)
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKind::Inner => write!(f, "INNER"),
            JoinKind::Left => write!(f, "LEFT"),
            JoinKind::Right => write!(f, "RIGHT"),
            JoinKind::FullOuter => write!(f, "FULL_OUTER"),
        }
    }
}

/// `[kind] JOIN table ON left_column = right_column`
///
/// After validation `left_column` belongs to the FROM table and
/// `right_column` to the joined table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinClause {
    pub table: String,
    pub kind: JoinKind,
    pub left_column: ColumnRef,
    pub right_column: ColumnRef,
}

/// Comparison operators allowed in WHERE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl ComparisonOp {
    /// Whether `lhs <op> rhs` holds given `lhs.cmp(rhs)`
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            ComparisonOp::Eq => ordering == Ordering::Equal,
            ComparisonOp::NotEq => ordering != Ordering::Equal,
            ComparisonOp::Lt => ordering == Ordering::Less,
            ComparisonOp::LtEq => ordering != Ordering::Greater,
            ComparisonOp::Gt => ordering == Ordering::Greater,
            ComparisonOp::GtEq => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonOp::Eq => write!(f, "="),
            ComparisonOp::NotEq => write!(f, "!="),
            ComparisonOp::Lt => write!(f, "<"),
            ComparisonOp::LtEq => write!(f, "<="),
            ComparisonOp::Gt => write!(f, ">"),
            ComparisonOp::GtEq => write!(f, ">="),
        }
    }
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
}

impl Literal {
    /// Classify raw literal text: integers first, then decimal numbers, and
    /// everything else is a string
    pub fn classify(raw: &str) -> Literal {
        let trimmed = raw.trim();
        if let Ok(v) = trimmed.parse::<i64>() {
            return Literal::Integer(v);
        }
        if trimmed.contains('.') {
            if let Ok(v) = trimmed.parse::<f64>() {
                if v.is_finite() {
                    return Literal::Float(v);
                }
            }
        }
        Literal::String(raw.to_string())
    }

    /// Name of the type this literal denotes
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Integer(_) => "INTEGER",
            Literal::Float(_) => "DOUBLE",
            Literal::String(_) => "STRING",
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(v) => write!(f, "{}", v),
            Literal::Float(v) => write!(f, "{:?}", v),
            Literal::String(s) => write!(f, "'{}'", s),
        }
    }
}

/// `WHERE column <op> literal`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Predicate {
    pub column: ColumnRef,
    pub op: ComparisonOp,
    pub value: Literal,
}

/// `ORDER BY column [ASC|DESC]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderBy {
    pub column: ColumnRef,
    pub ascending: bool,
}

/// A parsed and validated SELECT
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedQuery {
    pub projection: Projection,
    pub from: String,
    pub join: Option<JoinClause>,
    pub filter: Option<Predicate>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl ParsedQuery {
    /// Tables the query reads, FROM table first
    pub fn tables(&self) -> Vec<&str> {
        let mut tables = vec![self.from.as_str()];
        if let Some(join) = &self.join {
            tables.push(join.table.as_str());
        }
        tables
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_classification() {
        assert_eq!(Literal::classify("42"), Literal::Integer(42));
        assert_eq!(Literal::classify(" -7 "), Literal::Integer(-7));
        assert_eq!(Literal::classify("149.50"), Literal::Float(149.5));
        assert_eq!(
            Literal::classify("1e5"),
            Literal::String("1e5".to_string())
        );
        assert_eq!(
            Literal::classify("Alice"),
            Literal::String("Alice".to_string())
        );
    }

    #[test]
    fn test_comparison_ops() {
        assert!(ComparisonOp::GtEq.holds(Ordering::Equal));
        assert!(!ComparisonOp::Gt.holds(Ordering::Equal));
        assert!(ComparisonOp::NotEq.holds(Ordering::Less));
        assert!(ComparisonOp::LtEq.holds(Ordering::Less));
    }

    #[test]
    fn test_join_kind_retention() {
        assert!(!JoinKind::Inner.keeps_left() && !JoinKind::Inner.keeps_right());
        assert!(JoinKind::Left.keeps_left() && !JoinKind::Left.keeps_right());
        assert!(JoinKind::FullOuter.keeps_left() && JoinKind::FullOuter.keeps_right());
        assert_eq!(
            serde_json::to_string(&JoinKind::FullOuter).unwrap(),
            "\"FULL_OUTER\""
        );
    }
}
