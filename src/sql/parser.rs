//! SQL Parser
//!
//! Recursive-descent parser for the supported SELECT subset:
//!
//! ```text
//! SELECT (* | col [, col]*) FROM table
//!   [[INNER | LEFT [OUTER] | RIGHT [OUTER] | FULL [OUTER]] JOIN table ON col = col]
//!   [WHERE col <op> literal]
//!   [ORDER BY col [ASC | DESC]]
//!   [LIMIT n] [;]
//! ```
//!
//! Clauses may be omitted but never reordered. [`parse_query`] also resolves
//! every table and column against the catalog, so unknown identifiers fail
//! here rather than during execution.

use std::sync::Arc;

use super::ast::*;
use super::lexer::Lexer;
use super::token::{SpannedToken, Token};
use crate::catalog::{DataType, Schema, SchemaSource};
use crate::error::{Error, Result};

/// Parse `sql` and validate it against `catalog`
pub fn parse_query(sql: &str, catalog: &impl SchemaSource) -> Result<ParsedQuery> {
    let query = Parser::new(sql)?.parse()?;
    validate(query, catalog)
}

static EOF: Token = Token::Eof;

/// SQL Parser
pub struct Parser {
    tokens: Vec<SpannedToken>,
    position: usize,
}

impl Parser {
    /// Create a new parser from a SQL string
    pub fn new(sql: &str) -> Result<Self> {
        let mut lexer = Lexer::new(sql);
        let tokens = lexer.tokenize()?;

        Ok(Self {
            tokens,
            position: 0,
        })
    }

    /// Parse one SELECT without consulting the catalog
    ///
    /// Column references keep whatever qualification was written.
    pub fn parse(&mut self) -> Result<ParsedQuery> {
        self.expect(&Token::Select, "SELECT")?;
        if self.check(&Token::Distinct) {
            return Err(Error::UnsupportedExpression(
                "SELECT DISTINCT is not supported".to_string(),
            ));
        }
        let projection = self.parse_projection()?;

        self.expect(&Token::From, "FROM")?;
        let from = self.expect_identifier("table name")?;

        let join = if self.is_join_keyword() {
            Some(self.parse_join()?)
        } else {
            None
        };
        if self.is_join_keyword() || self.check(&Token::Cross) || self.check(&Token::Comma) {
            return Err(Error::UnsupportedExpression(
                "a query may join exactly two tables with one JOIN ... ON".to_string(),
            ));
        }

        let filter = if self.check(&Token::Where) {
            self.advance();
            Some(self.parse_predicate()?)
        } else {
            None
        };

        let order_by = if self.check(&Token::Order) {
            self.advance();
            Some(self.parse_order_by()?)
        } else {
            None
        };

        let limit = if self.check(&Token::Limit) {
            self.advance();
            Some(self.parse_limit()?)
        } else {
            None
        };

        if self.check(&Token::Semicolon) {
            self.advance();
        }

        match self.current() {
            Token::Eof => {}
            Token::Group | Token::Having | Token::Offset => {
                return Err(Error::UnsupportedExpression(format!(
                    "{} clauses are not supported",
                    self.current()
                )))
            }
            _ => return Err(self.unexpected("end of query")),
        }

        Ok(ParsedQuery {
            projection,
            from,
            join,
            filter,
            order_by,
            limit,
        })
    }

    fn parse_projection(&mut self) -> Result<Projection> {
        if self.check(&Token::Asterisk) {
            self.advance();
            return Ok(Projection::All);
        }

        let mut columns = vec![self.parse_select_item()?];
        while self.check(&Token::Comma) {
            self.advance();
            columns.push(self.parse_select_item()?);
        }
        Ok(Projection::Columns(columns))
    }

    fn parse_select_item(&mut self) -> Result<ColumnRef> {
        let column = self.parse_column_ref("column name or *")?;
        match self.current() {
            Token::LParen => Err(Error::UnsupportedExpression(format!(
                "function call '{}(...)' in SELECT list",
                column
            ))),
            Token::As => Err(Error::UnsupportedExpression(
                "column aliases are not supported".to_string(),
            )),
            _ => Ok(column),
        }
    }

    fn parse_column_ref(&mut self, what: &str) -> Result<ColumnRef> {
        let first = self.expect_identifier(what)?;
        if self.check(&Token::Dot) {
            self.advance();
            let column = self.expect_identifier("column name")?;
            Ok(ColumnRef::qualified(first, column))
        } else {
            Ok(ColumnRef::new(None, first))
        }
    }

    // ========== JOIN ==========

    fn is_join_keyword(&self) -> bool {
        matches!(
            self.current(),
            Token::Join | Token::Inner | Token::Left | Token::Right | Token::Full
        )
    }

    fn parse_join(&mut self) -> Result<JoinClause> {
        let kind = self.parse_join_kind()?;
        let table = self.expect_identifier("table name")?;
        self.expect(&Token::On, "ON")?;

        let left_column = self.parse_column_ref("column name")?;
        match self.current() {
            Token::Eq => self.advance(),
            Token::Neq | Token::Lt | Token::Lte | Token::Gt | Token::Gte => {
                return Err(Error::UnsupportedExpression(format!(
                    "join condition uses '{}'; only '=' is supported",
                    self.current()
                )))
            }
            _ => return Err(self.unexpected("'='")),
        }

        let right_column = match self.current() {
            Token::Identifier(_) => self.parse_column_ref("column name")?,
            Token::IntegerLiteral(_) | Token::FloatLiteral(_) | Token::StringLiteral(_) => {
                return Err(Error::UnsupportedExpression(
                    "join condition must compare two columns".to_string(),
                ))
            }
            _ => return Err(self.unexpected("column name")),
        };
        self.reject_compound("join condition")?;

        Ok(JoinClause {
            table,
            kind,
            left_column,
            right_column,
        })
    }

    fn parse_join_kind(&mut self) -> Result<JoinKind> {
        let kind = match self.current() {
            Token::Join => return self.advance_with(JoinKind::Inner),
            Token::Inner => JoinKind::Inner,
            Token::Left => JoinKind::Left,
            Token::Right => JoinKind::Right,
            Token::Full => JoinKind::FullOuter,
            _ => return Err(self.unexpected("JOIN")),
        };
        self.advance();

        if kind != JoinKind::Inner && self.check(&Token::Outer) {
            self.advance();
        }
        self.expect(&Token::Join, "JOIN")?;
        Ok(kind)
    }

    // ========== WHERE / ORDER BY / LIMIT ==========

    fn parse_predicate(&mut self) -> Result<Predicate> {
        if matches!(self.current(), Token::Not | Token::LParen) {
            return Err(Error::UnsupportedExpression(
                "WHERE supports a single 'column <op> literal' comparison".to_string(),
            ));
        }

        let column = self.parse_column_ref("column name")?;
        self.reject_compound("WHERE")?;

        let op = match self.current() {
            Token::Eq => ComparisonOp::Eq,
            Token::Neq => ComparisonOp::NotEq,
            Token::Lt => ComparisonOp::Lt,
            Token::Lte => ComparisonOp::LtEq,
            Token::Gt => ComparisonOp::Gt,
            Token::Gte => ComparisonOp::GtEq,
            _ => return Err(self.unexpected("comparison operator")),
        };
        self.advance();

        let value = match self.current().clone() {
            Token::IntegerLiteral(v) => Literal::Integer(v),
            Token::FloatLiteral(v) => Literal::Float(v),
            Token::StringLiteral(s) => Literal::String(s),
            Token::Identifier(other) => {
                return Err(Error::UnsupportedExpression(format!(
                    "comparing column '{}' with column '{}'",
                    column, other
                )))
            }
            _ => return Err(self.unexpected("literal")),
        };
        self.advance();
        self.reject_compound("WHERE")?;

        Ok(Predicate { column, op, value })
    }

    fn parse_order_by(&mut self) -> Result<OrderBy> {
        self.expect(&Token::By, "BY")?;
        let column = self.parse_column_ref("column name")?;

        let ascending = match self.current() {
            Token::Asc => self.advance_with(true)?,
            Token::Desc => self.advance_with(false)?,
            _ => true,
        };

        if self.check(&Token::Comma) {
            return Err(Error::UnsupportedExpression(
                "ORDER BY takes exactly one column".to_string(),
            ));
        }
        Ok(OrderBy { column, ascending })
    }

    fn parse_limit(&mut self) -> Result<usize> {
        let limit = match self.current().clone() {
            Token::IntegerLiteral(n) => {
                usize::try_from(n).map_err(|_| Error::InvalidLimit(n.to_string()))?
            }
            other => return Err(Error::InvalidLimit(other.to_string())),
        };
        self.advance();
        Ok(limit)
    }

    /// Fail on AND/OR or arithmetic following a complete comparison
    fn reject_compound(&self, context: &str) -> Result<()> {
        match self.current() {
            Token::And | Token::Or => Err(Error::UnsupportedExpression(format!(
                "{} combines conditions with {}; only a single comparison is supported",
                context,
                self.current()
            ))),
            Token::Plus | Token::Minus | Token::Asterisk | Token::Slash => {
                Err(Error::UnsupportedExpression(format!(
                    "arithmetic in {} is not supported",
                    context
                )))
            }
            _ => Ok(()),
        }
    }

    // ========== Helper Methods ==========

    fn current(&self) -> &Token {
        self.tokens
            .get(self.position)
            .map(|t| &t.token)
            .unwrap_or(&EOF)
    }

    fn current_position(&self) -> usize {
        self.tokens
            .get(self.position)
            .or_else(|| self.tokens.last())
            .map(|t| t.position)
            .unwrap_or(0)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn advance_with<T>(&mut self, value: T) -> Result<T> {
        self.advance();
        Ok(value)
    }

    fn check(&self, token: &Token) -> bool {
        self.current() == token
    }

    fn unexpected(&self, expected: &str) -> Error {
        Error::SyntaxError {
            token: self.current().to_string(),
            position: self.current_position(),
            expected: expected.to_string(),
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<()> {
        if self.check(token) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<String> {
        match self.current() {
            Token::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }
}

// ========== Validation ==========

type Scope = Vec<(String, Arc<Schema>)>;

/// Resolve every identifier of `query` against the catalog
///
/// Unqualified columns bind to the FROM table first, then the joined table.
/// The join condition is normalized so its left column belongs to the FROM
/// table.
pub fn validate(query: ParsedQuery, catalog: &impl SchemaSource) -> Result<ParsedQuery> {
    let base = catalog
        .table_schema(&query.from)
        .ok_or_else(|| Error::TableNotFound(query.from.clone()))?;
    let mut scope: Scope = vec![(query.from.clone(), base)];

    let join = match query.join {
        None => None,
        Some(join) => {
            if join.table == query.from {
                return Err(Error::UnsupportedExpression(format!(
                    "self-join of table '{}'",
                    join.table
                )));
            }
            let schema = catalog
                .table_schema(&join.table)
                .ok_or_else(|| Error::TableNotFound(join.table.clone()))?;
            scope.push((join.table.clone(), schema));
            Some(validate_join(&scope, join)?)
        }
    };

    let filter = match query.filter {
        Some(predicate) => Some(Predicate {
            column: resolve(&scope, &predicate.column)?.0,
            ..predicate
        }),
        None => None,
    };

    let order_by = match query.order_by {
        Some(order) => Some(OrderBy {
            column: resolve(&scope, &order.column)?.0,
            ..order
        }),
        None => None,
    };

    let projection = match query.projection {
        Projection::All => Projection::All,
        Projection::Columns(columns) => Projection::Columns(
            columns
                .iter()
                .map(|c| resolve(&scope, c).map(|(resolved, _)| resolved))
                .collect::<Result<_>>()?,
        ),
    };

    Ok(ParsedQuery {
        projection,
        from: query.from,
        join,
        filter,
        order_by,
        limit: query.limit,
    })
}

fn validate_join(scope: &Scope, join: JoinClause) -> Result<JoinClause> {
    let (from, joined) = (&scope[0].0, &scope[1].0);
    let a = resolve(scope, &join.left_column)?;
    let b = resolve(scope, &join.right_column)?;

    let belongs = |c: &ColumnRef, table: &String| c.table.as_ref() == Some(table);
    let ((left, left_type), (right, right_type)) =
        if belongs(&a.0, from) && belongs(&b.0, joined) {
            (a, b)
        } else if belongs(&b.0, from) && belongs(&a.0, joined) {
            (b, a)
        } else {
            return Err(Error::UnsupportedExpression(format!(
                "join condition must compare a column of '{}' with a column of '{}'",
                from, joined
            )));
        };

    if !left_type.is_comparable_with(&right_type) {
        return Err(Error::type_mismatch(
            format!("a {} column to join with {}", left_type, left),
            format!("{} column {}", right_type, right),
        ));
    }

    Ok(JoinClause {
        table: join.table,
        kind: join.kind,
        left_column: left,
        right_column: right,
    })
}

fn resolve(scope: &Scope, column: &ColumnRef) -> Result<(ColumnRef, DataType)> {
    match &column.table {
        Some(table) => {
            let (_, schema) = scope
                .iter()
                .find(|(name, _)| name == table)
                .ok_or_else(|| Error::TableNotFound(table.clone()))?;
            let found = schema
                .get_column(&column.column)
                .ok_or_else(|| Error::column_not_found(&column.column, table))?;
            Ok((ColumnRef::qualified(table, &column.column), found.data_type))
        }
        None => scope
            .iter()
            .find_map(|(name, schema)| {
                schema
                    .get_column(&column.column)
                    .map(|c| (ColumnRef::qualified(name, &column.column), c.data_type))
            })
            .ok_or_else(|| Error::column_not_found(&column.column, &scope[0].0)),
    }
}
