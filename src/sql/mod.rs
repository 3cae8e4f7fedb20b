//! SQL front end
//!
//! Lexer, parser and the structured query it produces.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{
    ColumnRef, ComparisonOp, JoinClause, JoinKind, Literal, OrderBy, ParsedQuery, Predicate,
    Projection,
};
pub use lexer::Lexer;
pub use parser::{parse_query, Parser};
pub use token::Token;
