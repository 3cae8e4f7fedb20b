//! TabulaDB - An in-memory relational table engine written in Rust
//!
//! This library provides the core components of the engine:
//! - Typed tables with B+ tree and hash secondary indexes
//! - SQL parsing (lexer, parser, AST) for a single-SELECT subset
//! - Query execution (planner, executor) with nested-loop and hash joins
//! - The database catalog

pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod sql;
pub mod storage;

pub use catalog::{DataType, Database, TableBuilder};
pub use config::{EngineConfig, StrategyPreference};
pub use error::{Error, ErrorKind, Result};
pub use executor::{JoinStrategy, QueryResult};
pub use storage::{Cell, IndexKind};
