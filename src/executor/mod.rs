//! Query execution module
//!
//! This module contains the join engine, the query planner and the executor.

pub mod executor;
pub mod join;
pub mod planner;

pub use executor::{QueryExecutor, QueryPlan, QueryResult};
pub use join::{join, JoinBenchmark, JoinEngine, JoinResult, JoinStrategy, ResultRow};
pub use planner::{AccessPath, LogicalPlan, Planner, Probe};
