//! Storage engine module
//!
//! This module contains the in-memory storage components:
//! - Typed cells and rows
//! - Tables with primary key enforcement
//! - B+ tree and hash indexes behind one index contract

pub mod btree;
pub mod cell;
pub mod hash;
pub mod index;
pub mod table;

pub use btree::BPlusTree;
pub use cell::{Cell, Row};
pub use hash::HashIndex;
pub use index::{Index, IndexKind, RowPosition};
pub use table::Table;
