//! Engine configuration
//!
//! Tunables that shape index construction and join strategy selection.

use serde::{Deserialize, Serialize};

use crate::executor::JoinStrategy;

/// Default branching factor of every B+ tree index
pub const DEFAULT_BTREE_ORDER: usize = 4;

/// Smallest branching factor a B+ tree can be built with
pub const MIN_BTREE_ORDER: usize = 3;

/// Default row count below which nested loop is preferred over hash join
pub const DEFAULT_NESTED_LOOP_THRESHOLD: usize = 100;

/// How queries pick a join strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyPreference {
    /// Size/index heuristic
    #[default]
    Auto,
    NestedLoop,
    HashJoin,
}

impl StrategyPreference {
    /// The forced strategy, if any
    pub fn forced(&self) -> Option<JoinStrategy> {
        match self {
            StrategyPreference::Auto => None,
            StrategyPreference::NestedLoop => Some(JoinStrategy::NestedLoop),
            StrategyPreference::HashJoin => Some(JoinStrategy::HashJoin),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Branching factor fixed at construction of each B+ tree
    pub btree_order: usize,
    /// Nested loop is chosen when the smaller join input has fewer rows than this
    pub nested_loop_threshold: usize,
    /// Strategy used by queries
    pub join_strategy: StrategyPreference,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            btree_order: DEFAULT_BTREE_ORDER,
            nested_loop_threshold: DEFAULT_NESTED_LOOP_THRESHOLD,
            join_strategy: StrategyPreference::Auto,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the B+ tree order, clamped to [`MIN_BTREE_ORDER`]
    pub fn with_btree_order(mut self, order: usize) -> Self {
        self.btree_order = order.max(MIN_BTREE_ORDER);
        self
    }

    /// Set the nested loop threshold
    pub fn with_nested_loop_threshold(mut self, threshold: usize) -> Self {
        self.nested_loop_threshold = threshold;
        self
    }

    /// Force or release a join strategy
    pub fn with_join_strategy(mut self, preference: StrategyPreference) -> Self {
        self.join_strategy = preference;
        self
    }

    /// Parse a configuration from JSON; absent fields keep their defaults
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        let order = config.btree_order;
        Ok(config.with_btree_order(order))
    }
}
