//! Constraint chains: what the rows of one table satisfied along one query
//! path, and the filter trees and parameters inside them.

pub mod arithmetic;
pub mod filter;
pub mod node;
pub mod operator;
pub mod parameter;
pub mod pushdown;

use indexmap::IndexMap;

pub use filter::{BatchView, BoolExpr, FilterOperation, FilterTarget, LogicNode, LogicOperator};
pub use node::{
    AggregateNode, ChainOutcome, ConstraintChain, ConstraintChainNode, FilterNode, FkJoinNode,
    JoinLookup, JoinType, PkJoinNode,
};
pub use operator::CompareOperator;
pub use parameter::{Parameter, ParameterKind};

/// Constraint chains keyed by query name, in input order.
pub type QueryChains = IndexMap<String, Vec<ConstraintChain>>;

/// All chains on `table`, across queries, in a stable order.
pub fn chains_for_table<'a>(chains: &'a QueryChains, table: &str) -> Vec<&'a ConstraintChain> {
    chains
        .values()
        .flatten()
        .filter(|c| c.table_name == table)
        .collect()
}
