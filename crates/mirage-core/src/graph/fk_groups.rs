//! Partition of a table's joined FK columns into groups that must be
//! populated together.
//!
//! Column `a` gets an edge to `b` when some chain joins on `a` immediately
//! before `b`. Columns of one strongly connected component interleave
//! across chains and share one join model; components are returned in
//! chain order.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

use crate::chain::ConstraintChain;

pub fn fk_groups(chains: &[&ConstraintChain]) -> Vec<Vec<String>> {
    let mut graph: DiGraph<String, ()> = DiGraph::new();
    let mut nodes: HashMap<String, NodeIndex> = HashMap::new();

    for chain in chains {
        let mut previous: Option<NodeIndex> = None;
        for join in chain.fk_joins() {
            let column = join.column().to_string();
            let node = *nodes
                .entry(column.clone())
                .or_insert_with(|| graph.add_node(column));
            if let Some(prev) = previous {
                if prev != node && graph.find_edge(prev, node).is_none() {
                    graph.add_edge(prev, node, ());
                }
            }
            previous = Some(node);
        }
    }

    // tarjan_scc yields components in reverse topological order
    tarjan_scc(&graph)
        .into_iter()
        .rev()
        .map(|scc| {
            let mut members: Vec<NodeIndex> = scc;
            members.sort();
            members.into_iter().map(|n| graph[n].clone()).collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ConstraintChainNode, FkJoinNode, JoinType};
    use rust_decimal::Decimal;

    fn join(column: &str, tag: u32) -> ConstraintChainNode {
        ConstraintChainNode::FkJoin(FkJoinNode {
            local_columns: vec![column.to_string()],
            ref_table: "t".to_string(),
            ref_columns: vec!["id".to_string()],
            pk_tag: tag,
            probability: Decimal::ONE,
            distinct_probability: None,
            join_type: JoinType::Inner,
            probability_with_fail_filter: None,
        })
    }

    fn chain(nodes: Vec<ConstraintChainNode>) -> ConstraintChain {
        ConstraintChain {
            table_name: "lineitem".to_string(),
            chain_index: 0,
            nodes,
        }
    }

    #[test]
    fn test_independent_columns_form_singletons() {
        let a = chain(vec![join("l_orderkey", 1)]);
        let b = chain(vec![join("l_partkey", 2)]);
        let groups = fk_groups(&[&a, &b]);
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.len() == 1));
    }

    #[test]
    fn test_interleaved_columns_share_a_group() {
        let a = chain(vec![join("l_orderkey", 1), join("l_partkey", 2)]);
        let b = chain(vec![join("l_partkey", 3), join("l_orderkey", 4)]);
        let groups = fk_groups(&[&a, &b]);
        assert_eq!(
            groups,
            vec![vec!["l_orderkey".to_string(), "l_partkey".to_string()]]
        );
    }

    #[test]
    fn test_sequenced_columns_keep_chain_order() {
        let a = chain(vec![join("l_orderkey", 1), join("l_partkey", 2)]);
        let groups = fk_groups(&[&a]);
        assert_eq!(
            groups,
            vec![vec!["l_orderkey".to_string()], vec!["l_partkey".to_string()]]
        );
    }

    #[test]
    fn test_no_joins_no_groups() {
        assert!(fk_groups(&[]).is_empty());
    }
}
