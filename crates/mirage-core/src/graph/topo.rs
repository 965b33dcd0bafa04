use petgraph::algo::{tarjan_scc, toposort};

use crate::error::{MirageError, Result};
use crate::graph::dag::DependencyGraph;

/// Tables in generation order: every referenced table comes before the
/// tables referencing it, since its rule table must exist first.
pub fn generation_order(graph: &DependencyGraph) -> Result<Vec<String>> {
    match toposort(&graph.graph, None) {
        // edges go child → parent, so parents come last
        Ok(sorted) => Ok(sorted
            .iter()
            .rev()
            .map(|&idx| graph.table_name(idx).to_string())
            .collect()),
        Err(cycle) => {
            let mut tables: Vec<String> = tarjan_scc(&graph.graph)
                .into_iter()
                .find(|scc| scc.contains(&cycle.node_id()))
                .unwrap_or_default()
                .into_iter()
                .map(|idx| graph.table_name(idx).to_string())
                .collect();
            tables.sort();
            if tables.is_empty() {
                tables.push(graph.table_name(cycle.node_id()).to_string());
            }
            Err(MirageError::CircularDependency {
                tables: tables.join(", "),
            })
        }
    }
}
