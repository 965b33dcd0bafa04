use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

use crate::schema::Catalog;

/// Table reference graph. Edges point from the referencing table to the
/// referenced one (child → parent).
pub struct DependencyGraph {
    pub graph: DiGraph<String, EdgeInfo>,
    pub node_indices: HashMap<String, NodeIndex>,
}

/// One foreign key.
#[derive(Debug, Clone)]
pub struct EdgeInfo {
    pub column: String,
    pub ref_column: String,
    pub ndv: Option<i64>,
}

impl DependencyGraph {
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();

        for name in catalog.tables.keys() {
            let idx = graph.add_node(name.clone());
            node_indices.insert(name.clone(), idx);
        }

        for (name, table) in &catalog.tables {
            for fk in &table.foreign_keys {
                if let (Some(&from), Some(&to)) =
                    (node_indices.get(name), node_indices.get(&fk.ref_table))
                {
                    graph.add_edge(
                        from,
                        to,
                        EdgeInfo {
                            column: fk.column.clone(),
                            ref_column: fk.ref_column.clone(),
                            ndv: fk.ndv,
                        },
                    );
                }
            }
        }

        Self {
            graph,
            node_indices,
        }
    }

    pub fn table_name(&self, idx: NodeIndex) -> &str {
        &self.graph[idx]
    }

    pub fn node_index(&self, table: &str) -> Option<NodeIndex> {
        self.node_indices.get(table).copied()
    }

    pub fn table_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ForeignKey, Table};

    fn tpch_like() -> Catalog {
        let mut nation = Table::new("nation", 25);
        nation.primary_key = Some("n_nationkey".to_string());
        let mut customer = Table::new("customer", 150);
        customer.primary_key = Some("c_custkey".to_string());
        customer.foreign_keys.push(ForeignKey {
            column: "c_nationkey".to_string(),
            ref_table: "nation".to_string(),
            ref_column: "n_nationkey".to_string(),
            ndv: Some(25),
        });
        let mut orders = Table::new("orders", 1500);
        orders.primary_key = Some("o_orderkey".to_string());
        orders.foreign_keys.push(ForeignKey {
            column: "o_custkey".to_string(),
            ref_table: "customer".to_string(),
            ref_column: "c_custkey".to_string(),
            ndv: None,
        });
        Catalog::from_tables(vec![orders, customer, nation]).unwrap()
    }

    #[test]
    fn test_build_graph() {
        let graph = DependencyGraph::from_catalog(&tpch_like());
        assert_eq!(graph.table_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.node_index("orders").is_some());
        assert!(graph.node_index("lineitem").is_none());
    }
}
