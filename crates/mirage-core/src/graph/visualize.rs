use petgraph::visit::EdgeRef;

use crate::graph::dag::DependencyGraph;
use crate::schema::Catalog;

/// Output format for graph visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Mermaid,
    Dot,
}

/// Render the table reference graph, labelling nodes with their row counts
/// and edges with the FK column.
pub fn visualize(graph: &DependencyGraph, catalog: &Catalog, format: GraphFormat) -> String {
    match format {
        GraphFormat::Mermaid => generate_mermaid(graph, catalog),
        GraphFormat::Dot => generate_dot(graph, catalog),
    }
}

fn size_of(catalog: &Catalog, table: &str) -> i64 {
    catalog.table(table).map(|t| t.size).unwrap_or(0)
}

fn edge_label(column: &str, ndv: Option<i64>) -> String {
    match ndv {
        Some(n) => format!("{} ndv={}", column, n),
        None => column.to_string(),
    }
}

fn generate_mermaid(graph: &DependencyGraph, catalog: &Catalog) -> String {
    let mut output = String::from("graph TD\n");

    for node in graph.graph.node_indices() {
        let name = graph.table_name(node);
        output.push_str(&format!(
            "    {}[\"{} ({} rows)\"]\n",
            name,
            name,
            size_of(catalog, name)
        ));
    }

    output.push('\n');

    for edge in graph.graph.edge_references() {
        let from = graph.table_name(edge.source());
        let to = graph.table_name(edge.target());
        let info = edge.weight();
        output.push_str(&format!(
            "    {} -->|{}| {}\n",
            from,
            edge_label(&info.column, info.ndv),
            to
        ));
    }

    output
}

fn generate_dot(graph: &DependencyGraph, catalog: &Catalog) -> String {
    let mut output = String::from("digraph dependencies {\n");
    output.push_str("    rankdir=TB;\n");
    output.push_str("    node [shape=box, style=rounded];\n\n");

    for node in graph.graph.node_indices() {
        let name = graph.table_name(node);
        output.push_str(&format!(
            "    \"{}\" [label=\"{}\\n{} rows\"];\n",
            name,
            name,
            size_of(catalog, name)
        ));
    }

    for edge in graph.graph.edge_references() {
        let from = graph.table_name(edge.source());
        let to = graph.table_name(edge.target());
        let info = edge.weight();
        output.push_str(&format!(
            "    \"{}\" -> \"{}\" [label=\"{}\"];\n",
            from,
            to,
            edge_label(&info.column, info.ndv)
        ));
    }

    output.push_str("}\n");
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ForeignKey, Table};

    fn catalog() -> Catalog {
        let mut users = Table::new("users", 40);
        users.primary_key = Some("id".to_string());
        let mut orders = Table::new("orders", 400);
        orders.foreign_keys.push(ForeignKey {
            column: "user_id".to_string(),
            ref_table: "users".to_string(),
            ref_column: "id".to_string(),
            ndv: Some(30),
        });
        Catalog::from_tables(vec![users, orders]).unwrap()
    }

    #[test]
    fn test_mermaid_output() {
        let catalog = catalog();
        let graph = DependencyGraph::from_catalog(&catalog);
        let output = visualize(&graph, &catalog, GraphFormat::Mermaid);

        assert!(output.starts_with("graph TD"));
        assert!(output.contains("users[\"users (40 rows)\"]"));
        assert!(output.contains("orders -->|user_id ndv=30| users"));
    }

    #[test]
    fn test_dot_output() {
        let catalog = catalog();
        let graph = DependencyGraph::from_catalog(&catalog);
        let output = visualize(&graph, &catalog, GraphFormat::Dot);

        assert!(output.starts_with("digraph dependencies {"));
        assert!(output.contains("\"orders\" -> \"users\" [label=\"user_id ndv=30\"];"));
        assert!(output.trim_end().ends_with('}'));
    }
}
