//! Loading of the analysis-stage documents: `schema.json` and
//! `chains.json`.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::chain::{ConstraintChainNode, QueryChains};
use crate::error::{MirageError, Result};
use crate::schema::{Catalog, Table};
use crate::state::compute_input_hash;

#[derive(Debug, Deserialize)]
struct SchemaDocument {
    tables: Vec<Table>,
}

/// Validated inputs of one run.
#[derive(Debug, Clone)]
pub struct Inputs {
    pub catalog: Catalog,
    pub chains: QueryChains,
    pub input_hash: String,
}

pub fn load_inputs(schema_path: &Path, chains_path: &Path) -> Result<Inputs> {
    let schema_text = read(schema_path)?;
    let chains_text = read(chains_path)?;
    let catalog = parse_schema(&schema_text, &schema_path.display().to_string())?;
    let chains = parse_chains(&chains_text, &chains_path.display().to_string())?;
    validate_chains(&catalog, &chains)?;
    info!(
        tables = catalog.table_count(),
        queries = chains.len(),
        chains = chains.values().map(Vec::len).sum::<usize>(),
        "Inputs loaded"
    );
    Ok(Inputs {
        catalog,
        chains,
        input_hash: compute_input_hash(&schema_text, &chains_text),
    })
}

/// Schema only, for commands that never look at chains.
pub fn load_schema(path: &Path) -> Result<Catalog> {
    parse_schema(&read(path)?, &path.display().to_string())
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| MirageError::Input {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

pub fn parse_schema(text: &str, label: &str) -> Result<Catalog> {
    let document: SchemaDocument = serde_json::from_str(text).map_err(|e| MirageError::Input {
        path: label.to_string(),
        message: e.to_string(),
    })?;
    Catalog::from_tables(document.tables)
}

pub fn parse_chains(text: &str, label: &str) -> Result<QueryChains> {
    serde_json::from_str(text).map_err(|e| MirageError::Input {
        path: label.to_string(),
        message: e.to_string(),
    })
}

/// Every chain must name a known table, known attribute columns and
/// declared foreign keys, in a node order the generator supports.
pub fn validate_chains(catalog: &Catalog, chains: &QueryChains) -> Result<()> {
    for (query, list) in chains {
        for chain in list {
            let table = catalog.table(&chain.table_name)?;
            chain.validate()?;
            let invalid = |message: String| MirageError::Input {
                path: format!("{} chain {}", query, chain.chain_index),
                message,
            };
            for node in &chain.nodes {
                match node {
                    ConstraintChainNode::Filter(filter) => {
                        for op in filter.root.leaves() {
                            for column in op.columns() {
                                table.column(column)?;
                            }
                        }
                    }
                    ConstraintChainNode::PkJoin(_) if table.primary_key.is_none() => {
                        return Err(invalid(format!(
                            "primary-key join on {}, which has no primary key",
                            table.name
                        )));
                    }
                    ConstraintChainNode::PkJoin(_) => {}
                    ConstraintChainNode::FkJoin(join) => match table.foreign_key(join.column()) {
                        Some(fk) if fk.ref_table == join.ref_table => {}
                        _ => {
                            return Err(invalid(format!(
                                "{}.{} is not a foreign key to {}",
                                table.name,
                                join.column(),
                                join.ref_table
                            )))
                        }
                    },
                    ConstraintChainNode::Aggregate(_) => {}
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SCHEMA: &str = r#"{
        "tables": [
            {"name": "nation", "size": 25, "primary_key": "n_nationkey",
             "columns": [{"name": "n_name", "type": "varchar", "range_size": 25}]},
            {"name": "supplier", "size": 100, "primary_key": "s_suppkey",
             "foreign_keys": [{"column": "s_nationkey", "ref_table": "nation", "ref_column": "n_nationkey"}],
             "columns": [{"name": "s_acctbal", "type": "decimal", "min": -99999, "range_size": 1100000,
                          "special_value": 2, "null_percentage": "0.1"}]}
        ]
    }"#;

    const CHAINS: &str = r#"{
        "q5": [
            {"table_name": "supplier", "chain_index": 0, "nodes": [
                {"type": "filter", "probability": "0.3", "root":
                    {"type": "filter", "operator": "GT", "target": {"kind": "column", "column": "s_acctbal"},
                     "parameters": [{"id": 1}]}},
                {"type": "fk_join", "local_columns": ["s_nationkey"], "ref_table": "nation",
                 "pk_tag": 1, "probability": "0.2", "join_type": "inner"}
            ]},
            {"table_name": "nation", "chain_index": 1, "nodes": [
                {"type": "pk_join", "pk_tag": 1, "pk_columns": ["n_nationkey"]}
            ]}
        ]
    }"#;

    #[test]
    fn test_load_inputs() {
        let dir = tempdir().unwrap();
        let schema = dir.path().join("schema.json");
        let chains = dir.path().join("chains.json");
        fs::write(&schema, SCHEMA).unwrap();
        fs::write(&chains, CHAINS).unwrap();

        let inputs = load_inputs(&schema, &chains).unwrap();
        assert_eq!(inputs.catalog.table_count(), 2);
        assert_eq!(inputs.chains["q5"].len(), 2);
        assert_eq!(inputs.input_hash, compute_input_hash(SCHEMA, CHAINS));
        let supplier = inputs.catalog.table("supplier").unwrap();
        assert_eq!(supplier.column("s_acctbal").unwrap().special_value, 2);
    }

    #[test]
    fn test_unknown_filter_column_rejected() {
        let catalog = parse_schema(SCHEMA, "schema").unwrap();
        let chains = parse_chains(&CHAINS.replace("\"column\": \"s_acctbal\"", "\"column\": \"s_phone\""), "chains").unwrap();
        assert!(matches!(
            validate_chains(&catalog, &chains),
            Err(MirageError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_join_on_undeclared_fk_rejected() {
        let catalog = parse_schema(SCHEMA, "schema").unwrap();
        let chains = parse_chains(&CHAINS.replace("\"ref_table\": \"nation\",\n", "\"ref_table\": \"region\",\n"), "chains").unwrap();
        assert!(matches!(
            validate_chains(&catalog, &chains),
            Err(MirageError::Input { .. })
        ));
    }

    #[test]
    fn test_malformed_json_names_the_file() {
        match parse_chains("{\"q1\": [", "chains.json") {
            Err(MirageError::Input { path, .. }) => assert_eq!(path, "chains.json"),
            other => panic!("expected input error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let result = load_schema(Path::new("/nonexistent/schema.json"));
        assert!(matches!(result, Err(MirageError::Input { .. })));
    }
}
