use anyhow::{Context, Result};

use mirage_core::graph::{generation_order, visualize, DependencyGraph, GraphFormat as VizFormat};
use mirage_core::input::load_schema;

use crate::args::GraphArgs;

pub async fn run(args: &GraphArgs) -> Result<()> {
    let catalog = load_schema(&args.schema)
        .with_context(|| format!("Failed to load {}", args.schema.display()))?;
    let graph = DependencyGraph::from_catalog(&catalog);

    if let Err(err) = generation_order(&graph) {
        eprintln!("Warning: {}", err);
    }

    let format = match args.format {
        crate::args::GraphFormat::Mermaid => VizFormat::Mermaid,
        crate::args::GraphFormat::Dot => VizFormat::Dot,
    };
    println!("{}", visualize(&graph, &catalog, format));

    Ok(())
}
