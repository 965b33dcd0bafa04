use anyhow::{Context, Result};
use comfy_table::{Cell, Table as ComfyTable};

use mirage_core::config::Settings;
use mirage_core::generate::{parameter_values, prepare, PrepareReport};
use mirage_core::input::{load_inputs, Inputs};
use mirage_core::state::{write_parameters, write_state, PreparedState};

use crate::args::{InputArgs, PrepareArgs};

pub async fn run(args: &PrepareArgs) -> Result<()> {
    let mut settings = super::load_settings()?;
    if let Some(seed) = args.seed {
        settings.seed = seed;
    }
    settings.validate()?;

    let (state, report) = prepare_state(&args.input, &settings)?;

    let mut t = ComfyTable::new();
    t.set_header(vec![
        "Table", "Column", "Requests", "Eq buckets", "Segments", "Null ratio", "Range", "Extra",
    ]);
    for column in &report.columns {
        t.add_row(vec![
            Cell::new(&column.table),
            Cell::new(&column.column),
            Cell::new(column.requests),
            Cell::new(column.equal_buckets),
            Cell::new(column.segments),
            Cell::new(column.null_ratio),
            Cell::new(column.range_size),
            Cell::new(column.extra_cardinality),
        ]);
    }
    println!("{}", t);

    eprintln!(
        "\n✓ Prepared {} parameters ({} multivariate filters) → {}",
        report.parameters,
        report.multivariate_filters,
        args.input.state_path().display()
    );
    eprintln!(
        "Parameter values written to {} ({} entries)",
        args.input.params_path().display(),
        state.parameters.len()
    );
    Ok(())
}

/// Load, prepare and persist. Shared with `generate` when the state is
/// missing or stale.
pub fn prepare_state(input: &InputArgs, settings: &Settings) -> Result<(PreparedState, PrepareReport)> {
    let Inputs {
        mut catalog,
        mut chains,
        input_hash,
    } = load_inputs(&input.schema, &input.chains)?;

    let report = prepare(&mut catalog, &mut chains, settings).context("Failed to place filter parameters")?;
    let parameters = parameter_values(&chains);
    let state = PreparedState::new(input_hash, settings, catalog, chains, parameters);

    let state_path = input.state_path();
    write_state(&state, &state_path)
        .with_context(|| format!("Failed to write {}", state_path.display()))?;
    write_parameters(&state.parameters, &input.params_path())?;
    Ok((state, report))
}
