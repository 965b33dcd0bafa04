use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;

use anyhow::{bail, Context, Result};
use comfy_table::{Cell, Table as ComfyTable};
use indicatif::{ProgressBar, ProgressStyle};

use mirage_core::config::Settings;
use mirage_core::generate::{DataGenerator, TableSummary};
use mirage_core::output::{BatchWriter, WrittenBatch};
use mirage_core::state::{
    compute_input_hash, read_state, write_parameters, PreparedState, PARAMS_FILE_NAME,
};

use crate::args::GenerateArgs;
use crate::commands::prepare::prepare_state;

pub async fn run(args: &GenerateArgs) -> Result<()> {
    let mut settings = super::load_settings()?;
    if let Some(ref dir) = args.output {
        settings.output_dir = dir.clone();
    }
    if let Some(batch_size) = args.batch_size {
        settings.batch_size = batch_size;
    }
    if let Some(seed) = args.seed {
        settings.seed = seed;
    }
    if let Some(threads) = args.threads {
        settings.threads = threads;
    }
    settings.validate()?;

    let state = resolve_state(args, &settings)?;
    let PreparedState {
        catalog,
        chains,
        parameters,
        ..
    } = state;
    let table_count = catalog.table_count();

    fs::create_dir_all(&settings.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            settings.output_dir.display()
        )
    })?;

    let handle = tokio::runtime::Handle::current();
    let run_settings = settings.clone();
    let (summaries, written) = tokio::task::spawn_blocking(
        move || -> Result<(Vec<TableSummary>, Vec<WrittenBatch>)> {
            let output_dir = run_settings.output_dir.clone();
            let mut generator = DataGenerator::new(catalog, chains, run_settings)?;
            let mut writer = BatchWriter::new(handle, output_dir);

            let current: RefCell<Option<(String, ProgressBar)>> = RefCell::new(None);
            let report = |table: &str, done: usize, total: usize| {
                let mut current = current.borrow_mut();
                if current.as_ref().map(|(name, _)| name.as_str()) != Some(table) {
                    if let Some((_, finished)) = current.take() {
                        finished.finish();
                    }
                    *current = Some((table.to_string(), table_bar(table, total)));
                }
                if let Some((_, pb)) = current.as_ref() {
                    pb.set_position(done as u64);
                }
            };
            let summaries = generator.run(&mut writer, Some(&report))?;
            if let Some((_, pb)) = current.into_inner() {
                pb.finish();
            }

            let written = writer.finish()?;
            Ok((summaries, written))
        },
    )
    .await
    .context("Generation task failed")??;

    let params_path = settings.output_dir.join(PARAMS_FILE_NAME);
    write_parameters(&parameters, &params_path)?;

    let mut bytes: HashMap<&str, u64> = HashMap::new();
    for file in &written {
        *bytes.entry(file.table.as_str()).or_default() += file.bytes;
    }

    let mut t = ComfyTable::new();
    t.set_header(vec!["Table", "Rows", "Batches", "Chains", "FK groups", "PK statuses", "Bytes"]);
    for summary in &summaries {
        t.add_row(vec![
            Cell::new(&summary.table),
            Cell::new(summary.rows),
            Cell::new(summary.batches),
            Cell::new(summary.chains),
            Cell::new(summary.fk_groups),
            Cell::new(summary.pk_statuses),
            Cell::new(bytes.get(summary.table.as_str()).copied().unwrap_or(0)),
        ]);
    }
    println!("{}", t);

    let total_rows: usize = summaries.iter().map(|s| s.rows).sum();
    eprintln!(
        "\n✓ Generated {} rows across {} tables ({} files) → {}",
        total_rows,
        table_count,
        written.len(),
        settings.output_dir.display()
    );
    eprintln!("Parameter values written to {}", params_path.display());

    Ok(())
}

/// Reuse the prepared state when it was built from the same inputs and
/// seed, otherwise prepare again.
fn resolve_state(args: &GenerateArgs, settings: &Settings) -> Result<PreparedState> {
    let input = &args.input;
    let state_path = input.state_path();

    if !state_path.exists() {
        if args.from_state {
            bail!(
                "No {} found. Run `mirage prepare` first, or drop --from-state.",
                state_path.display()
            );
        }
        return Ok(prepare_state(input, settings)?.0);
    }

    let state = read_state(&state_path)?;
    if !(input.schema.exists() && input.chains.exists()) {
        if args.from_state {
            return Ok(state);
        }
        bail!(
            "Inputs {} and {} are required without --from-state",
            input.schema.display(),
            input.chains.display()
        );
    }

    let schema_text = fs::read_to_string(&input.schema)
        .with_context(|| format!("Failed to read {}", input.schema.display()))?;
    let chains_text = fs::read_to_string(&input.chains)
        .with_context(|| format!("Failed to read {}", input.chains.display()))?;
    let current_hash = compute_input_hash(&schema_text, &chains_text);
    if state.is_current(&current_hash, settings) {
        tracing::info!(state = %state_path.display(), "Reusing prepared state");
        return Ok(state);
    }

    if args.from_state && !args.force {
        bail!(
            "Inputs, seed or placement settings changed since {} was prepared.\n\
             State hash: {} (seed {})\n\
             Current:    {} (seed {})\n\
             \n\
             Run with --force to prepare again, or run `mirage prepare`.",
            state_path.display(),
            short_hash(&state.input_hash),
            state.seed,
            short_hash(&current_hash),
            settings.seed,
        );
    }
    eprintln!("Inputs changed since {}; preparing again", state_path.display());
    Ok(prepare_state(input, settings)?.0)
}

fn short_hash(hash: &str) -> &str {
    hash.get(..16).unwrap_or(hash)
}

fn table_bar(table: &str, total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.cyan} {prefix:>16} {bar:40.cyan/dim} {pos}/{len} ({eta})")
    {
        pb.set_style(style.progress_chars("█▓░"));
    }
    pb.set_prefix(table.to_string());
    pb
}
