//! The generation run: tables in dependency order, batch by batch.
//!
//! Per batch the order is fixed: attribute buckets, filter evaluation, FK
//! groups (each narrowing the chain statuses), unconstrained FKs, primary-key
//! statuses and ids, then rendering. A table's rule table is only published
//! once all of its batches are done, so referencing tables always see the
//! complete key space.

use std::collections::{BTreeMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chain::{chains_for_table, QueryChains};
use crate::config::Settings;
use crate::error::{MirageError, Result};
use crate::generate::batch::BatchData;
use crate::generate::fk::FkGenerator;
use crate::graph::{fk_groups, generation_order, DependencyGraph};
use crate::join::{JoinStatus, RuleTable, RuleTableManager};
use crate::output::{format_row, BatchWriter};
use crate::schema::Catalog;
use crate::solver::{CpSolver, SearchSolver};

/// What was produced for one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub table: String,
    /// Rows written, equal to the table size.
    pub rows: usize,
    /// Batch files submitted to the writer.
    pub batches: usize,
    /// Constraint chains evaluated on this table.
    pub chains: usize,
    /// FK dependency groups, each solved by its own join model per batch.
    pub fk_groups: usize,
    /// Distinct primary-key join statuses in the table's rule table.
    pub pk_statuses: usize,
}

/// Drives a whole generation run over a prepared catalog.
pub struct DataGenerator {
    /// Prepared catalog; distributions carry rounding state across batches.
    catalog: Catalog,
    chains: QueryChains,
    settings: Settings,
    /// Solves the per-batch join models.
    solver: Box<dyn CpSolver>,
    /// Rule tables of the tables generated so far.
    rules: RuleTableManager,
    /// Runs row evaluation, FK population and rendering.
    pool: rayon::ThreadPool,
}

impl DataGenerator {
    /// `catalog` and `chains` must come out of the prepare phase.
    pub fn new(catalog: Catalog, chains: QueryChains, settings: Settings) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.pool_threads())
            .thread_name(|i| format!("mirage-worker-{}", i))
            .build()
            .map_err(|e| MirageError::Other(format!("failed to start worker pool: {}", e)))?;
        let solver = SearchSolver::new(
            settings.solver_workers(),
            settings.solver.node_limit,
            settings.seed,
        );
        Ok(Self {
            catalog,
            chains,
            settings,
            solver: Box::new(solver),
            rules: RuleTableManager::new(),
            pool,
        })
    }

    /// Replace the default search solver.
    pub fn with_solver(mut self, solver: Box<dyn CpSolver>) -> Self {
        self.solver = solver;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Rule tables published so far; complete after `run`.
    pub fn rules(&self) -> &RuleTableManager {
        &self.rules
    }

    /// Generate every table, handing each finished batch to `writer`.
    ///
    /// The progress callback receives `(table, rows_done, table_rows)`.
    /// Fails on a dependency cycle, an unresolvable foreign key, or a join
    /// model the solver cannot satisfy; batches submitted before the failure
    /// stay queued on the writer.
    pub fn run(
        &mut self,
        writer: &mut BatchWriter,
        progress: Option<&dyn Fn(&str, usize, usize)>,
    ) -> Result<Vec<TableSummary>> {
        let order = generation_order(&DependencyGraph::from_catalog(&self.catalog))?;
        info!(tables = order.len(), "Generation order resolved");
        let mut summaries = Vec::with_capacity(order.len());
        for (index, name) in order.iter().enumerate() {
            summaries.push(self.generate_table(index, name, writer, progress)?);
        }
        Ok(summaries)
    }

    /// Generate one table and publish its rule table.
    fn generate_table(
        &mut self,
        table_index: usize,
        name: &str,
        writer: &mut BatchWriter,
        progress: Option<&dyn Fn(&str, usize, usize)>,
    ) -> Result<TableSummary> {
        let Self {
            catalog,
            chains,
            settings,
            solver,
            rules,
            pool,
        } = self;

        let table_chains = chains_for_table(chains, name);
        let snapshot = catalog.table(name)?;
        let size = snapshot.size.max(0) as usize;
        let primary_key = snapshot.primary_key.is_some();
        let fk_columns: Vec<String> = snapshot.foreign_keys.iter().map(|f| f.column.clone()).collect();

        let mut pk_tags: Vec<u32> = table_chains.iter().flat_map(|c| c.pk_tags()).collect();
        pk_tags.sort_unstable();
        pk_tags.dedup();

        let groups = fk_groups(&table_chains);
        let mut generators = groups
            .iter()
            .map(|group| FkGenerator::new(snapshot, group, &table_chains, rules, &settings.solver))
            .collect::<Result<Vec<_>>>()?;

        // FK columns no chain joins on draw uniformly from the whole key space
        let joined: HashSet<&str> = groups.iter().flatten().map(String::as_str).collect();
        let mut free_keys = Vec::new();
        for fk in snapshot.foreign_keys.iter().filter(|f| !joined.contains(f.column.as_str())) {
            let ref_size = catalog.table(&fk.ref_table)?.size;
            if ref_size <= 0 || rules.get(&fk.ref_table).is_none() {
                return Err(MirageError::ForeignKeyResolution {
                    table: name.to_string(),
                    column: fk.column.clone(),
                    ref_table: fk.ref_table.clone(),
                });
            }
            free_keys.push((fk.column.clone(), ref_size));
        }

        info!(
            table = name,
            rows = size,
            chains = table_chains.len(),
            fk_groups = generators.len(),
            pk_tags = pk_tags.len(),
            "Generating table"
        );

        let mut rule = RuleTable::new(name, pk_tags.clone());
        let batch_size = settings.batch_size.max(1);
        let batches = size.div_ceil(batch_size);
        for batch in 0..batches {
            let start = batch * batch_size;
            let rows = batch_size.min(size - start);
            let mut rng = StdRng::seed_from_u64(batch_seed(settings.seed, table_index, batch));

            // Attribute buckets first: filters only read these
            let mut attributes = Vec::new();
            for column in &mut catalog.table_mut(name)?.columns {
                let values = column.distribution_mut()?.prepare_tuple_data(rows, &mut rng)?;
                attributes.push((column.name.clone(), values));
            }

            let table = catalog.table(name)?;
            let mut data = BatchData::new(table, rules, rows);
            for (column, values) in attributes {
                data.set_attribute(&column, values);
            }

            // statuses[row][chain]: still alive after the filters
            let mut statuses = pool.install(|| data.filter_statuses(&table_chains));
            for generator in &mut generators {
                let seed = rng.random::<u64>();
                let keys = pool.install(|| {
                    generator.generate(&mut statuses, batch, seed, &**solver)
                })?;
                for (plan, values) in generator.columns().iter().zip(keys) {
                    data.set_foreign_key(&plan.column, values);
                }
            }
            for (column, ref_size) in &free_keys {
                let keys = (0..rows).map(|_| rng.random_range(0..*ref_size)).collect();
                data.set_foreign_key(column, keys);
            }

            // Rows sharing a status get one contiguous id range
            let pk_statuses = if pk_tags.is_empty() {
                vec![JoinStatus::empty(); rows]
            } else {
                pool.install(|| data.pk_statuses(&table_chains, &pk_tags))
            };
            let mut by_status: BTreeMap<&JoinStatus, Vec<usize>> = BTreeMap::new();
            for (row, status) in pk_statuses.iter().enumerate() {
                by_status.entry(status).or_default().push(row);
            }
            let mut ids = vec![0i64; rows];
            for (status, members) in by_status {
                let range = rule.add_rule(status.clone(), members.len() as i64)?;
                for (id, row) in range.zip(members) {
                    ids[row] = id;
                }
            }

            let delimiter = settings.delimiter.as_str();
            let lines: Vec<String> = pool.install(|| {
                (0..rows)
                    .into_par_iter()
                    .map(|row| {
                        let mut fields = Vec::with_capacity(1 + fk_columns.len() + table.columns.len());
                        if primary_key {
                            fields.push(Some(ids[row].to_string()));
                        }
                        for column in &fk_columns {
                            fields.push(data.foreign_key(column).map(|keys| keys[row].to_string()));
                        }
                        for column in &table.columns {
                            fields.push(
                                data.attribute(&column.name)
                                    .and_then(|indexes| column.render(indexes[row])),
                            );
                        }
                        format_row(&fields, delimiter)
                    })
                    .collect()
            });
            writer.submit(name, batch, lines);

            debug!(table = name, batch, rows, "Batch generated");
            if let Some(report) = progress {
                report(name, start + rows, size);
            }
        }

        if !rule.is_complete() {
            warn!(table = name, size, "Primary-key ranges do not cover the table");
        }
        let summary = TableSummary {
            table: name.to_string(),
            rows: size,
            batches,
            chains: table_chains.len(),
            fk_groups: generators.len(),
            pk_statuses: rule.rules().len(),
        };
        rules.insert(rule);
        Ok(summary)
    }
}

/// Independent seed per table and batch.
fn batch_seed(base: u64, table: usize, batch: usize) -> u64 {
    base ^ (table as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (batch as u64 + 1).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
}
