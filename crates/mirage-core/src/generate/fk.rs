//! Foreign-key population for one dependency group of FK columns.
//!
//! Each row of a batch carries one alive bit per chain. The generator
//! reduces those bits to the chains touching the group, counts rows per
//! distinct bit vector, and asks the join model how many rows of each
//! count go to each joint key status: one merged rule-table status per
//! column. Keys are then drawn from the matching id ranges, and the alive
//! bits narrowed by the joins' outcomes.

use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::chain::{ConstraintChain, JoinType};
use crate::config::SolverSettings;
use crate::error::{MirageError, Result};
use crate::generate::model::{Cell, ConstructCpModel};
use crate::join::{FkRange, JoinStatus, MergedRuleTable, RuleTableManager};
use crate::schema::Table;
use crate::solver::CpSolver;

/// One FK column of the group and the rule-table view it draws keys from.
#[derive(Debug, Clone)]
pub struct FkColumnPlan {
    pub column: String,
    /// Referenced primary-key table.
    pub ref_table: String,
    /// PkJoin tags this column joins on, sorted.
    pub tags: Vec<u32>,
    /// Distinct referenced keys over the whole table, when constrained.
    pub ndv: Option<i64>,
    /// The referenced rule table projected onto `tags`.
    merged: MergedRuleTable,
}

/// One FK join of a chain.
#[derive(Debug, Clone)]
struct JoinStep {
    /// Column of the group the join runs on.
    slot: usize,
    /// Position of the join's tag in that column's merged statuses.
    bit: usize,
    join_type: JoinType,
    /// Share of the rows reaching this join that produce its counted outcome.
    probability: Decimal,
}

/// The joins of one chain that fall in this group, in chain order.
#[derive(Debug, Clone)]
struct ChainJoins {
    chain: usize,
    steps: Vec<JoinStep>,
    /// Set when the chain's first FK join is in this group.
    fail_filter: Option<Decimal>,
}

type CursorKey = (String, Vec<u32>, JoinStatus);

/// Populates the FK columns of one dependency group, batch after batch.
pub struct FkGenerator {
    table: String,
    /// Rows of the whole table, for NDV ratios.
    table_size: i64,
    columns: Vec<FkColumnPlan>,
    /// Chains with at least one join in this group.
    chains: Vec<ChainJoins>,
    /// Every combination of per-column projected statuses.
    joints: Vec<Vec<JoinStatus>>,
    /// Next ordinal to hand out per merged status range, shared by columns
    /// reading the same view and carried across batches.
    cursors: HashMap<CursorKey, i64>,
    settings: SolverSettings,
}

impl FkGenerator {
    /// `chains` are all chains of `table`, in the order their statuses are
    /// laid out per row.
    pub fn new(
        table: &Table,
        columns: &[String],
        chains: &[&ConstraintChain],
        rules: &RuleTableManager,
        settings: &SolverSettings,
    ) -> Result<Self> {
        let mut plans = Vec::with_capacity(columns.len());
        for column in columns {
            let fk = table
                .foreign_key(column)
                .ok_or_else(|| MirageError::UnknownColumn {
                    column: format!("{}.{}", table.name, column),
                })?;
            let rule = rules
                .get(&fk.ref_table)
                .ok_or_else(|| MirageError::ForeignKeyResolution {
                    table: table.name.clone(),
                    column: column.clone(),
                    ref_table: fk.ref_table.clone(),
                })?;

            let mut tags = Vec::new();
            for join in chains.iter().flat_map(|c| c.fk_joins()) {
                if join.column() != column {
                    continue;
                }
                if join.ref_table != fk.ref_table {
                    return Err(MirageError::Input {
                        path: format!("chains of {}", table.name),
                        message: format!(
                            "join on {} targets {}, but the foreign key references {}",
                            column, join.ref_table, fk.ref_table
                        ),
                    });
                }
                tags.push(join.pk_tag);
            }
            tags.sort_unstable();
            tags.dedup();

            let merged = rule.merge(&tags)?;
            if merged.statuses().next().is_none() {
                return Err(MirageError::Other(format!(
                    "{}.{} references {}, which has no generated keys",
                    table.name, column, fk.ref_table
                )));
            }
            let ndv = fk
                .ndv
                .or_else(|| chains.iter().find_map(|c| c.ndv_hint(column, table.size)))
                .filter(|&n| n > 0);
            plans.push(FkColumnPlan {
                column: column.clone(),
                ref_table: fk.ref_table.clone(),
                tags,
                ndv,
                merged,
            });
        }

        let mut chain_joins = Vec::new();
        for (index, chain) in chains.iter().enumerate() {
            let mut steps = Vec::new();
            let mut fail_filter = None;
            for (position, join) in chain.fk_joins().enumerate() {
                let Some(slot) = plans.iter().position(|p| p.column == join.column()) else {
                    continue;
                };
                let bit = plans[slot]
                    .merged
                    .tag_position(join.pk_tag)
                    .unwrap_or_default();
                if position == 0 {
                    fail_filter = join.probability_with_fail_filter;
                }
                steps.push(JoinStep {
                    slot,
                    bit,
                    join_type: join.join_type,
                    probability: join.probability,
                });
            }
            if !steps.is_empty() {
                chain_joins.push(ChainJoins {
                    chain: index,
                    steps,
                    fail_filter,
                });
            }
        }

        let mut joints: Vec<Vec<JoinStatus>> = vec![Vec::new()];
        for plan in &plans {
            let statuses: Vec<JoinStatus> = plan.merged.statuses().cloned().collect();
            joints = joints
                .into_iter()
                .flat_map(|prefix| {
                    statuses.iter().map(move |s| {
                        let mut joint = prefix.clone();
                        joint.push(s.clone());
                        joint
                    })
                })
                .collect();
        }

        Ok(Self {
            table: table.name.clone(),
            table_size: table.size,
            columns: plans,
            chains: chain_joins,
            joints,
            cursors: HashMap::new(),
            settings: settings.clone(),
        })
    }

    /// Columns of the group, in the order `generate` returns their keys.
    pub fn columns(&self) -> &[FkColumnPlan] {
        &self.columns
    }

    /// Combinations of per-column key statuses the model distributes
    /// rows over.
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Whether keys of `joint` match the PK side of `step`.
    fn matched(&self, step: &JoinStep, joint: usize) -> bool {
        self.joints[joint][step.slot].bit(step.bit)
    }

    fn survives_all(&self, steps: &[JoinStep], joint: usize) -> bool {
        steps
            .iter()
            .all(|s| s.join_type.survives(self.matched(s, joint)))
    }

    /// Populate the group's FK columns for one batch.
    ///
    /// `statuses[row][chain]` says whether the row is still alive in each
    /// chain; it is narrowed in place by the outcome of this group's joins.
    /// Returns one value vector per column, in `columns()` order.
    pub fn generate(
        &mut self,
        statuses: &mut [Vec<bool>],
        batch: usize,
        seed: u64,
        solver: &dyn CpSolver,
    ) -> Result<Vec<Vec<i64>>> {
        let rows = statuses.len();
        let keys: Vec<JoinStatus> = statuses
            .iter()
            .map(|row| JoinStatus::new(self.chains.iter().map(|c| row[c.chain]).collect()))
            .collect();
        let mut histogram: BTreeMap<JoinStatus, i64> = BTreeMap::new();
        for key in &keys {
            *histogram.entry(key.clone()).or_default() += 1;
        }
        let histogram: Vec<(JoinStatus, i64)> = histogram.into_iter().collect();
        let position: HashMap<&JoinStatus, usize> = histogram
            .iter()
            .enumerate()
            .map(|(i, (s, _))| (s, i))
            .collect();

        let mut model = ConstructCpModel::new(&self.table, batch, &self.settings);
        model.init_model(&histogram, self.joints.len(), rows as i64);
        self.add_join_constraints(&mut model, &histogram);
        self.add_distinct_constraints(&mut model, histogram.len());
        let solution = model.solve(solver)?;

        let mut remaining = solution.counts.clone();
        let mut row_cells = Vec::with_capacity(rows);
        for key in &keys {
            let s = position[key];
            let j = remaining[s].iter().position(|&c| c > 0).ok_or_else(|| {
                MirageError::Other(format!(
                    "join model of {} batch {} left status {} without rows",
                    self.table, batch, key
                ))
            })?;
            let ordinal = solution.counts[s][j] - remaining[s][j];
            remaining[s][j] -= 1;
            row_cells.push((s, j, ordinal));
        }

        let windows = self.reserve_windows(&solution.counts, &solution.distinct);

        let values = self
            .columns
            .par_iter()
            .enumerate()
            .map(|(slot, plan)| {
                let mut rng = StdRng::seed_from_u64(seed ^ ((slot as u64 + 1) << 32));
                row_cells
                    .iter()
                    .map(|&(s, j, ordinal)| -> Result<i64> {
                        let status = &self.joints[j][slot];
                        let range = plan.merged.range(status).ok_or_else(|| {
                            MirageError::Other(format!(
                                "no keys of {} carry status {}",
                                plan.ref_table, status
                            ))
                        })?;
                        Ok(match windows.get(&(slot, s, j)) {
                            Some(window) => window.key(range, ordinal),
                            None => range.random(&mut rng),
                        })
                    })
                    .collect::<Result<Vec<i64>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        for chain in &self.chains {
            for (row, &(_, j, _)) in row_cells.iter().enumerate() {
                let alive = &mut statuses[row][chain.chain];
                *alive = *alive && self.survives_all(&chain.steps, j);
            }
        }

        debug!(
            table = %self.table,
            batch,
            columns = self.columns.len(),
            statuses = histogram.len(),
            joints = self.joints.len(),
            "Foreign keys populated"
        );
        Ok(values)
    }

    /// One cardinality window per join step, each over the rows that reach
    /// it, plus the matched share of filter-failing rows where requested.
    fn add_join_constraints(&self, model: &mut ConstructCpModel, histogram: &[(JoinStatus, i64)]) {
        for (k, chain) in self.chains.iter().enumerate() {
            let reaching: i64 = histogram
                .iter()
                .filter(|(s, _)| s.bit(k))
                .map(|(_, c)| c)
                .sum();
            let mut expected = reaching;
            for (m, step) in chain.steps.iter().enumerate() {
                let target = scale(expected, step.probability);
                let cells: Vec<Cell> = self
                    .cells(histogram, move |s| s.bit(k))
                    .filter(|&(_, j)| {
                        self.survives_all(&chain.steps[..m], j)
                            && self.matched(step, j) == step.join_type.counted_outcome()
                    })
                    .collect();
                model.add_join_cardinality_constraint(&cells, target);
                if step.join_type != JoinType::Outer {
                    expected = target;
                }
            }

            if let (Some(p), Some(first)) = (chain.fail_filter, chain.steps.first()) {
                let failed: i64 = histogram
                    .iter()
                    .filter(|(s, _)| !s.bit(k))
                    .map(|(_, c)| c)
                    .sum();
                let cells: Vec<Cell> = self
                    .cells(histogram, move |s| !s.bit(k))
                    .filter(|&(_, j)| self.matched(first, j))
                    .collect();
                model.add_join_cardinality_constraint(&cells, scale(failed, p));
            }
        }
    }

    /// NDV tracking for columns that have one, and a shared capacity cap
    /// per referenced status range.
    fn add_distinct_constraints(&self, model: &mut ConstructCpModel, status_count: usize) {
        let mut views: BTreeMap<(&str, &[u32]), Vec<usize>> = BTreeMap::new();
        for (slot, plan) in self.columns.iter().enumerate() {
            if let Some(ndv) = plan.ndv {
                model.init_distinct_model(slot, ndv, self.table_size);
                views
                    .entry((plan.ref_table.as_str(), plan.tags.as_slice()))
                    .or_default()
                    .push(slot);
            }
        }
        for slots in views.values() {
            let merged = &self.columns[slots[0]].merged;
            for status in merged.statuses() {
                let mut cells = Vec::new();
                for &slot in slots {
                    for j in (0..self.joints.len()).filter(|&j| &self.joints[j][slot] == status) {
                        cells.extend((0..status_count).map(|s| (slot, (s, j))));
                    }
                }
                let capacity = merged.range(status).map(|r| r.total()).unwrap_or(0);
                model.apply_fk_share_constraint(&cells, capacity);
            }
        }
    }

    /// Cells whose filter status satisfies `keep`.
    fn cells<'a>(
        &'a self,
        histogram: &'a [(JoinStatus, i64)],
        keep: impl Fn(&JoinStatus) -> bool + 'a,
    ) -> impl Iterator<Item = Cell> + 'a {
        histogram
            .iter()
            .enumerate()
            .filter(move |(_, (s, _))| keep(s))
            .flat_map(move |(i, _)| (0..self.joints.len()).map(move |j| (i, j)))
    }

    /// Reserve a window of distinct keys per constrained cell, advancing the
    /// shared cursors.
    fn reserve_windows(
        &mut self,
        counts: &[Vec<i64>],
        distinct: &HashMap<usize, Vec<Vec<i64>>>,
    ) -> HashMap<(usize, usize, usize), FkRange> {
        let mut windows = HashMap::new();
        for (slot, plan) in self.columns.iter().enumerate() {
            let Some(grid) = distinct.get(&slot) else {
                continue;
            };
            for (s, row) in grid.iter().enumerate() {
                for (j, &d) in row.iter().enumerate() {
                    if d <= 0 || counts[s][j] == 0 {
                        continue;
                    }
                    let status = &self.joints[j][slot];
                    let total = plan.merged.range(status).map(|r| r.total()).unwrap_or(0);
                    let cursor = self
                        .cursors
                        .entry((plan.ref_table.clone(), plan.tags.clone(), status.clone()))
                        .or_insert(0);
                    windows.insert(
                        (slot, s, j),
                        FkRange {
                            start: *cursor,
                            range: d,
                            total_range: total,
                        },
                    );
                    *cursor = (*cursor + d) % total.max(1);
                }
            }
        }
        windows
    }
}

/// `rows * probability`, rounded.
fn scale(rows: i64, probability: Decimal) -> i64 {
    (Decimal::from(rows) * probability)
        .round()
        .to_i64()
        .unwrap_or(0)
}
