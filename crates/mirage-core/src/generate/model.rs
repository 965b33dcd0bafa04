//! Per-batch integer model deciding how many rows of each filter status go
//! to each joint primary-key status.

use std::collections::HashMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::SolverSettings;
use crate::error::{MirageError, Result};
use crate::join::status::JoinStatus;
use crate::solver::{CpModel, CpSolver, VarId};

/// A (filter status, joint primary-key status) cell.
pub type Cell = (usize, usize);

/// Solved row counts, and distinct key counts of NDV-constrained columns.
#[derive(Debug, Clone, Default)]
pub struct CpSolution {
    /// `counts[status][joint]`
    pub counts: Vec<Vec<i64>>,
    /// `distinct[column][status][joint]`
    pub distinct: HashMap<usize, Vec<Vec<i64>>>,
}

/// Builds the join model of one batch of one FK group.
///
/// Every constraint is posted into two models. The relaxed model uses the
/// relative tolerance and the skew factor. The target model additionally
/// holds join counts within the absolute tolerance of their target and
/// distinct counts within one key of the NDV ratio, so any of its solutions
/// also solves the relaxed one. `solve` tries the target model first. Both
/// models declare variables in the same order, so variable ids are shared.
pub struct ConstructCpModel {
    /// Table being generated, for error reports.
    table: String,
    /// Batch number, for error reports.
    batch: usize,
    target: CpModel,
    relaxed: CpModel,
    /// Rows per filter status.
    row_counts: Vec<i64>,
    /// `x[status][joint]`: rows of a status sent to a joint key status.
    x: Vec<Vec<VarId>>,
    /// `d[column][status][joint]`: distinct keys drawn by those rows.
    d: HashMap<usize, Vec<Vec<VarId>>>,
    relative_tolerance: Decimal,
    absolute_tolerance: i64,
    skew_factor: i64,
}

impl ConstructCpModel {
    pub fn new(table: impl Into<String>, batch: usize, settings: &SolverSettings) -> Self {
        Self {
            table: table.into(),
            batch,
            target: CpModel::new(),
            relaxed: CpModel::new(),
            row_counts: Vec::new(),
            x: Vec::new(),
            d: HashMap::new(),
            relative_tolerance: settings.relative_tolerance,
            absolute_tolerance: settings.absolute_tolerance,
            skew_factor: settings.skew_factor.max(1),
        }
    }

    fn new_var(&mut self, lower: i64, upper: i64) -> VarId {
        self.target.new_var(lower, upper);
        self.relaxed.new_var(lower, upper)
    }

    /// One variable per cell; each filter status row sums to its observed
    /// count.
    pub fn init_model(
        &mut self,
        histogram: &[(JoinStatus, i64)],
        joint_count: usize,
        range_upper_bound: i64,
    ) {
        self.row_counts = histogram.iter().map(|(_, count)| *count).collect();
        self.x.clear();
        for (_, count) in histogram {
            let upper = (*count).min(range_upper_bound);
            let vars: Vec<VarId> = (0..joint_count).map(|_| self.new_var(0, upper)).collect();
            let terms: Vec<(VarId, i64)> = vars.iter().map(|&v| (v, 1)).collect();
            self.target.add_eq(terms.clone(), *count);
            self.relaxed.add_eq(terms, *count);
            self.x.push(vars);
        }
    }

    /// Distinct-key variables for FK column `column`, tracking
    /// `ndv / table_size`.
    pub fn init_distinct_model(&mut self, column: usize, ndv: i64, table_size: i64) {
        let size = table_size.max(1);
        let skew = self.skew_factor;
        let mut vars = Vec::with_capacity(self.x.len());
        for s in 0..self.x.len() {
            let mut row_vars = Vec::with_capacity(self.x[s].len());
            for j in 0..self.x[s].len() {
                let x = self.x[s][j];
                let d = self.new_var(0, self.row_counts[s]);
                for model in [&mut self.target, &mut self.relaxed] {
                    // d <= x
                    model.add_le(vec![(d, 1), (x, -1)], 0);
                    // d * size * skew >= x * ndv
                    model.add_ge(vec![(d, size * skew), (x, -ndv)], 0);
                    // d * size <= x * ndv * skew + size
                    model.add_le(vec![(d, size), (x, -ndv * skew)], size);
                }
                // |d * size - x * ndv| <= size
                self.target.add_linear(vec![(d, size), (x, -ndv)], -size, size);
                row_vars.push(d);
            }
            vars.push(row_vars);
        }
        self.d.insert(column, vars);
    }

    pub fn tolerance(&self, target: i64) -> i64 {
        let relative = (self.relative_tolerance * Decimal::from(target))
            .ceil()
            .to_i64()
            .unwrap_or(0);
        self.absolute_tolerance.max(relative)
    }

    /// The rows of `cells` must add up to `target`, within the absolute
    /// tolerance if possible and within `tolerance(target)` otherwise.
    pub fn add_join_cardinality_constraint(&mut self, cells: &[Cell], target: i64) {
        let terms: Vec<(VarId, i64)> = cells.iter().map(|&(s, j)| (self.x[s][j], 1)).collect();
        let exact = self.absolute_tolerance.max(0);
        self.target
            .add_linear(terms.clone(), (target - exact).max(0), target + exact);
        let tolerance = self.tolerance(target);
        self.relaxed
            .add_linear(terms, (target - tolerance).max(0), target + tolerance);
    }

    /// Columns drawing distinct keys from the same status range cannot use
    /// more keys than the range holds.
    pub fn apply_fk_share_constraint(&mut self, cells: &[(usize, Cell)], range_size: i64) {
        let terms: Vec<(VarId, i64)> = cells
            .iter()
            .filter_map(|&(column, (s, j))| self.d.get(&column).map(|d| (d[s][j], 1)))
            .collect();
        if !terms.is_empty() {
            self.target.add_le(terms.clone(), range_size);
            self.relaxed.add_le(terms, range_size);
        }
    }

    pub fn solve(&self, solver: &dyn CpSolver) -> Result<CpSolution> {
        debug!(
            table = %self.table,
            batch = self.batch,
            variables = self.relaxed.var_count(),
            constraints = self.relaxed.constraint_count(),
            "Solving join model"
        );
        let mut outcome = solver.solve(&self.target);
        if !outcome.status.is_solution() {
            debug!(
                table = %self.table,
                batch = self.batch,
                status = %outcome.status,
                "Targets not met exactly, widening to tolerance"
            );
            outcome = solver.solve(&self.relaxed);
        }
        if !outcome.status.is_solution() {
            return Err(MirageError::InfeasibleJoinModel {
                table: self.table.clone(),
                batch: self.batch,
                status: outcome.status.to_string(),
            });
        }
        let value = |v: VarId| outcome.values.get(v).copied().unwrap_or(0);
        let grid = |vars: &Vec<Vec<VarId>>| -> Vec<Vec<i64>> {
            vars.iter()
                .map(|row| row.iter().map(|&v| value(v)).collect())
                .collect()
        };
        Ok(CpSolution {
            counts: grid(&self.x),
            distinct: self.d.iter().map(|(c, vars)| (*c, grid(vars))).collect(),
        })
    }

    /// The model with tolerance and skew windows.
    pub fn model(&self) -> &CpModel {
        &self.relaxed
    }

    /// The model with windows tightened around each target.
    pub fn target_model(&self) -> &CpModel {
        &self.target
    }
}
