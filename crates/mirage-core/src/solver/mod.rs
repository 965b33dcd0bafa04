//! Integer feasibility solving over bounded variables and linear range
//! constraints.
//!
//! `CpSolver` is the boundary the generator talks to. `SearchSolver` is the
//! shipped implementation: bounds propagation plus depth-first domain
//! bisection, run as a portfolio of rayon workers with different branching
//! orders.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

pub type VarId = usize;

/// `lower <= sum(coef * var) <= upper`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearConstraint {
    pub terms: Vec<(VarId, i64)>,
    pub lower: i64,
    pub upper: i64,
}

#[derive(Debug, Clone, Default)]
pub struct CpModel {
    lower: Vec<i64>,
    upper: Vec<i64>,
    constraints: Vec<LinearConstraint>,
}

impl CpModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_var(&mut self, lower: i64, upper: i64) -> VarId {
        self.lower.push(lower);
        self.upper.push(upper.max(lower));
        self.lower.len() - 1
    }

    pub fn add_linear(&mut self, terms: Vec<(VarId, i64)>, lower: i64, upper: i64) {
        self.constraints.push(LinearConstraint {
            terms,
            lower,
            upper,
        });
    }

    pub fn add_eq(&mut self, terms: Vec<(VarId, i64)>, value: i64) {
        self.add_linear(terms, value, value);
    }

    pub fn add_le(&mut self, terms: Vec<(VarId, i64)>, upper: i64) {
        self.add_linear(terms, i64::MIN, upper);
    }

    pub fn add_ge(&mut self, terms: Vec<(VarId, i64)>, lower: i64) {
        self.add_linear(terms, lower, i64::MAX);
    }

    pub fn var_count(&self) -> usize {
        self.lower.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    /// Whether `values` satisfies every bound and constraint.
    pub fn check(&self, values: &[i64]) -> bool {
        if values.len() != self.var_count() {
            return false;
        }
        let in_bounds = values
            .iter()
            .enumerate()
            .all(|(i, v)| *v >= self.lower[i] && *v <= self.upper[i]);
        in_bounds
            && self.constraints.iter().all(|c| {
                let sum: i128 = c
                    .terms
                    .iter()
                    .map(|&(v, a)| a as i128 * values[v] as i128)
                    .sum();
                sum >= c.lower as i128 && sum <= c.upper as i128
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    Feasible,
    Infeasible,
    Unknown,
}

impl SolveStatus {
    pub fn is_solution(self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::Feasible)
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Optimal => write!(f, "OPTIMAL"),
            SolveStatus::Feasible => write!(f, "FEASIBLE"),
            SolveStatus::Infeasible => write!(f, "INFEASIBLE"),
            SolveStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    /// One value per variable when `status` is a solution, empty otherwise.
    pub values: Vec<i64>,
}

pub trait CpSolver: Send + Sync {
    fn solve(&self, model: &CpModel) -> SolveOutcome;
}

#[derive(Debug, Clone)]
pub struct SearchSolver {
    workers: usize,
    node_limit: u64,
    seed: u64,
}

impl SearchSolver {
    pub fn new(workers: usize, node_limit: u64, seed: u64) -> Self {
        Self {
            workers: workers.max(1),
            node_limit: node_limit.max(1),
            seed,
        }
    }
}

enum Verdict {
    Found(Vec<i64>),
    Exhausted,
    Aborted,
}

impl CpSolver for SearchSolver {
    fn solve(&self, model: &CpModel) -> SolveOutcome {
        let stop = AtomicBool::new(false);
        let verdict = (0..self.workers).into_par_iter().find_map_any(|worker| {
            let rng = (worker > 0).then(|| StdRng::seed_from_u64(self.seed ^ worker as u64));
            let mut search = Search {
                model,
                rng,
                nodes: 0,
                limit: self.node_limit,
                stop: &stop,
            };
            match search.run() {
                Verdict::Aborted => None,
                decided => {
                    stop.store(true, Ordering::Relaxed);
                    debug!(worker, nodes = search.nodes, "Search finished");
                    Some(decided)
                }
            }
        });
        match verdict {
            Some(Verdict::Found(values)) => SolveOutcome {
                status: SolveStatus::Feasible,
                values,
            },
            Some(Verdict::Exhausted) => SolveOutcome {
                status: SolveStatus::Infeasible,
                values: Vec::new(),
            },
            Some(Verdict::Aborted) | None => SolveOutcome {
                status: SolveStatus::Unknown,
                values: Vec::new(),
            },
        }
    }
}

struct Search<'a> {
    model: &'a CpModel,
    /// `None` branches lower half first.
    rng: Option<StdRng>,
    nodes: u64,
    limit: u64,
    stop: &'a AtomicBool,
}

impl Search<'_> {
    fn run(&mut self) -> Verdict {
        let mut stack = vec![(self.model.lower.clone(), self.model.upper.clone())];
        while let Some((mut lo, mut hi)) = stack.pop() {
            if self.stop.load(Ordering::Relaxed) || self.nodes >= self.limit {
                return Verdict::Aborted;
            }
            self.nodes += 1;
            if !propagate(self.model, &mut lo, &mut hi) {
                continue;
            }
            let Some(var) = pick_var(&lo, &hi) else {
                return Verdict::Found(lo);
            };
            let mid = lo[var] + (hi[var] - lo[var]) / 2;
            let mut left = (lo.clone(), hi.clone());
            left.1[var] = mid;
            let mut right = (lo, hi);
            right.0[var] = mid + 1;
            let lower_first = self.rng.as_mut().map_or(true, |r| r.random_bool(0.5));
            if lower_first {
                stack.push(right);
                stack.push(left);
            } else {
                stack.push(left);
                stack.push(right);
            }
        }
        Verdict::Exhausted
    }
}

/// Unfixed variable with the smallest domain.
fn pick_var(lo: &[i64], hi: &[i64]) -> Option<VarId> {
    (0..lo.len())
        .filter(|&i| lo[i] < hi[i])
        .min_by_key(|&i| hi[i] - lo[i])
}

/// Tighten bounds to a fixpoint; false on a wiped-out domain.
fn propagate(model: &CpModel, lo: &mut [i64], hi: &mut [i64]) -> bool {
    loop {
        let mut changed = false;
        for c in &model.constraints {
            let mut min_sum: i128 = 0;
            let mut max_sum: i128 = 0;
            for &(v, a) in &c.terms {
                let (a, l, h) = (a as i128, lo[v] as i128, hi[v] as i128);
                if a >= 0 {
                    min_sum += a * l;
                    max_sum += a * h;
                } else {
                    min_sum += a * h;
                    max_sum += a * l;
                }
            }
            let (lower, upper) = (c.lower as i128, c.upper as i128);
            if min_sum > upper || max_sum < lower {
                return false;
            }
            for &(v, a) in &c.terms {
                if a == 0 {
                    continue;
                }
                let (a, l, h) = (a as i128, lo[v] as i128, hi[v] as i128);
                let (own_min, own_max) = if a > 0 { (a * l, a * h) } else { (a * h, a * l) };
                // lower - rest_max <= a * x <= upper - rest_min
                let from = lower.saturating_sub(max_sum - own_max);
                let to = upper.saturating_sub(min_sum - own_min);
                let (new_lo, new_hi) = if a > 0 {
                    (div_ceil(from, a), div_floor(to, a))
                } else {
                    (div_ceil(to, a), div_floor(from, a))
                };
                if new_lo > l {
                    lo[v] = clamp_i64(new_lo);
                    changed = true;
                }
                if new_hi < h {
                    hi[v] = clamp_i64(new_hi);
                    changed = true;
                }
                if lo[v] > hi[v] {
                    return false;
                }
            }
        }
        if !changed {
            return true;
        }
    }
}

fn div_floor(a: i128, b: i128) -> i128 {
    let q = a / b;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

fn div_ceil(a: i128, b: i128) -> i128 {
    let q = a / b;
    if (a % b != 0) && ((a < 0) == (b < 0)) {
        q + 1
    } else {
        q
    }
}

fn clamp_i64(v: i128) -> i64 {
    v.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}
