//! Probability push-down: distributes the measured selectivity of a filter
//! tree onto its leaves.
//!
//! Every AND (or OR seen through its negation, `OR(a, b) = NOT AND(NOT a, NOT b)`)
//! picks one representative child that carries the joint probability while
//! its siblings are made certain. Comparisons never select NULL rows, so a
//! certain comparison only covers its column's non-null mass; the
//! representative absorbs that loss for siblings on other columns.

use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::warn;

use crate::chain::filter::{BoolExpr, FilterOperation, LogicOperator};
use crate::chain::operator::CompareOperator;
use crate::error::Result;

/// Lookup of the NULL fraction of the columns a chain's filters touch.
pub trait NullRatios {
    fn null_ratio(&self, column: &str) -> Result<Decimal>;
}

impl NullRatios for HashMap<String, Decimal> {
    fn null_ratio(&self, column: &str) -> Result<Decimal> {
        Ok(self.get(column).copied().unwrap_or(Decimal::ZERO))
    }
}

/// Assign a probability to every leaf of `root` so that the tree as a whole
/// evaluates to TRUE on a `probability` fraction of rows.
pub fn push_down(root: &mut BoolExpr, probability: Decimal, ratios: &dyn NullRatios) -> Result<()> {
    push(root, clamp_unit(probability), false, ratios)
}

fn push(expr: &mut BoolExpr, p: Decimal, negated: bool, ratios: &dyn NullRatios) -> Result<()> {
    match expr {
        BoolExpr::Filter(op) => assign_leaf(op, p, negated, ratios),
        BoolExpr::Logic(node) => {
            let acts_as_and = (node.operator == LogicOperator::And) != negated;
            if acts_as_and {
                push_conjunction(&mut node.children, p, negated, ratios)
            } else {
                node.reversed = true;
                let result =
                    push_conjunction(&mut node.children, Decimal::ONE - p, !negated, ratios);
                node.reversed = false;
                result
            }
        }
    }
}

/// `children`, each under `negated`, must jointly hold on a `p` fraction.
fn push_conjunction(
    children: &mut [BoolExpr],
    p: Decimal,
    negated: bool,
    ratios: &dyn NullRatios,
) -> Result<()> {
    if children.is_empty() {
        return Ok(());
    }
    let rep = choose_representative(children);
    let rep_columns: Vec<String> = children[rep]
        .leaves()
        .iter()
        .flat_map(|leaf| leaf.columns())
        .map(str::to_string)
        .collect();

    let mut factor = Decimal::ONE;
    for (i, child) in children.iter_mut().enumerate() {
        if i == rep {
            continue;
        }
        match child {
            BoolExpr::Filter(op) => {
                factor *= make_certain(op, negated, &rep_columns, ratios)?;
            }
            BoolExpr::Logic(_) => push(child, Decimal::ONE, negated, ratios)?,
        }
    }

    let mut rep_p = p;
    if factor.is_zero() {
        warn!(
            probability = %p,
            "Sibling predicates can never hold together, keeping the joint probability on the representative"
        );
    } else if factor != Decimal::ONE {
        rep_p = p / factor;
        if rep_p > Decimal::ONE {
            warn!(
                probability = %p,
                null_factor = %factor,
                "Null-adjusted probability exceeds 1, clamping"
            );
            rep_p = Decimal::ONE;
        }
    }
    push(&mut children[rep], rep_p, negated, ratios)
}

/// Turn a sibling leaf into a certain condition (under `negated`) and return
/// the fraction of rows on which it actually holds, as seen by the
/// representative.
fn make_certain(
    op: &mut FilterOperation,
    negated: bool,
    rep_columns: &[String],
    ratios: &dyn NullRatios,
) -> Result<Decimal> {
    let same_column = op
        .column()
        .is_some_and(|c| rep_columns.iter().any(|r| r == c));

    if op.operator.is_null_check() {
        let column = op.column().unwrap_or_default().to_string();
        let null = ratios.null_ratio(&column)?;
        let own = if op.operator == CompareOperator::IsNull {
            null
        } else {
            Decimal::ONE - null
        };
        op.set_probability(own);
        let truth = if negated { Decimal::ONE - own } else { own };
        return Ok(if same_column { Decimal::ONE } else { truth });
    }

    if negated {
        op.set_probability(Decimal::ZERO);
        return Ok(Decimal::ONE);
    }

    match op.column().map(str::to_string) {
        Some(column) => {
            let valid = Decimal::ONE - ratios.null_ratio(&column)?;
            op.set_probability(valid);
            Ok(if same_column { Decimal::ONE } else { valid })
        }
        None => {
            op.set_probability(Decimal::ONE);
            Ok(Decimal::ONE)
        }
    }
}

fn assign_leaf(
    op: &mut FilterOperation,
    p: Decimal,
    negated: bool,
    ratios: &dyn NullRatios,
) -> Result<()> {
    let mut own = clamp_unit(if negated { Decimal::ONE - p } else { p });
    if !op.operator.is_null_check() {
        if let Some(column) = op.column() {
            let valid = Decimal::ONE - ratios.null_ratio(column)?;
            if own > valid {
                warn!(
                    column,
                    operator = %op.operator,
                    probability = %own,
                    valid = %valid,
                    parameter_ids = ?op.parameter_ids(),
                    "Predicate probability exceeds the non-null mass of its column, clamping"
                );
                own = valid;
            }
        }
    }
    op.set_probability(own);
    Ok(())
}

fn choose_representative(children: &[BoolExpr]) -> usize {
    let leaf = |f: fn(&FilterOperation) -> bool| {
        children
            .iter()
            .position(|c| matches!(c, BoolExpr::Filter(op) if f(op)))
    };
    leaf(|op| !op.is_multivariate() && op.operator.is_range())
        .or_else(|| children.iter().position(|c| matches!(c, BoolExpr::Logic(_))))
        .or_else(|| leaf(|op| op.is_multivariate()))
        .or_else(|| leaf(|op| op.operator.is_equal()))
        .unwrap_or(0)
}

fn clamp_unit(p: Decimal) -> Decimal {
    p.max(Decimal::ZERO).min(Decimal::ONE)
}
