use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::chain::filter::{BatchView, BoolExpr};
use crate::error::{MirageError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Inner,
    Outer,
    Semi,
    Anti,
    AntiSemi,
}

impl JoinType {
    /// Whether a referencing row stays in the result, given whether its key
    /// matched a primary-key row that reached the join.
    pub fn survives(self, matched: bool) -> bool {
        match self {
            JoinType::Inner | JoinType::Semi => matched,
            JoinType::Anti | JoinType::AntiSemi => !matched,
            JoinType::Outer => true,
        }
    }

    /// The outcome the join's probability measures: matched rows for
    /// inner, semi and outer joins, unmatched rows for anti joins.
    pub fn counted_outcome(self) -> bool {
        !matches!(self, JoinType::Anti | JoinType::AntiSemi)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterNode {
    pub probability: Decimal,
    pub root: BoolExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PkJoinNode {
    pub pk_tag: u32,
    #[serde(default)]
    pub pk_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FkJoinNode {
    pub local_columns: Vec<String>,
    pub ref_table: String,
    #[serde(default)]
    pub ref_columns: Vec<String>,
    pub pk_tag: u32,
    pub probability: Decimal,
    /// Distinct referenced keys as a fraction of the referencing table.
    #[serde(default)]
    pub distinct_probability: Option<Decimal>,
    pub join_type: JoinType,
    /// Matched share among rows that failed the chain's filters.
    #[serde(default)]
    pub probability_with_fail_filter: Option<Decimal>,
}

impl FkJoinNode {
    pub fn column(&self) -> &str {
        self.local_columns.first().map(String::as_str).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateNode {
    #[serde(default)]
    pub group_key: Option<Vec<String>>,
    pub probability: Decimal,
    /// HAVING predicate over aggregated values. Carried along, never
    /// instantiated.
    #[serde(default)]
    pub having: Option<FilterNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstraintChainNode {
    Filter(FilterNode),
    PkJoin(PkJoinNode),
    FkJoin(FkJoinNode),
    Aggregate(AggregateNode),
}

/// Resolves foreign-key values of the current batch and the join status of
/// the primary-key rows they reference.
pub trait JoinLookup {
    fn fk_value(&self, column: &str, row: usize) -> Result<i64>;
    fn pk_bit(&self, ref_table: &str, id: i64, pk_tag: u32) -> Result<bool>;
}

/// Per-row result of walking a whole chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainOutcome {
    /// Row still alive after the last evaluated node.
    pub alive: bool,
    /// PkJoin tags, with whether the row reached each of them alive.
    pub pk_tags: Vec<(u32, bool)>,
    /// Tags of the FK joins the row reached alive.
    pub fk_tags: Vec<u32>,
}

/// One query path restricted to a single base table, in evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintChain {
    pub table_name: String,
    #[serde(default)]
    pub chain_index: usize,
    pub nodes: Vec<ConstraintChainNode>,
}

impl ConstraintChain {
    /// Reject node orders the generator cannot reproduce.
    pub fn validate(&self) -> Result<()> {
        let mut seen_join = false;
        let mut seen_aggregate = false;
        for (i, node) in self.nodes.iter().enumerate() {
            if seen_aggregate {
                return Err(MirageError::unsupported(format!(
                    "chain {} on {}: node {} follows an aggregation",
                    self.chain_index, self.table_name, i
                )));
            }
            match node {
                ConstraintChainNode::Filter(_) if seen_join => {
                    return Err(MirageError::unsupported(format!(
                        "chain {} on {}: filter at node {} follows a join",
                        self.chain_index, self.table_name, i
                    )));
                }
                ConstraintChainNode::Filter(f) => check_probability(self, i, f.probability)?,
                ConstraintChainNode::PkJoin(_) => seen_join = true,
                ConstraintChainNode::FkJoin(fk) => {
                    seen_join = true;
                    if fk.local_columns.len() != 1 {
                        return Err(MirageError::unsupported(format!(
                            "chain {} on {}: composite foreign key ({}) at node {}",
                            self.chain_index,
                            self.table_name,
                            fk.local_columns.join(", "),
                            i
                        )));
                    }
                    check_probability(self, i, fk.probability)?;
                    if let Some(p) = fk.probability_with_fail_filter {
                        check_probability(self, i, p)?;
                    }
                }
                ConstraintChainNode::Aggregate(agg) => {
                    seen_aggregate = true;
                    check_probability(self, i, agg.probability)?;
                }
            }
        }
        Ok(())
    }

    pub fn filter_nodes(&self) -> impl Iterator<Item = &FilterNode> {
        self.nodes.iter().filter_map(|n| match n {
            ConstraintChainNode::Filter(f) => Some(f),
            _ => None,
        })
    }

    pub fn filter_nodes_mut(&mut self) -> impl Iterator<Item = &mut FilterNode> {
        self.nodes.iter_mut().filter_map(|n| match n {
            ConstraintChainNode::Filter(f) => Some(f),
            _ => None,
        })
    }

    pub fn fk_joins(&self) -> impl Iterator<Item = &FkJoinNode> {
        self.nodes.iter().filter_map(|n| match n {
            ConstraintChainNode::FkJoin(fk) => Some(fk),
            _ => None,
        })
    }

    pub fn pk_tags(&self) -> impl Iterator<Item = u32> + '_ {
        self.nodes.iter().filter_map(|n| match n {
            ConstraintChainNode::PkJoin(pk) => Some(pk.pk_tag),
            _ => None,
        })
    }

    /// AND of the chain's filter nodes for one row.
    pub fn evaluate_filters(&self, view: &dyn BatchView, row: usize) -> Result<bool> {
        for filter in self.filter_nodes() {
            if !filter.root.evaluate(view, row)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Walk every node up to the first aggregation, resolving FK joins
    /// against the generated keys.
    pub fn evaluate(
        &self,
        view: &dyn BatchView,
        row: usize,
        joins: &dyn JoinLookup,
    ) -> Result<ChainOutcome> {
        let mut outcome = ChainOutcome {
            alive: true,
            ..ChainOutcome::default()
        };
        for node in &self.nodes {
            match node {
                ConstraintChainNode::Filter(f) => {
                    outcome.alive = outcome.alive && f.root.evaluate(view, row)?;
                }
                ConstraintChainNode::PkJoin(pk) => outcome.pk_tags.push((pk.pk_tag, outcome.alive)),
                ConstraintChainNode::FkJoin(fk) => {
                    if !outcome.alive {
                        continue;
                    }
                    outcome.fk_tags.push(fk.pk_tag);
                    let id = joins.fk_value(fk.column(), row)?;
                    let matched = joins.pk_bit(&fk.ref_table, id, fk.pk_tag)?;
                    outcome.alive = fk.join_type.survives(matched);
                }
                ConstraintChainNode::Aggregate(_) => break,
            }
        }
        Ok(outcome)
    }

    /// NDV of `column` implied by the chain, for a referencing table of
    /// `table_size` rows.
    pub fn ndv_hint(&self, column: &str, table_size: i64) -> Option<i64> {
        let scaled = |p: Decimal| (p * Decimal::from(table_size)).round().to_i64();
        self.fk_joins()
            .filter(|fk| fk.column() == column)
            .find_map(|fk| fk.distinct_probability.and_then(scaled))
            .or_else(|| {
                self.nodes.iter().find_map(|n| match n {
                    ConstraintChainNode::Aggregate(agg)
                        if agg.group_key.as_deref() == Some(&[column.to_string()][..]) =>
                    {
                        scaled(agg.probability)
                    }
                    _ => None,
                })
            })
    }
}

fn check_probability(chain: &ConstraintChain, node: usize, p: Decimal) -> Result<()> {
    if p < Decimal::ZERO || p > Decimal::ONE {
        return Err(MirageError::Input {
            path: format!("chain {} on {}", chain.chain_index, chain.table_name),
            message: format!("probability {} at node {} is outside [0, 1]", p, node),
        });
    }
    Ok(())
}
