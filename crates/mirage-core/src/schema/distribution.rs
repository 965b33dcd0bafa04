//! Bucket placement over a column's value space.
//!
//! Selectivities live on one cumulative axis `[0, valid]`, `valid` being the
//! non-null mass. Inequality thresholds are keys on that axis; equality
//! buckets are segments between two keys that map to a single index. After
//! `init_all_parameters` every segment owns a contiguous index range of
//! `[1, range_size]`, in axis order, so thresholds survive as index
//! comparisons.

use std::collections::{BTreeMap, HashMap, VecDeque};

use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::chain::operator::CompareOperator;
use crate::chain::parameter::{ParamRef, ABSENT_INDEX, NULL_INDEX};
use crate::error::{MirageError, Result};

/// One selectivity to place, as produced by push-down.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementRequest {
    pub operator: CompareOperator,
    pub probability: Decimal,
    pub params: Vec<ParamRef>,
}

/// A placed segment of the cumulative axis and its index range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: Decimal,
    pub end: Decimal,
    pub first_index: i64,
    pub len: i64,
    pub equal: bool,
}

impl Segment {
    pub fn probability(&self) -> Decimal {
        self.end - self.start
    }

    pub fn contains(&self, index: i64) -> bool {
        index >= self.first_index && index < self.first_index + self.len
    }
}

#[derive(Debug, Clone, Default)]
struct EqualBucket {
    start: Decimal,
    params: Vec<ParamRef>,
}

/// Result of turning placed probabilities into indices.
#[derive(Debug, Clone, Default)]
pub struct Placement {
    /// Parameter id to bucket index.
    pub assignments: HashMap<u32, i64>,
    /// Indices needed beyond the configured cardinality; negative when
    /// part of the configured cardinality stays unused.
    pub extra_cardinality: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distribution {
    column: String,
    range_size: i64,
    null_ratio: Decimal,
    #[serde(skip)]
    reuse_eq_probability_limit: Decimal,
    #[serde(skip)]
    boundaries: BTreeMap<Decimal, Vec<(ParamRef, CompareOperator)>>,
    #[serde(skip)]
    equal: BTreeMap<Decimal, EqualBucket>,
    #[serde(skip)]
    absent: Vec<ParamRef>,
    segments: Vec<Segment>,
    /// Fractional rows carried between batches, one per segment plus NULL.
    #[serde(default)]
    carries: Vec<f64>,
    initialized: bool,
}

impl Distribution {
    pub fn new(
        column: impl Into<String>,
        range_size: i64,
        null_ratio: Decimal,
        reuse_eq_probability_limit: Decimal,
    ) -> Self {
        let null_ratio = null_ratio.max(Decimal::ZERO).min(Decimal::ONE);
        let mut boundaries = BTreeMap::new();
        boundaries.insert(Decimal::ZERO, Vec::new());
        boundaries.insert(Decimal::ONE - null_ratio, Vec::new());
        Self {
            column: column.into(),
            range_size: range_size.max(1),
            null_ratio,
            reuse_eq_probability_limit,
            boundaries,
            equal: BTreeMap::new(),
            absent: Vec::new(),
            segments: Vec::new(),
            carries: Vec::new(),
            initialized: false,
        }
    }

    pub fn range_size(&self) -> i64 {
        self.range_size
    }

    pub fn null_ratio(&self) -> Decimal {
        self.null_ratio
    }

    /// Non-null mass.
    pub fn valid(&self) -> Decimal {
        Decimal::ONE - self.null_ratio
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn equal_bucket_count(&self) -> usize {
        if self.initialized {
            self.segments.iter().filter(|s| s.equal).count()
        } else {
            self.equal.len()
        }
    }

    /// Place every request of one column: NULL checks first, then
    /// inequality thresholds, then equality buckets by descending size.
    pub fn place_all(&mut self, requests: &[PlacementRequest]) -> Result<()> {
        let (null_checks, rest): (Vec<_>, Vec<_>) =
            requests.iter().partition(|r| r.operator.is_null_check());
        let (ranges, mut equals): (Vec<_>, Vec<_>) =
            rest.into_iter().partition(|r| r.operator.is_range());

        for r in null_checks {
            let ratio = if r.operator == CompareOperator::IsNull {
                r.probability
            } else {
                Decimal::ONE - r.probability
            };
            self.set_null_ratio(ratio);
        }
        for r in ranges {
            self.insert_non_eq_probability(r.probability, r.operator, &r.params)?;
        }

        let valid = self.valid();
        let positive = |r: &PlacementRequest| {
            if r.operator.is_negative() {
                (valid - r.probability).max(Decimal::ZERO)
            } else {
                r.probability
            }
        };
        equals.sort_by(|a, b| positive(*b).cmp(&positive(*a)));
        for r in equals {
            self.insert_equal_probability(positive(r), r.operator, &r.params)?;
        }
        Ok(())
    }

    /// Change the NULL fraction. Only possible before any threshold or
    /// bucket has been placed.
    pub fn set_null_ratio(&mut self, ratio: Decimal) {
        let ratio = ratio.max(Decimal::ZERO).min(Decimal::ONE);
        if ratio == self.null_ratio {
            return;
        }
        if self.boundaries.len() > 2 || !self.equal.is_empty() {
            warn!(
                column = %self.column,
                requested = %ratio,
                kept = %self.null_ratio,
                "Null ratio requested after placement started, keeping the current ratio"
            );
            return;
        }
        warn!(
            column = %self.column,
            from = %self.null_ratio,
            to = %ratio,
            "Null ratio overridden by an IS NULL predicate"
        );
        self.boundaries.clear();
        self.boundaries.insert(Decimal::ZERO, Vec::new());
        self.boundaries.insert(Decimal::ONE - ratio, Vec::new());
        self.null_ratio = ratio;
    }

    /// Place an inequality threshold. GE/GT measure the mass above the
    /// threshold and are stored as `valid - p`.
    pub fn insert_non_eq_probability(
        &mut self,
        probability: Decimal,
        operator: CompareOperator,
        params: &[ParamRef],
    ) -> Result<()> {
        let valid = self.valid();
        let mut key = match operator {
            CompareOperator::Lt | CompareOperator::Le => probability,
            CompareOperator::Ge | CompareOperator::Gt => valid - probability,
            other => {
                return Err(MirageError::unsupported(format!(
                    "{} is not an inequality on column {}",
                    other, self.column
                )))
            }
        };
        if key < Decimal::ZERO || key > valid {
            let grown = if key < Decimal::ZERO { valid - key } else { key };
            warn!(
                column = %self.column,
                operator = %operator,
                probability = %probability,
                valid = %valid,
                grown = %grown,
                parameter_ids = ?ids(params),
                "Threshold exceeds the non-null mass, shrinking the null fraction"
            );
            self.grow_valid(grown);
            key = key.max(Decimal::ZERO);
        }
        if !self.boundaries.contains_key(&key) {
            let next = self.boundaries.range(key..).next().map(|(k, _)| *k);
            if next.is_some_and(|n| self.equal.contains_key(&n)) {
                return Err(self.infeasible(
                    operator,
                    probability,
                    params,
                    "threshold falls inside an equality bucket",
                ));
            }
        }
        self.boundaries
            .entry(key)
            .or_default()
            .extend(params.iter().map(|p| (*p, operator)));
        Ok(())
    }

    fn grow_valid(&mut self, valid: Decimal) {
        let valid = valid.min(Decimal::ONE);
        self.null_ratio = Decimal::ONE - valid;
        self.boundaries.entry(valid).or_default();
    }

    /// Place an equality-family bucket holding `probability` of the rows.
    pub fn insert_equal_probability(
        &mut self,
        probability: Decimal,
        operator: CompareOperator,
        params: &[ParamRef],
    ) -> Result<()> {
        if params.is_empty() {
            return Ok(());
        }
        if probability.is_zero() {
            self.absent.extend_from_slice(params);
            return Ok(());
        }

        if params.len() == 1 && params[0].can_merge && probability >= self.reuse_eq_probability_limit {
            let reusable = self
                .equal
                .iter_mut()
                .find(|(end, b)| **end - b.start == probability && b.params.iter().all(|p| p.can_merge));
            if let Some((_, bucket)) = reusable {
                bucket.params.push(params[0]);
                return Ok(());
            }
        }

        let best = self
            .free_segments()
            .into_iter()
            .filter(|(start, end)| *end - *start >= probability)
            .min_by_key(|(start, end)| *end - *start);
        if let Some((start, _)) = best {
            self.carve_equal(start, probability, params);
            return Ok(());
        }
        if params.len() > 1 {
            return self.deal_with_in_predicates_greedily(probability, operator, params);
        }
        Err(self.infeasible(operator, probability, params, "no free range can host it"))
    }

    /// Spread an IN list over existing equality buckets (largest first) and
    /// the largest free range.
    fn deal_with_in_predicates_greedily(
        &mut self,
        probability: Decimal,
        operator: CompareOperator,
        params: &[ParamRef],
    ) -> Result<()> {
        let mut remaining = probability;
        let mut queue: VecDeque<ParamRef> = params.iter().copied().collect();

        let mut candidates: Vec<(Decimal, Decimal)> = self
            .equal
            .iter()
            .filter(|(_, b)| b.params.iter().all(|p| p.can_merge))
            .map(|(end, b)| (*end, *end - b.start))
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1));

        for (end, size) in candidates {
            if queue.len() <= 1 {
                break;
            }
            let mergeable = queue.front().is_some_and(|p| p.can_merge);
            if mergeable && size <= remaining {
                if let (Some(param), Some(bucket)) = (queue.pop_front(), self.equal.get_mut(&end)) {
                    bucket.params.push(param);
                    remaining -= size;
                }
            }
        }

        let rest: Vec<ParamRef> = queue.into_iter().collect();
        if remaining.is_zero() {
            self.absent.extend(rest);
            return Ok(());
        }
        let largest = self
            .free_segments()
            .into_iter()
            .max_by_key(|(start, end)| *end - *start);
        match largest {
            Some((start, end)) if end - start >= remaining => {
                self.carve_equal(start, remaining, &rest);
                Ok(())
            }
            _ => Err(self.infeasible(
                operator,
                probability,
                params,
                "IN list does not fit in the remaining free ranges",
            )),
        }
    }

    /// Carve `[start, start + probability]` into one equality bucket per
    /// parameter, splitting the mass evenly.
    fn carve_equal(&mut self, start: Decimal, probability: Decimal, params: &[ParamRef]) {
        let share = probability / Decimal::from(params.len() as i64);
        let mut cursor = start;
        for (i, param) in params.iter().enumerate() {
            let end = if i + 1 == params.len() {
                start + probability
            } else {
                cursor + share
            };
            self.boundaries.entry(end).or_default();
            self.equal.insert(
                end,
                EqualBucket {
                    start: cursor,
                    params: vec![*param],
                },
            );
            cursor = end;
        }
    }

    fn free_segments(&self) -> Vec<(Decimal, Decimal)> {
        let keys: Vec<Decimal> = self.boundaries.keys().copied().collect();
        keys.windows(2)
            .filter(|w| !self.equal.contains_key(&w[1]))
            .map(|w| (w[0], w[1]))
            .collect()
    }

    fn infeasible(
        &self,
        operator: CompareOperator,
        probability: Decimal,
        params: &[ParamRef],
        reason: &str,
    ) -> MirageError {
        MirageError::InfeasiblePlacement {
            column: self.column.clone(),
            operator: operator.to_string(),
            probability: probability.to_string(),
            parameter_ids: ids(params),
            reason: reason.to_string(),
        }
    }

    /// Lay the segments out on `[1, range_size]` and resolve every placed
    /// parameter to an index. Equality buckets take one index each; free
    /// segments share the rest proportionally, at least one index each.
    pub fn init_all_parameters(&mut self) -> Result<Placement> {
        let keys: Vec<Decimal> = self.boundaries.keys().copied().collect();
        let raw: Vec<(Decimal, Decimal, bool)> = keys
            .windows(2)
            .map(|w| (w[0], w[1], self.equal.contains_key(&w[1])))
            .collect();

        let equal_count = raw.iter().filter(|s| s.2).count() as i64;
        let free: Vec<usize> = (0..raw.len()).filter(|&i| !raw[i].2).collect();
        let free_mass: Decimal = free.iter().map(|&i| raw[i].1 - raw[i].0).sum();
        let free_indices = self.range_size - equal_count;

        let mut lengths = vec![1i64; raw.len()];
        let mut extra = 0;
        if free.is_empty() {
            extra = equal_count - self.range_size;
        } else {
            let budget = Decimal::from(free_indices.max(0));
            let quotas: Vec<Decimal> = free
                .iter()
                .map(|&i| budget * (raw[i].1 - raw[i].0) / free_mass)
                .collect();
            let mut used = 0;
            for (slot, &i) in free.iter().enumerate() {
                lengths[i] = quotas[slot].floor().to_i64().unwrap_or(0).max(1);
                used += lengths[i];
            }
            if used > free_indices {
                extra = used - free_indices;
            } else {
                let mut order: Vec<usize> = (0..free.len()).collect();
                order.sort_by(|&a, &b| quotas[b].fract().cmp(&quotas[a].fract()));
                let leftover = (free_indices - used) as usize;
                for &slot in order.iter().cycle().take(leftover) {
                    lengths[free[slot]] += 1;
                }
            }
        }
        if extra > 0 {
            warn!(
                column = %self.column,
                configured = self.range_size,
                extra,
                "Bucket placement needs more distinct values than configured, widening the column"
            );
            self.range_size += extra;
        }

        let mut segments = Vec::with_capacity(raw.len());
        let mut begin_of: HashMap<Decimal, i64> = HashMap::new();
        let mut next = 1i64;
        for (i, &(start, end, equal)) in raw.iter().enumerate() {
            begin_of.insert(start, next);
            segments.push(Segment {
                start,
                end,
                first_index: next,
                len: lengths[i],
                equal,
            });
            next += lengths[i];
        }
        if let Some(top) = keys.last() {
            begin_of.insert(*top, next);
        }

        let mut placement = Placement {
            assignments: HashMap::new(),
            extra_cardinality: extra,
        };
        for (key, params) in &self.boundaries {
            let begin = begin_of.get(key).copied().unwrap_or(next);
            for (param, op) in params {
                let data = match op {
                    CompareOperator::Lt | CompareOperator::Ge => begin,
                    _ => begin - 1,
                };
                self.assign(&mut placement, param.id, data)?;
            }
        }
        for seg in segments.iter().filter(|s| s.equal) {
            if let Some(bucket) = self.equal.get(&seg.end) {
                for param in &bucket.params {
                    self.assign(&mut placement, param.id, seg.first_index)?;
                }
            }
        }
        for param in &self.absent {
            self.assign(&mut placement, param.id, ABSENT_INDEX)?;
        }

        debug!(
            column = %self.column,
            segments = segments.len(),
            equal_buckets = equal_count,
            range_size = self.range_size,
            "Distribution initialized"
        );
        self.carries = vec![0.0; segments.len() + 1];
        self.segments = segments;
        self.initialized = true;
        Ok(placement)
    }

    fn assign(&self, placement: &mut Placement, id: u32, data: i64) -> Result<()> {
        match placement.assignments.insert(id, data) {
            Some(previous) if previous != data => Err(MirageError::unsupported(format!(
                "parameter {} bound to indices {} and {} on column {}",
                id, previous, data, self.column
            ))),
            _ => Ok(()),
        }
    }

    /// Draw the bucket indices of one batch. Bucket row counts follow the
    /// probabilities with the rounding error carried to the next batch.
    pub fn prepare_tuple_data(&mut self, batch_size: usize, rng: &mut impl Rng) -> Result<Vec<i64>> {
        if !self.initialized {
            return Err(MirageError::State {
                message: format!("distribution of column {} is not initialized", self.column),
            });
        }
        let counts = self.bucket_counts(batch_size);
        let mut values = Vec::with_capacity(batch_size);
        for (seg, &count) in self.segments.iter().zip(&counts) {
            for _ in 0..count {
                let value = if seg.equal || seg.len <= 1 {
                    seg.first_index
                } else {
                    rng.random_range(seg.first_index..seg.first_index + seg.len)
                };
                values.push(value);
            }
        }
        let nulls = counts.last().copied().unwrap_or(0);
        values.extend(std::iter::repeat(NULL_INDEX).take(nulls));
        values.shuffle(rng);
        Ok(values)
    }

    fn bucket_counts(&mut self, batch_size: usize) -> Vec<usize> {
        let probabilities: Vec<f64> = self
            .segments
            .iter()
            .map(|s| s.probability())
            .chain(std::iter::once(self.null_ratio))
            .map(|p| p.to_f64().unwrap_or(0.0))
            .collect();
        if self.carries.len() != probabilities.len() {
            self.carries = vec![0.0; probabilities.len()];
        }

        let mut counts = vec![0i64; probabilities.len()];
        for (i, p) in probabilities.iter().enumerate() {
            let exact = batch_size as f64 * p + self.carries[i];
            let count = exact.floor().max(0.0);
            counts[i] = count as i64;
            self.carries[i] = exact - count;
        }

        let mut diff = batch_size as i64 - counts.iter().sum::<i64>();
        while diff > 0 {
            let i = argmax(&self.carries);
            counts[i] += 1;
            self.carries[i] -= 1.0;
            diff -= 1;
        }
        while diff < 0 {
            let Some(i) = (0..counts.len())
                .filter(|&i| counts[i] > 0)
                .min_by(|&a, &b| self.carries[a].total_cmp(&self.carries[b]))
            else {
                break;
            };
            counts[i] -= 1;
            self.carries[i] += 1.0;
            diff += 1;
        }
        counts.into_iter().map(|c| c.max(0) as usize).collect()
    }

    /// Segment holding `index`, if any.
    pub fn segment_of(&self, index: i64) -> Option<&Segment> {
        self.segments.iter().find(|s| s.contains(index))
    }
}

fn argmax(values: &[f64]) -> usize {
    (0..values.len())
        .max_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0)
}

fn ids(params: &[ParamRef]) -> Vec<u32> {
    params.iter().map(|p| p.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn param(id: u32) -> ParamRef {
        ParamRef { id, can_merge: true }
    }

    fn dist(range: i64, nulls: &str) -> Distribution {
        Distribution::new("t.c", range, dec(nulls), dec("0.05"))
    }

    fn request(operator: CompareOperator, p: &str, ids: &[u32]) -> PlacementRequest {
        PlacementRequest {
            operator,
            probability: dec(p),
            params: ids.iter().map(|&i| param(i)).collect(),
        }
    }

    fn count_matching(values: &[i64], f: impl Fn(i64) -> bool) -> usize {
        values.iter().filter(|&&v| f(v)).count()
    }

    #[test]
    fn test_equality_quarter_of_hundred() {
        let mut d = dist(100, "0");
        d.place_all(&[request(CompareOperator::Eq, "0.25", &[1])]).unwrap();
        let placement = d.init_all_parameters().unwrap();
        let literal = placement.assignments[&1];
        assert_eq!(placement.extra_cardinality, 0);

        let mut rng = StdRng::seed_from_u64(7);
        let values = d.prepare_tuple_data(100, &mut rng).unwrap();
        assert_eq!(values.len(), 100);
        assert_eq!(count_matching(&values, |v| v == literal), 25);
        // The remaining 75 rows spread over the other 99 indices.
        let total: i64 = d.segments().iter().map(|s| s.len).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_segments_never_overlap() {
        let mut d = dist(50, "0.1");
        d.place_all(&[
            request(CompareOperator::Lt, "0.3", &[1]),
            request(CompareOperator::Ge, "0.2", &[2]),
            request(CompareOperator::Eq, "0.1", &[3]),
            request(CompareOperator::Eq, "0.15", &[4]),
            request(CompareOperator::In, "0.2", &[5, 6]),
            request(CompareOperator::Ne, "0.85", &[7]),
        ])
        .unwrap();
        d.init_all_parameters().unwrap();
        let segs = d.segments();
        for pair in segs.windows(2) {
            assert_eq!(pair[0].first_index + pair[0].len, pair[1].first_index);
            assert_eq!(pair[0].end, pair[1].start);
        }
        let used: i64 = segs.iter().map(|s| s.len).sum();
        assert!(used <= d.range_size());
        let mass: Decimal = segs.iter().map(|s| s.probability()).sum();
        assert_eq!(mass, d.valid());
    }

    #[test]
    fn test_thresholds_select_their_mass() {
        let mut d = dist(1000, "0.2");
        d.place_all(&[
            request(CompareOperator::Lt, "0.3", &[1]),
            request(CompareOperator::Gt, "0.25", &[2]),
        ])
        .unwrap();
        let placement = d.init_all_parameters().unwrap();
        let lt = placement.assignments[&1];
        let gt = placement.assignments[&2];

        let mut rng = StdRng::seed_from_u64(11);
        let values = d.prepare_tuple_data(10_000, &mut rng).unwrap();
        let nonnull = |v: i64| v != NULL_INDEX;
        assert_eq!(count_matching(&values, |v| nonnull(v) && v < lt), 3000);
        assert_eq!(count_matching(&values, |v| nonnull(v) && v > gt), 2500);
        assert_eq!(count_matching(&values, |v| v == NULL_INDEX), 2000);
    }

    #[test]
    fn test_not_equal_becomes_complement_bucket() {
        let mut d = dist(20, "0");
        d.place_all(&[request(CompareOperator::Ne, "0.7", &[1])]).unwrap();
        let placement = d.init_all_parameters().unwrap();
        let literal = placement.assignments[&1];
        let mut rng = StdRng::seed_from_u64(3);
        let values = d.prepare_tuple_data(1000, &mut rng).unwrap();
        assert_eq!(count_matching(&values, |v| v != literal), 700);
    }

    #[test]
    fn test_zero_probability_is_absent() {
        let mut d = dist(10, "0");
        d.place_all(&[request(CompareOperator::Eq, "0", &[1])]).unwrap();
        let placement = d.init_all_parameters().unwrap();
        assert_eq!(placement.assignments[&1], ABSENT_INDEX);
    }

    #[test]
    fn test_equal_buckets_reused_when_probability_matches() {
        let mut d = dist(10, "0");
        d.place_all(&[
            request(CompareOperator::Eq, "0.2", &[1]),
            request(CompareOperator::Eq, "0.2", &[2]),
        ])
        .unwrap();
        assert_eq!(d.equal_bucket_count(), 1);
        let placement = d.init_all_parameters().unwrap();
        assert_eq!(placement.assignments[&1], placement.assignments[&2]);
    }

    #[test]
    fn test_small_probabilities_are_not_reused() {
        let mut d = dist(10, "0");
        d.place_all(&[
            request(CompareOperator::Eq, "0.01", &[1]),
            request(CompareOperator::Eq, "0.01", &[2]),
        ])
        .unwrap();
        assert_eq!(d.equal_bucket_count(), 2);
    }

    #[test]
    fn test_equality_overflow_is_infeasible() {
        let mut d = dist(10, "0");
        let result = d.place_all(&[
            request(CompareOperator::Eq, "0.7", &[1]),
            request(CompareOperator::Eq, "0.6", &[2]),
        ]);
        match result {
            Err(MirageError::InfeasiblePlacement { parameter_ids, .. }) => {
                assert_eq!(parameter_ids, vec![2])
            }
            other => panic!("expected infeasible placement, got {:?}", other),
        }
    }

    #[test]
    fn test_in_list_spreads_over_existing_buckets() {
        let mut d = dist(10, "0");
        d.place_all(&[
            request(CompareOperator::Eq, "0.5", &[1]),
            request(CompareOperator::Eq, "0.3", &[2]),
        ])
        .unwrap();
        // 0.45 does not fit in the free 0.2, so it reuses the 0.3 bucket and
        // the remainder lands in the free range.
        d.insert_equal_probability(dec("0.45"), CompareOperator::In, &[param(3), param(4)])
            .unwrap();
        let placement = d.init_all_parameters().unwrap();
        assert_eq!(placement.assignments[&3], placement.assignments[&2]);
        assert_ne!(placement.assignments[&4], placement.assignments[&1]);
    }

    #[test]
    fn test_cardinality_deficit_widens_column() {
        let mut d = dist(2, "0");
        d.place_all(&[
            request(CompareOperator::Lt, "0.5", &[1]),
            request(CompareOperator::Eq, "0.2", &[2]),
            request(CompareOperator::Eq, "0.1", &[3]),
        ])
        .unwrap();
        let placement = d.init_all_parameters().unwrap();
        assert!(placement.extra_cardinality > 0);
        assert_eq!(
            d.segments().iter().map(|s| s.len).sum::<i64>(),
            d.range_size()
        );
    }

    #[test]
    fn test_counts_stay_exact_across_batches() {
        let mut d = dist(30, "0.05");
        d.place_all(&[request(CompareOperator::Le, "0.333", &[1])]).unwrap();
        d.init_all_parameters().unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let mut nulls = 0;
        for _ in 0..10 {
            let values = d.prepare_tuple_data(333, &mut rng).unwrap();
            assert_eq!(values.len(), 333);
            nulls += count_matching(&values, |v| v == NULL_INDEX);
        }
        let expected = 3330.0 * 0.05;
        assert!((nulls as f64 - expected).abs() <= 1.0);
    }

    #[test]
    fn test_threshold_inside_equal_bucket_rejected() {
        let mut d = dist(10, "0");
        d.insert_equal_probability(dec("0.5"), CompareOperator::Eq, &[param(1)])
            .unwrap();
        let result = d.insert_non_eq_probability(dec("0.25"), CompareOperator::Lt, &[param(2)]);
        assert!(matches!(result, Err(MirageError::InfeasiblePlacement { .. })));
    }

    #[test]
    fn test_uninitialized_distribution_cannot_generate() {
        let mut d = dist(10, "0");
        let mut rng = StdRng::seed_from_u64(1);
        assert!(d.prepare_tuple_data(5, &mut rng).is_err());
    }
}
