//! Rule tables: which slice of a table's primary-key id space carries which
//! combination of join outcomes.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::Arc;

use rand::Rng;

use crate::error::{MirageError, Result};
use crate::join::status::JoinStatus;

/// Id ranges of one primary-key table, keyed by join status over the
/// table's PkJoin tags.
#[derive(Debug, Clone)]
pub struct RuleTable {
    table: String,
    tags: Vec<u32>,
    rules: BTreeMap<JoinStatus, Vec<Range<i64>>>,
    /// Range start to (end, status), for id lookups.
    by_start: BTreeMap<i64, (i64, JoinStatus)>,
    size: i64,
}

impl RuleTable {
    pub fn new(table: impl Into<String>, mut tags: Vec<u32>) -> Self {
        tags.sort_unstable();
        tags.dedup();
        Self {
            table: table.into(),
            tags,
            rules: BTreeMap::new(),
            by_start: BTreeMap::new(),
            size: 0,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn tags(&self) -> &[u32] {
        &self.tags
    }

    pub fn size(&self) -> i64 {
        self.size
    }

    pub fn rules(&self) -> &BTreeMap<JoinStatus, Vec<Range<i64>>> {
        &self.rules
    }

    pub fn tag_position(&self, tag: u32) -> Option<usize> {
        self.tags.binary_search(&tag).ok()
    }

    /// Reserve the next `count` ids for rows with `status`.
    pub fn add_rule(&mut self, status: JoinStatus, count: i64) -> Result<Range<i64>> {
        if status.len() != self.tags.len() {
            return Err(MirageError::Other(format!(
                "join status {} has {} bits, rule table of {} has {} tags",
                status,
                status.len(),
                self.table,
                self.tags.len()
            )));
        }
        let range = self.size..self.size + count.max(0);
        if !range.is_empty() {
            self.by_start
                .insert(range.start, (range.end, status.clone()));
            self.rules.entry(status).or_default().push(range.clone());
            self.size = range.end;
        }
        Ok(range)
    }

    pub fn status_of(&self, id: i64) -> Option<&JoinStatus> {
        self.by_start
            .range(..=id)
            .next_back()
            .filter(|(_, (end, _))| id < *end)
            .map(|(_, (_, status))| status)
    }

    /// Whether primary-key row `id` reached the PkJoin `tag` alive.
    pub fn bit_of(&self, id: i64, tag: u32) -> Result<bool> {
        let position = self.tag_position(tag).ok_or_else(|| {
            MirageError::unsupported(format!(
                "join tag {} has no matching primary-key join on {}",
                tag, self.table
            ))
        })?;
        let status = self.status_of(id).ok_or_else(|| {
            MirageError::Other(format!(
                "id {} is outside the generated keys of {} (size {})",
                id, self.table, self.size
            ))
        })?;
        Ok(status.bit(position))
    }

    /// Ranges cover `[0, size)` without overlap.
    pub fn is_complete(&self) -> bool {
        let mut expected = 0;
        for (start, (end, _)) in &self.by_start {
            if *start != expected {
                return false;
            }
            expected = *end;
        }
        expected == self.size
    }

    /// Group ranges by the status projected onto `tags`.
    pub fn merge(&self, tags: &[u32]) -> Result<MergedRuleTable> {
        let positions = tags
            .iter()
            .map(|&t| {
                self.tag_position(t).ok_or_else(|| {
                    MirageError::unsupported(format!(
                        "join tag {} has no matching primary-key join on {}",
                        t, self.table
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut grouped: BTreeMap<JoinStatus, Vec<Range<i64>>> = BTreeMap::new();
        for (status, ranges) in &self.rules {
            grouped
                .entry(status.project(&positions))
                .or_default()
                .extend(ranges.iter().cloned());
        }
        let ranges = grouped
            .into_iter()
            .map(|(status, mut ranges)| {
                ranges.sort_by_key(|r| r.start);
                (status, MergedRange::new(ranges))
            })
            .collect();
        Ok(MergedRuleTable {
            table: self.table.clone(),
            tags: tags.to_vec(),
            ranges,
        })
    }
}

/// Several id ranges addressed as one contiguous ordinal space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRange {
    ranges: Vec<Range<i64>>,
    /// Ordinal of the first id of each range.
    prefix: Vec<i64>,
    total: i64,
}

impl MergedRange {
    pub fn new(ranges: Vec<Range<i64>>) -> Self {
        let mut prefix = Vec::with_capacity(ranges.len());
        let mut total = 0;
        for r in &ranges {
            prefix.push(total);
            total += r.end - r.start;
        }
        Self {
            ranges,
            prefix,
            total,
        }
    }

    pub fn total(&self) -> i64 {
        self.total
    }

    /// The id at ordinal `k`, wrapping around.
    pub fn nth(&self, k: i64) -> i64 {
        if self.total == 0 {
            return 0;
        }
        let k = k.rem_euclid(self.total);
        let slot = match self.prefix.binary_search(&k) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        self.ranges[slot].start + (k - self.prefix[slot])
    }

    pub fn random(&self, rng: &mut impl Rng) -> i64 {
        if self.total == 0 {
            return 0;
        }
        self.nth(rng.random_range(0..self.total))
    }
}

/// A rule table viewed through the subset of tags one FK column joins on.
#[derive(Debug, Clone)]
pub struct MergedRuleTable {
    table: String,
    tags: Vec<u32>,
    ranges: BTreeMap<JoinStatus, MergedRange>,
}

impl MergedRuleTable {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn tags(&self) -> &[u32] {
        &self.tags
    }

    pub fn statuses(&self) -> impl Iterator<Item = &JoinStatus> {
        self.ranges.keys()
    }

    pub fn range(&self, status: &JoinStatus) -> Option<&MergedRange> {
        self.ranges.get(status)
    }

    pub fn tag_position(&self, tag: u32) -> Option<usize> {
        self.tags.iter().position(|&t| t == tag)
    }
}

/// Window of `range` consecutive ordinals starting at `start` inside a
/// merged range of `total_range` ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FkRange {
    pub start: i64,
    pub range: i64,
    pub total_range: i64,
}

impl FkRange {
    /// Key for the `k`-th row drawing from this window; keys repeat after
    /// `range` rows.
    pub fn key(&self, merged: &MergedRange, k: i64) -> i64 {
        let range = self.range.max(1);
        merged.nth((self.start + k % range) % self.total_range.max(1))
    }
}

/// Finished rule tables of one run, by table name.
#[derive(Debug, Clone, Default)]
pub struct RuleTableManager {
    tables: HashMap<String, Arc<RuleTable>>,
}

impl RuleTableManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: RuleTable) {
        self.tables.insert(table.table.clone(), Arc::new(table));
    }

    pub fn get(&self, table: &str) -> Option<&Arc<RuleTable>> {
        self.tables.get(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn status(bits: &[bool]) -> JoinStatus {
        JoinStatus::new(bits.to_vec())
    }

    fn sample_table() -> RuleTable {
        let mut t = RuleTable::new("customer", vec![7, 3]);
        // two batches
        t.add_rule(status(&[true, false]), 4).unwrap();
        t.add_rule(status(&[false, false]), 6).unwrap();
        t.add_rule(status(&[true, true]), 3).unwrap();
        t.add_rule(status(&[true, false]), 2).unwrap();
        t
    }

    #[test]
    fn test_ranges_partition_id_space() {
        let t = sample_table();
        assert_eq!(t.size(), 15);
        assert!(t.is_complete());
        let mut covered = vec![0; 15];
        for ranges in t.rules().values() {
            for r in ranges {
                for id in r.clone() {
                    covered[id as usize] += 1;
                }
            }
        }
        assert!(covered.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_tags_are_sorted_and_bits_resolve() {
        let t = sample_table();
        assert_eq!(t.tags(), &[3, 7]);
        // ids 10..13 carry [true, true]
        assert!(t.bit_of(11, 7).unwrap());
        // ids 0..4 carry [true, false]: tag 3 set, tag 7 unset
        assert!(t.bit_of(0, 3).unwrap());
        assert!(!t.bit_of(0, 7).unwrap());
        assert!(t.bit_of(15, 3).is_err());
        assert!(t.bit_of(0, 99).is_err());
    }

    #[test]
    fn test_wrong_width_is_rejected() {
        let mut t = RuleTable::new("customer", vec![1]);
        assert!(t.add_rule(status(&[true, true]), 1).is_err());
    }

    #[test]
    fn test_merge_projects_statuses() {
        let t = sample_table();
        let merged = t.merge(&[3]).unwrap();
        let matched = merged.range(&status(&[true])).unwrap();
        // [true,false] x 4, [true,true] x 3, [true,false] x 2
        assert_eq!(matched.total(), 9);
        let ids: Vec<i64> = (0..9).map(|k| matched.nth(k)).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 10, 11, 12, 13, 14]);
        assert_eq!(merged.range(&status(&[false])).unwrap().total(), 6);
    }

    #[test]
    fn test_fk_range_wraps() {
        let merged = MergedRange::new(vec![0..3, 10..12]);
        let window = FkRange {
            start: 4,
            range: 2,
            total_range: merged.total(),
        };
        let keys: Vec<i64> = (0..4).map(|k| window.key(&merged, k)).collect();
        assert_eq!(keys, vec![11, 0, 11, 0]);
    }

    #[test]
    fn test_random_stays_in_range() {
        let merged = MergedRange::new(vec![5..8, 20..21]);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let id = merged.random(&mut rng);
            assert!((5..8).contains(&id) || id == 20);
        }
    }
}
