//! Index to value rendering. Rendering is monotone in the index, so
//! inequality thresholds placed on indices hold on rendered values too.
//!
//! Varchar columns that carry LIKE buckets spell every other value without
//! the literal characters of their patterns, in either case, so only the
//! pattern buckets match a pattern.

use chrono::{DateTime, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use crate::chain::parameter::{Parameter, ParameterKind, NULL_INDEX};
use crate::error::{MirageError, Result};
use crate::schema::types::{Column, ColumnType};

/// Days from 0001-01-01 to 1970-01-01.
const EPOCH_DAYS_FROM_CE: i64 = 719_163;
const FILLER_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
/// ASCII-ordered, so fixed-width digit strings over any subset sort by value.
const TEXT_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const DEFAULT_FILLER_LEN: usize = 8;
const WILDCARD_FILLER_LEN: usize = 3;

impl Column {
    /// Render a bucket index; `None` for NULL.
    pub fn render(&self, index: i64) -> Option<String> {
        if index == NULL_INDEX {
            return None;
        }
        if let Some(pattern) = self.like_patterns.get(&index) {
            let alphabet = self.pattern_free_alphabet();
            let wildcard = alphabet.as_deref().unwrap_or(FILLER_ALPHABET);
            return Some(instantiate_pattern(pattern, self.filler_seed(index), wildcard));
        }
        let offset = self.min + index - 1;
        Some(match self.column_type {
            ColumnType::Integer => offset.to_string(),
            ColumnType::Decimal => Decimal::new(offset, self.scale()).to_string(),
            ColumnType::Date => EPOCH_DAYS_FROM_CE
                .checked_add(offset)
                .and_then(|d| i32::try_from(d).ok())
                .and_then(NaiveDate::from_num_days_from_ce_opt)
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| offset.to_string()),
            ColumnType::Datetime => DateTime::from_timestamp(offset, 0)
                .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| offset.to_string()),
            ColumnType::Bool => (index >= 2).to_string(),
            ColumnType::Varchar => {
                let alphabet = self.pattern_free_alphabet();
                let digits = alphabet.as_deref().unwrap_or(BASE36);
                let mut value = encode(index, self.range_size, digits);
                let width = value.len();
                let len = self
                    .avg_length
                    .map(|l| l.saturating_sub(width))
                    .unwrap_or(DEFAULT_FILLER_LEN);
                let chars = alphabet.as_deref().unwrap_or(FILLER_ALPHABET);
                value.push_str(&filler(self.filler_seed(index), len, chars));
                value
            }
        })
    }

    /// The literal written back into the query for a placed parameter.
    pub fn render_parameter(&self, param: &Parameter) -> String {
        match param.kind {
            ParameterKind::Like => param.data_value.clone(),
            ParameterKind::Substring if self.column_type == ColumnType::Varchar => {
                let alphabet = self.pattern_free_alphabet();
                encode(param.data, self.range_size, alphabet.as_deref().unwrap_or(BASE36))
            }
            _ => self.render(param.data).unwrap_or_default(),
        }
    }

    /// Numeric value of an index, for arithmetic over columns.
    pub fn numeric(&self, index: i64) -> Result<Option<f64>> {
        if index == NULL_INDEX {
            return Ok(None);
        }
        let offset = (self.min + index - 1) as f64;
        Ok(Some(match self.column_type {
            ColumnType::Integer | ColumnType::Date | ColumnType::Datetime => offset,
            ColumnType::Decimal => offset / 10f64.powi(self.scale() as i32),
            ColumnType::Bool => (index - 1) as f64,
            ColumnType::Varchar => {
                return Err(MirageError::unsupported(format!(
                    "arithmetic over varchar column {}",
                    self.name
                )))
            }
        }))
    }

    fn scale(&self) -> u32 {
        self.special_value.clamp(0, 28) as u32
    }

    fn filler_seed(&self, index: i64) -> u64 {
        (index as u64) ^ (self.special_value as u64)
    }

    /// Characters left once every LIKE literal of the column is removed;
    /// `None` when the column has no patterns or too few characters remain
    /// to spell distinct values.
    fn pattern_free_alphabet(&self) -> Option<Vec<u8>> {
        if self.like_patterns.is_empty() {
            return None;
        }
        let mut taken = [false; 128];
        for byte in self.like_patterns.values().flat_map(|p| p.bytes()) {
            if byte.is_ascii() && byte != b'%' && byte != b'_' {
                taken[byte.to_ascii_lowercase() as usize] = true;
                taken[byte.to_ascii_uppercase() as usize] = true;
            }
        }
        let kept: Vec<u8> = TEXT_ALPHABET
            .iter()
            .copied()
            .filter(|b| !taken[*b as usize])
            .collect();
        (kept.len() >= 2).then_some(kept)
    }
}

/// Fixed-width encoding of `index` in the digits of `alphabet`, wide enough
/// for every index up to `range_size`.
fn encode(index: i64, range_size: i64, alphabet: &[u8]) -> String {
    let base = alphabet.len() as u64;
    let mut width = 1;
    let mut capacity = base;
    while capacity <= range_size.max(1) as u64 {
        width += 1;
        capacity = capacity.saturating_mul(base);
    }
    let mut digits = vec![alphabet[0]; width];
    let mut rest = index.max(0) as u64;
    for slot in digits.iter_mut().rev() {
        *slot = alphabet[(rest % base) as usize];
        rest /= base;
    }
    String::from_utf8_lossy(&digits).into_owned()
}

/// Reproducible filler characters; not cryptographically secure.
fn filler(seed: u64, len: usize, alphabet: &[u8]) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
        .collect()
}

/// Replace `%` with a few filler characters and `_` with one.
fn instantiate_pattern(pattern: &str, seed: u64, alphabet: &[u8]) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = String::with_capacity(pattern.len() + WILDCARD_FILLER_LEN);
    let mut pick = |n: usize, out: &mut String| {
        for _ in 0..n {
            out.push(alphabet[rng.random_range(0..alphabet.len())] as char);
        }
    };
    for ch in pattern.chars() {
        match ch {
            '%' => pick(WILDCARD_FILLER_LEN, &mut out),
            '_' => pick(1, &mut out),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_and_decimal() {
        let mut c = Column::new("qty", ColumnType::Integer, 50);
        c.min = 10;
        assert_eq!(c.render(1).as_deref(), Some("10"));
        assert_eq!(c.render(NULL_INDEX), None);

        let mut price = Column::new("price", ColumnType::Decimal, 1000);
        price.special_value = 2;
        assert_eq!(price.render(151).as_deref(), Some("1.50"));
        assert_eq!(price.numeric(151).unwrap(), Some(1.5));
    }

    #[test]
    fn test_temporal() {
        let mut d = Column::new("shipdate", ColumnType::Date, 365);
        d.min = 0;
        assert_eq!(d.render(1).as_deref(), Some("1970-01-01"));
        assert_eq!(d.render(32).as_deref(), Some("1970-02-01"));

        let ts = Column::new("ts", ColumnType::Datetime, 100);
        assert_eq!(ts.render(62).as_deref(), Some("1970-01-01 00:01:01"));
    }

    #[test]
    fn test_varchar_is_monotone_and_reproducible() {
        let mut c = Column::new("comment", ColumnType::Varchar, 5000);
        c.avg_length = Some(12);
        let values: Vec<String> = [1, 35, 36, 1295, 4999]
            .iter()
            .map(|&i| c.render(i).unwrap())
            .collect();
        for pair in values.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
        assert!(values.iter().all(|v| v.len() == 12));
        assert_eq!(c.render(77), c.render(77));
    }

    #[test]
    fn test_like_bucket_renders_pattern() {
        let mut c = Column::new("p_name", ColumnType::Varchar, 100);
        c.like_patterns.insert(4, "%green_%".to_string());
        let value = c.render(4).unwrap();
        assert!(value.contains("green"));
        assert_eq!(value.len(), 3 + 5 + 1 + 3);

        let mut param = Parameter::with_kind(1, ParameterKind::Like);
        param.data = 4;
        param.data_value = "%green_%".to_string();
        assert_eq!(c.render_parameter(&param), "%green_%");
    }

    #[test]
    fn test_values_outside_like_buckets_avoid_pattern_literals() {
        let mut c = Column::new("p_name", ColumnType::Varchar, 1000);
        c.avg_length = Some(12);
        c.like_patterns.insert(7, "%a%".to_string());
        c.like_patterns.insert(9, "%B_c%".to_string());
        let values: Vec<String> = (1..=1000)
            .filter(|i| !c.like_patterns.contains_key(i))
            .map(|i| c.render(i).unwrap())
            .collect();
        for v in &values {
            assert!(!v.chars().any(|ch| "aAbBcC".contains(ch)), "{}", v);
            assert_eq!(v.len(), 12);
        }
        for pair in values.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
        assert!(c.render(7).unwrap().contains('a'));
        let hit = c.render(9).unwrap();
        assert!(hit.contains('B') && hit.contains('c'), "{}", hit);
    }

    #[test]
    fn test_bool_renders_two_values() {
        let flag = Column::new("active", ColumnType::Bool, 2);
        assert_eq!(flag.render(1).as_deref(), Some("false"));
        assert_eq!(flag.render(2).as_deref(), Some("true"));
        assert_eq!(flag.numeric(2).unwrap(), Some(1.0));
    }

    #[test]
    fn test_substring_parameter_renders_prefix() {
        let c = Column::new("c_phone", ColumnType::Varchar, 100);
        let mut param = Parameter::with_kind(2, ParameterKind::Substring);
        param.data = 37;
        let literal = c.render_parameter(&param);
        assert_eq!(literal, "11");
        assert!(c.render(37).unwrap().starts_with(&literal));
    }

    #[test]
    fn test_varchar_has_no_numeric_value() {
        let c = Column::new("name", ColumnType::Varchar, 10);
        assert!(c.numeric(1).is_err());
    }
}
