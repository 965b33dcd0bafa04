//! Column-major view of one generated batch, and the per-row chain
//! evaluation run against it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::warn;

use crate::chain::{BatchView, ConstraintChain, JoinLookup};
use crate::error::{MirageError, Result};
use crate::join::{JoinStatus, RuleTableManager};
use crate::schema::Table;

pub struct BatchData<'a> {
    table: &'a Table,
    rules: &'a RuleTableManager,
    rows: usize,
    attributes: HashMap<String, Vec<i64>>,
    foreign_keys: HashMap<String, Vec<i64>>,
}

impl<'a> BatchData<'a> {
    pub fn new(table: &'a Table, rules: &'a RuleTableManager, rows: usize) -> Self {
        Self {
            table,
            rules,
            rows,
            attributes: HashMap::new(),
            foreign_keys: HashMap::new(),
        }
    }

    pub fn set_attribute(&mut self, column: &str, indexes: Vec<i64>) {
        self.attributes.insert(column.to_string(), indexes);
    }

    pub fn set_foreign_key(&mut self, column: &str, keys: Vec<i64>) {
        self.foreign_keys.insert(column.to_string(), keys);
    }

    pub fn attribute(&self, column: &str) -> Option<&[i64]> {
        self.attributes.get(column).map(Vec::as_slice)
    }

    pub fn foreign_key(&self, column: &str) -> Option<&[i64]> {
        self.foreign_keys.get(column).map(Vec::as_slice)
    }

    fn unknown(&self, column: &str) -> MirageError {
        MirageError::UnknownColumn {
            column: format!("{}.{}", self.table.name, column),
        }
    }

    /// Filter status of every row in every chain. A row whose predicate
    /// cannot be evaluated counts as filtered out.
    pub fn filter_statuses(&self, chains: &[&ConstraintChain]) -> Vec<Vec<bool>> {
        let failures = AtomicUsize::new(0);
        let statuses: Vec<Vec<bool>> = (0..self.rows)
            .into_par_iter()
            .map(|row| {
                chains
                    .iter()
                    .map(|chain| match chain.evaluate_filters(self, row) {
                        Ok(alive) => alive,
                        Err(e) => {
                            if failures.fetch_add(1, Ordering::Relaxed) == 0 {
                                warn!(table = %self.table.name, row, "Filter evaluation failed: {}", e);
                            }
                            false
                        }
                    })
                    .collect::<Vec<bool>>()
            })
            .collect();
        let failed = failures.into_inner();
        if failed > 1 {
            warn!(table = %self.table.name, failed, "Rows dropped from chains after evaluation errors");
        }
        statuses
    }

    /// Join status of every row over `tags`: bit `i` is set when the row
    /// reached the PkJoin tagged `tags[i]` alive. A chain that fails to
    /// evaluate for a row leaves that row's bits unset.
    pub fn pk_statuses(&self, chains: &[&ConstraintChain], tags: &[u32]) -> Vec<JoinStatus> {
        let failures = AtomicUsize::new(0);
        let statuses: Vec<JoinStatus> = (0..self.rows)
            .into_par_iter()
            .map(|row| {
                let mut bits = vec![false; tags.len()];
                for chain in chains {
                    let outcome = match chain.evaluate(self, row, self) {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            if failures.fetch_add(1, Ordering::Relaxed) == 0 {
                                warn!(table = %self.table.name, row, "Join evaluation failed: {}", e);
                            }
                            continue;
                        }
                    };
                    for (tag, alive) in outcome.pk_tags {
                        if let Some(i) = tags.iter().position(|&t| t == tag) {
                            bits[i] |= alive;
                        }
                    }
                }
                JoinStatus::new(bits)
            })
            .collect();
        let failed = failures.into_inner();
        if failed > 1 {
            warn!(table = %self.table.name, failed, "Primary-key statuses cleared after evaluation errors");
        }
        statuses
    }
}

impl BatchView for BatchData<'_> {
    fn column_index(&self, column: &str, row: usize) -> Result<i64> {
        self.attributes
            .get(column)
            .and_then(|v| v.get(row))
            .copied()
            .ok_or_else(|| self.unknown(column))
    }

    fn column_numeric(&self, column: &str, row: usize) -> Result<Option<f64>> {
        let index = self.column_index(column, row)?;
        self.table.column(column)?.numeric(index)
    }
}

impl JoinLookup for BatchData<'_> {
    fn fk_value(&self, column: &str, row: usize) -> Result<i64> {
        self.foreign_keys
            .get(column)
            .and_then(|v| v.get(row))
            .copied()
            .ok_or_else(|| self.unknown(column))
    }

    fn pk_bit(&self, ref_table: &str, id: i64, pk_tag: u32) -> Result<bool> {
        self.rules
            .get(ref_table)
            .ok_or_else(|| MirageError::UnknownTable {
                table: ref_table.to_string(),
            })?
            .bit_of(id, pk_tag)
    }
}
