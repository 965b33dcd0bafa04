use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::chain::pushdown::NullRatios;
use crate::error::{MirageError, Result};
use crate::schema::distribution::Distribution;

/// Registry of every table taking part in one generation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub tables: IndexMap<String, Table>,
}

impl Catalog {
    /// Build a catalog, checking that every foreign key references a known
    /// table that has a primary key.
    pub fn from_tables(tables: Vec<Table>) -> Result<Self> {
        let mut map = IndexMap::new();
        for table in tables {
            if map.contains_key(&table.name) {
                return Err(MirageError::Input {
                    path: "schema".to_string(),
                    message: format!("table '{}' is defined twice", table.name),
                });
            }
            map.insert(table.name.clone(), table);
        }
        let catalog = Self { tables: map };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<()> {
        for table in self.tables.values() {
            let mut seen = HashSet::new();
            let key_columns = table
                .primary_key
                .iter()
                .chain(table.foreign_keys.iter().map(|fk| &fk.column));
            for name in key_columns.chain(table.columns.iter().map(|c| &c.name)) {
                if !seen.insert(name.as_str()) {
                    return Err(MirageError::Input {
                        path: "schema".to_string(),
                        message: format!("column '{}.{}' is declared twice", table.name, name),
                    });
                }
            }
            for fk in &table.foreign_keys {
                let target = self.table(&fk.ref_table)?;
                if target.primary_key.is_none() {
                    return Err(MirageError::Input {
                        path: "schema".to_string(),
                        message: format!(
                            "{}.{} references {}, which has no primary key",
                            table.name, fk.column, fk.ref_table
                        ),
                    });
                }
            }
            if table.size < 0 {
                return Err(MirageError::Input {
                    path: "schema".to_string(),
                    message: format!("table '{}' has a negative size", table.name),
                });
            }
        }
        Ok(())
    }

    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables.get(name).ok_or_else(|| MirageError::UnknownTable {
            table: name.to_string(),
        })
    }

    pub fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| MirageError::UnknownTable {
                table: name.to_string(),
            })
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn foreign_key_count(&self) -> usize {
        self.tables.values().map(|t| t.foreign_keys.len()).sum()
    }

    pub fn column_count(&self) -> usize {
        self.tables.values().map(|t| t.columns.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    /// Rows to generate.
    pub size: i64,
    #[serde(default)]
    pub primary_key: Option<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    /// Attribute columns; key columns are named by `primary_key` and
    /// `foreign_keys`.
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>, size: i64) -> Self {
        Self {
            name: name.into(),
            size,
            primary_key: None,
            foreign_keys: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| self.unknown_column(name))
    }

    pub fn column_mut(&mut self, name: &str) -> Result<&mut Column> {
        match self.columns.iter().position(|c| c.name == name) {
            Some(i) => Ok(&mut self.columns[i]),
            None => Err(self.unknown_column(name)),
        }
    }

    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }

    fn unknown_column(&self, name: &str) -> MirageError {
        MirageError::UnknownColumn {
            column: format!("{}.{}", self.name, name),
        }
    }
}

impl NullRatios for Table {
    fn null_ratio(&self, column: &str) -> Result<Decimal> {
        Ok(self.column(column)?.null_ratio())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub ref_table: String,
    #[serde(default)]
    pub ref_column: String,
    /// Distinct referenced keys over the whole referencing table.
    #[serde(default)]
    pub ndv: Option<i64>,
}

/// `false` and `true`.
pub const BOOL_RANGE_SIZE: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Decimal,
    Varchar,
    Date,
    Datetime,
    Bool,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        !matches!(self, ColumnType::Varchar)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::Decimal => write!(f, "decimal"),
            ColumnType::Varchar => write!(f, "varchar"),
            ColumnType::Date => write!(f, "date"),
            ColumnType::Datetime => write!(f, "datetime"),
            ColumnType::Bool => write!(f, "bool"),
        }
    }
}

/// An attribute column: its value space `[1, range_size]` and, once
/// prepared, its bucket layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Smallest value (days or seconds since the epoch for temporal types).
    #[serde(default)]
    pub min: i64,
    pub range_size: i64,
    /// Decimal scale, or the filler seed of varchar columns.
    #[serde(default)]
    pub special_value: i64,
    #[serde(default)]
    pub null_percentage: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_length: Option<usize>,
    /// LIKE patterns rendered in place of the plain value of a bucket.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub like_patterns: BTreeMap<i64, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<Distribution>,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType, range_size: i64) -> Self {
        Self {
            name: name.into(),
            column_type,
            min: 0,
            range_size,
            special_value: 0,
            null_percentage: Decimal::ZERO,
            avg_length: None,
            like_patterns: BTreeMap::new(),
            distribution: None,
        }
    }

    /// Distinct values the column can hold, if its type bounds them.
    pub fn max_range_size(&self) -> Option<i64> {
        (self.column_type == ColumnType::Bool).then_some(BOOL_RANGE_SIZE)
    }

    pub fn init_distribution(&mut self, table: &str, reuse_eq_probability_limit: Decimal) {
        let range_size = self
            .max_range_size()
            .map_or(self.range_size, |max| self.range_size.min(max));
        self.distribution = Some(Distribution::new(
            format!("{}.{}", table, self.name),
            range_size,
            self.null_percentage,
            reuse_eq_probability_limit,
        ));
    }

    pub fn null_ratio(&self) -> Decimal {
        self.distribution
            .as_ref()
            .map(Distribution::null_ratio)
            .unwrap_or(self.null_percentage)
    }

    pub fn distribution(&self) -> Result<&Distribution> {
        self.distribution
            .as_ref()
            .ok_or_else(|| not_prepared(&self.name))
    }

    pub fn distribution_mut(&mut self) -> Result<&mut Distribution> {
        self.distribution
            .as_mut()
            .ok_or_else(|| not_prepared(&self.name))
    }
}

fn not_prepared(column: &str) -> MirageError {
    MirageError::State {
        message: format!("column {} has no distribution yet", column),
    }
}
