//! # Error Types
//!
//! Defines `MirageError`, the unified error enum for every failure mode in
//! the generation pipeline. Every variant carries the probability, operator,
//! parameter ids, table or batch needed to reproduce the failure offline.

use thiserror::Error;

/// All errors that can occur in Mirage operations.
#[derive(Error, Debug)]
pub enum MirageError {
    #[error("Cannot place probability {probability} for {operator} on column {column} (parameters {parameter_ids:?}): {reason}")]
    InfeasiblePlacement {
        column: String,
        operator: String,
        probability: String,
        parameter_ids: Vec<u32>,
        reason: String,
    },

    #[error("No feasible join assignment for table {table} batch {batch}: solver reported {status}\n  The join cardinalities measured in the query plans are mutually inconsistent for this batch")]
    InfeasibleJoinModel {
        table: String,
        batch: usize,
        status: String,
    },

    #[error("Unsupported constraint shape: {message}")]
    Unsupported { message: String },

    #[error("Unknown table '{table}'")]
    UnknownTable { table: String },

    #[error("Unknown column '{column}'")]
    UnknownColumn { column: String },

    #[error("Circular foreign key dependency involving tables: {tables}\n  Rule tables require every referenced table to be generated before its referencers")]
    CircularDependency { tables: String },

    #[error("Foreign key resolution failed: {table}.{column} references {ref_table}, but no rule table exists for it")]
    ForeignKeyResolution {
        table: String,
        column: String,
        ref_table: String,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid input {path}: {message}")]
    Input { path: String, message: String },

    #[error("State file error: {message}")]
    State { message: String },

    #[error("Output error: {message}: {source}")]
    Output {
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl MirageError {
    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        MirageError::Unsupported {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MirageError>;
