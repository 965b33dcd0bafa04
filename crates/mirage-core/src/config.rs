//! # Configuration File Parser
//!
//! Reads and parses `mirage.toml`, the optional configuration file that tunes
//! batching, the constraint solver and bucket placement without CLI flags:
//!
//! - `[generate]`: batch size, seed, output directory, delimiter, threads
//! - `[solver]`: search workers, node budget, join cardinality tolerance,
//!   NDV skew factor
//! - `[distribution]`: equal-bucket reuse limit, multivariate sample size
//!
//! Example `mirage.toml`:
//!
//! ```toml
//! [generate]
//! batch_size = 7000
//! seed = 42
//! output_dir = "./data"
//! delimiter = "|"
//!
//! [solver]
//! workers = 4
//! relative_tolerance = "0.04"
//! absolute_tolerance = 2
//!
//! [distribution]
//! reuse_eq_probability_limit = "0.05"
//! ```

use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{MirageError, Result};

/// Default config file name.
pub const CONFIG_FILE_NAME: &str = "mirage.toml";

pub const DEFAULT_BATCH_SIZE: usize = 7000;
pub const DEFAULT_SEED: u64 = 20_240_401;
pub const DEFAULT_NODE_LIMIT: u64 = 200_000;
pub const DEFAULT_ABSOLUTE_TOLERANCE: i64 = 2;
pub const DEFAULT_SKEW_FACTOR: i64 = 2;
pub const DEFAULT_MULTIVAR_SAMPLE_SIZE: usize = 20_000;

/// Top-level mirage.toml structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MirageConfig {
    pub generate: GenerateConfig,
    pub solver: SolverConfig,
    pub distribution: DistributionConfig,

    /// Absolute path to the directory containing mirage.toml, so a relative
    /// `output_dir` resolves against the config file rather than the CWD.
    #[serde(skip)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GenerateConfig {
    /// Rows per generated batch.
    pub batch_size: Option<usize>,
    /// Base seed; per-table and per-batch seeds derive from it.
    pub seed: Option<u64>,
    pub output_dir: Option<String>,
    pub delimiter: Option<String>,
    /// Size of the evaluation thread pool, 0 = available cores.
    pub threads: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Parallel search workers, 0 = available cores.
    pub workers: Option<usize>,
    /// Search nodes each worker may expand before giving up.
    pub node_limit: Option<u64>,
    pub relative_tolerance: Option<Decimal>,
    pub absolute_tolerance: Option<i64>,
    /// Slack applied to the distinct/row ratio of NDV-constrained keys.
    pub skew_factor: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    pub reuse_eq_probability_limit: Option<Decimal>,
    pub multivar_sample_size: Option<usize>,
}

/// Fully resolved settings used by the core. Built from the optional config
/// file with CLI overrides applied on top by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub batch_size: usize,
    pub seed: u64,
    pub output_dir: PathBuf,
    pub delimiter: String,
    pub threads: usize,
    pub solver: SolverSettings,
    pub distribution: DistributionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverSettings {
    pub workers: usize,
    pub node_limit: u64,
    pub relative_tolerance: Decimal,
    pub absolute_tolerance: i64,
    pub skew_factor: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionSettings {
    pub reuse_eq_probability_limit: Decimal,
    pub multivar_sample_size: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            workers: 0,
            node_limit: DEFAULT_NODE_LIMIT,
            relative_tolerance: Decimal::new(4, 2),
            absolute_tolerance: DEFAULT_ABSOLUTE_TOLERANCE,
            skew_factor: DEFAULT_SKEW_FACTOR,
        }
    }
}

impl Default for DistributionSettings {
    fn default() -> Self {
        Self {
            reuse_eq_probability_limit: Decimal::new(5, 2),
            multivar_sample_size: DEFAULT_MULTIVAR_SAMPLE_SIZE,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            seed: DEFAULT_SEED,
            output_dir: PathBuf::from("data"),
            delimiter: "|".to_string(),
            threads: 0,
            solver: SolverSettings::default(),
            distribution: DistributionSettings::default(),
        }
    }
}

impl Settings {
    /// Number of solver workers, resolving 0 to the available parallelism.
    pub fn solver_workers(&self) -> usize {
        resolve_parallelism(self.solver.workers)
    }

    /// Size of the evaluation pool, resolving 0 to the available parallelism.
    pub fn pool_threads(&self) -> usize {
        resolve_parallelism(self.threads)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(config_error("generate.batch_size must be at least 1"));
        }
        if self.delimiter.is_empty() {
            return Err(config_error("generate.delimiter must not be empty"));
        }
        if self.solver.skew_factor < 1 {
            return Err(config_error("solver.skew_factor must be at least 1"));
        }
        if self.solver.absolute_tolerance < 0 {
            return Err(config_error("solver.absolute_tolerance must not be negative"));
        }
        if self.solver.relative_tolerance < Decimal::ZERO
            || self.solver.relative_tolerance >= Decimal::ONE
        {
            return Err(config_error("solver.relative_tolerance must lie in [0, 1)"));
        }
        let limit = self.distribution.reuse_eq_probability_limit;
        if limit < Decimal::ZERO || limit >= Decimal::ONE {
            return Err(config_error(
                "distribution.reuse_eq_probability_limit must lie in [0, 1)",
            ));
        }
        if self.distribution.multivar_sample_size == 0 {
            return Err(config_error(
                "distribution.multivar_sample_size must be at least 1",
            ));
        }
        Ok(())
    }
}

fn resolve_parallelism(configured: usize) -> usize {
    if configured > 0 {
        configured
    } else {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

fn config_error(message: &str) -> MirageError {
    MirageError::Config {
        message: message.to_string(),
    }
}

/// Read and parse a mirage.toml file from the given directory.
///
/// Returns `None` if the file doesn't exist (config is optional).
/// Returns an error if the file exists but can't be parsed or validated.
pub fn read_config(dir: &Path) -> Result<Option<MirageConfig>> {
    let path = dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path).map_err(|e| MirageError::Config {
        message: format!("Failed to read {}: {}", path.display(), e),
    })?;

    let mut config: MirageConfig = toml::from_str(&content).map_err(|e| MirageError::Config {
        message: format!("Failed to parse {}: {}", path.display(), e),
    })?;

    config.config_dir = Some(std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf()));
    config.settings().validate()?;

    Ok(Some(config))
}

impl MirageConfig {
    /// Resolve the file's values over the built-in defaults.
    pub fn settings(&self) -> Settings {
        let defaults = Settings::default();
        let output_dir = match (&self.generate.output_dir, &self.config_dir) {
            (Some(dir), Some(base)) if Path::new(dir).is_relative() => base.join(dir),
            (Some(dir), _) => PathBuf::from(dir),
            (None, _) => defaults.output_dir,
        };

        Settings {
            batch_size: self.generate.batch_size.unwrap_or(defaults.batch_size),
            seed: self.generate.seed.unwrap_or(defaults.seed),
            output_dir,
            delimiter: self
                .generate
                .delimiter
                .clone()
                .unwrap_or(defaults.delimiter),
            threads: self.generate.threads.unwrap_or(defaults.threads),
            solver: SolverSettings {
                workers: self.solver.workers.unwrap_or(defaults.solver.workers),
                node_limit: self.solver.node_limit.unwrap_or(defaults.solver.node_limit),
                relative_tolerance: self
                    .solver
                    .relative_tolerance
                    .unwrap_or(defaults.solver.relative_tolerance),
                absolute_tolerance: self
                    .solver
                    .absolute_tolerance
                    .unwrap_or(defaults.solver.absolute_tolerance),
                skew_factor: self.solver.skew_factor.unwrap_or(defaults.solver.skew_factor),
            },
            distribution: DistributionSettings {
                reuse_eq_probability_limit: self
                    .distribution
                    .reuse_eq_probability_limit
                    .unwrap_or(defaults.distribution.reuse_eq_probability_limit),
                multivar_sample_size: self
                    .distribution
                    .multivar_sample_size
                    .unwrap_or(defaults.distribution.multivar_sample_size),
            },
        }
    }
}
