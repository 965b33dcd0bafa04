//! # Prepared state
//!
//! `mirage.state.json` stores the outcome of the prepare phase: the catalog
//! with finished distributions and the chains with instantiated parameters.
//! A later `generate` reuses it as long as the input hash still matches
//! the schema and chains it was prepared from, and the seed and
//! `[distribution]` settings are unchanged.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::chain::QueryChains;
use crate::config::{DistributionSettings, Settings};
use crate::error::{MirageError, Result};
use crate::schema::Catalog;

pub const STATE_FILE_NAME: &str = "mirage.state.json";
pub const PARAMS_FILE_NAME: &str = "params.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedState {
    /// SHA256 over the schema and chains input text.
    pub input_hash: String,
    pub mirage_version: String,
    pub seed: u64,
    /// Placement settings the distributions were built with; missing in
    /// states written before they were recorded.
    #[serde(default)]
    pub distribution: Option<DistributionSettings>,
    pub catalog: Catalog,
    pub chains: QueryChains,
    /// Rendered value of every parameter, by id.
    pub parameters: BTreeMap<u32, String>,
    pub created_at: String,
}

impl PreparedState {
    pub fn new(
        input_hash: String,
        settings: &Settings,
        catalog: Catalog,
        chains: QueryChains,
        parameters: BTreeMap<u32, String>,
    ) -> Self {
        Self {
            input_hash,
            mirage_version: env!("CARGO_PKG_VERSION").to_string(),
            seed: settings.seed,
            distribution: Some(settings.distribution.clone()),
            catalog,
            chains,
            parameters,
            created_at: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }

    /// Prepared from the same inputs, seed and placement settings.
    pub fn is_current(&self, input_hash: &str, settings: &Settings) -> bool {
        self.input_hash == input_hash
            && self.seed == settings.seed
            && self.distribution.as_ref() == Some(&settings.distribution)
    }
}

/// Hash of the raw input documents. Each part is length-prefixed so
/// moving bytes between them changes the hash.
pub fn compute_input_hash(schema_text: &str, chains_text: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [schema_text, chains_text] {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

pub fn write_state(state: &PreparedState, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(state).map_err(|e| MirageError::State {
        message: format!("Failed to serialize state: {}", e),
    })?;
    write_atomic(path, json.as_bytes())
}

pub fn read_state(path: &Path) -> Result<PreparedState> {
    let content = fs::read_to_string(path).map_err(|e| MirageError::Output {
        message: format!("Failed to read state from {}", path.display()),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| MirageError::State {
        message: format!("Failed to parse {}: {}", path.display(), e),
    })
}

/// `params.json`: parameter id → rendered value, for the templating stage.
pub fn write_parameters(parameters: &BTreeMap<u32, String>, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(parameters).map_err(|e| MirageError::State {
        message: format!("Failed to serialize parameters: {}", e),
    })?;
    write_atomic(path, json.as_bytes())
}

/// Write to a temporary file next to `path`, then rename it into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    let tmp_path = dir.join(format!(".{}.tmp", name));

    let mut file = fs::File::create(&tmp_path).map_err(|e| MirageError::Output {
        message: format!("Failed to create temp file at {}", tmp_path.display()),
        source: e,
    })?;
    file.write_all(bytes).map_err(|e| MirageError::Output {
        message: format!("Failed to write temp file at {}", tmp_path.display()),
        source: e,
    })?;
    file.sync_all().map_err(|e| MirageError::Output {
        message: "Failed to sync state to disk".to_string(),
        source: e,
    })?;

    fs::rename(&tmp_path, path).map_err(|e| MirageError::Output {
        message: format!(
            "Failed to rename {} → {}",
            tmp_path.display(),
            path.display()
        ),
        source: e,
    })
}
