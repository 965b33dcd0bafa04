pub mod generate;
pub mod graph;
pub mod prepare;

use std::path::Path;

use anyhow::Result;
use mirage_core::config::{read_config, Settings};

/// Settings from mirage.toml in the working directory, or the defaults.
pub fn load_settings() -> Result<Settings> {
    let settings = read_config(Path::new("."))?
        .map(|config| config.settings())
        .unwrap_or_default();
    Ok(settings)
}
