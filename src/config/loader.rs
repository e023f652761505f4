// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::PipelineConfig;
use crate::config::validate::validate_config;
use crate::errors::Result;

/// Load a pipeline description from a given path.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<PipelineConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let config: PipelineConfig = toml::from_str(&contents)?;
    Ok(config)
}

/// Load a pipeline description from path and run validation.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<PipelineConfig> {
    let config = load_from_path(&path)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load `path` when given, otherwise use the built-in four-stage pipeline.
///
/// The built-in description goes through the same validation so both paths
/// hand the orchestrator the same guarantees.
pub fn load_or_default(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading pipeline description");
            load_and_validate(path)
        }
        None => {
            debug!("no pipeline description given; using built-in stages");
            let config = PipelineConfig::default();
            validate_config(&config)?;
            Ok(config)
        }
    }
}
