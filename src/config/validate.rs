// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::PipelineConfig;
use crate::errors::{Result, TrainerError};

/// Run semantic validation against a loaded pipeline description.
///
/// This checks:
/// - there is at least one stage
/// - stage names are non-empty and unique
/// - every stage has a program
/// - no program or argument contains a NUL byte (they become C strings)
pub fn validate_config(cfg: &PipelineConfig) -> Result<()> {
    ensure_has_stages(cfg)?;
    validate_stage_names(cfg)?;
    validate_stage_commands(cfg)?;
    Ok(())
}

fn ensure_has_stages(cfg: &PipelineConfig) -> Result<()> {
    if cfg.stage.is_empty() {
        return Err(TrainerError::ConfigError(
            "pipeline must contain at least one [[stage]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_stage_names(cfg: &PipelineConfig) -> Result<()> {
    let mut seen = HashSet::new();
    for (idx, stage) in cfg.stage.iter().enumerate() {
        if stage.name.trim().is_empty() {
            return Err(TrainerError::ConfigError(format!(
                "stage #{idx} has an empty name"
            )));
        }
        if !seen.insert(stage.name.as_str()) {
            return Err(TrainerError::ConfigError(format!(
                "duplicate stage name '{}'",
                stage.name
            )));
        }
    }
    Ok(())
}

fn validate_stage_commands(cfg: &PipelineConfig) -> Result<()> {
    for stage in cfg.stage.iter() {
        if stage.program.is_empty() {
            return Err(TrainerError::ConfigError(format!(
                "stage '{}' has an empty program",
                stage.name
            )));
        }
        let has_nul = stage.program.contains('\0') || stage.args.iter().any(|a| a.contains('\0'));
        if has_nul {
            return Err(TrainerError::InvalidArgument {
                stage: stage.name.clone(),
                reason: "program and arguments must not contain NUL bytes".to_string(),
            });
        }
    }
    Ok(())
}
