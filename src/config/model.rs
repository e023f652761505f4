// src/config/model.rs

use serde::Deserialize;

/// Top-level pipeline description as read from a TOML file.
///
/// ```toml
/// [pipeline]
/// strict = false
///
/// [[stage]]
/// name = "preprocess"
/// program = "bin/preprocess"
///
/// [[stage]]
/// name = "logger"
/// program = "bin/logger"
/// args = ["--verbose"]
/// ```
///
/// Stages are connected in the order they appear: the first one is the
/// producer, the last one writes to our own stdout.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// All stages from `[[stage]]`, in pipeline order.
    #[serde(default = "default_stages")]
    pub stage: Vec<StageConfig>,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineSection {
    /// Turn any failed stage into a non-zero exit status for `trainer`.
    #[serde(default)]
    pub strict: bool,
}

/// `[[stage]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    /// Name used in logs and diagnostic lines.
    pub name: String,

    /// Program path, or a bare name resolved through `PATH`.
    pub program: String,

    /// Arguments after `argv[0]`. The producer additionally receives the
    /// CLI input as its last argument.
    #[serde(default)]
    pub args: Vec<String>,
}

impl StageConfig {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
        }
    }
}

/// The built-in chain: preprocess → forward layer → backward layer → logger.
fn default_stages() -> Vec<StageConfig> {
    vec![
        StageConfig::new("preprocess", "bin/preprocess"),
        StageConfig::new("forward_layer", "bin/forward_layer"),
        StageConfig::new("backward_layer", "bin/backward_layer"),
        StageConfig::new("logger", "bin/logger"),
    ]
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineSection::default(),
            stage: default_stages(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_means_builtin_pipeline() {
        let cfg: PipelineConfig = toml::from_str("").unwrap();
        let programs: Vec<&str> = cfg.stage.iter().map(|s| s.program.as_str()).collect();
        assert_eq!(
            programs,
            [
                "bin/preprocess",
                "bin/forward_layer",
                "bin/backward_layer",
                "bin/logger"
            ]
        );
    }
}
