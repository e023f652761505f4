#![allow(dead_code)]

use trainer::config::{PipelineConfig, PipelineSection, StageConfig, validate_config};
use trainer::pipeline::Topology;

/// Builder for `PipelineConfig` to simplify test setup.
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig {
                pipeline: PipelineSection::default(),
                stage: Vec::new(),
            },
        }
    }

    /// The four stages used throughout the tests: producer, two
    /// transformers, consumer.
    pub fn four_stages() -> Self {
        Self::new()
            .with_stage(StageConfigBuilder::new("producer", "bin/producer").build())
            .with_stage(StageConfigBuilder::new("transformer1", "bin/t1").build())
            .with_stage(StageConfigBuilder::new("transformer2", "bin/t2").build())
            .with_stage(StageConfigBuilder::new("consumer", "bin/consumer").build())
    }

    pub fn with_stage(mut self, stage: StageConfig) -> Self {
        self.config.stage.push(stage);
        self
    }

    pub fn strict(mut self, val: bool) -> Self {
        self.config.pipeline.strict = val;
        self
    }

    pub fn build(self) -> PipelineConfig {
        validate_config(&self.config).expect("Failed to build valid config from builder");
        self.config
    }

    /// Build and turn into a topology, forwarding `input` to the producer.
    pub fn topology(self, input: &str) -> Topology {
        Topology::from_config(&self.build(), input).expect("Failed to build topology")
    }
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `StageConfig`.
pub struct StageConfigBuilder {
    stage: StageConfig,
}

impl StageConfigBuilder {
    pub fn new(name: &str, program: &str) -> Self {
        Self {
            stage: StageConfig::new(name, program),
        }
    }

    /// `sh -c <script>` stand-in stage.
    pub fn shell(name: &str, script: &str) -> Self {
        Self::new(name, "sh").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.stage.args.push(arg.to_string());
        self
    }

    pub fn build(self) -> StageConfig {
        self.stage
    }
}
