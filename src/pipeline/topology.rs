// src/pipeline/topology.rs

use std::fmt;

use crate::config::{PipelineConfig, StageConfig};
use crate::errors::{Result, TrainerError};
use crate::pipeline::stage::{
    PipeIndex, StageIndex, StageInput, StageOutput, StageRole, StageSpec,
};

/// A pipe between two stages, by index into the stage arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub writer: StageIndex,
    pub reader: StageIndex,
}

/// Fixed pipeline shape for one run.
///
/// Stages live in an arena; pipes are referenced by index from each stage's
/// [`StageInput`] / [`StageOutput`]. Pipe `i` always connects stage `i` to
/// stage `i + 1`.
#[derive(Debug, Clone)]
pub struct Topology {
    stages: Vec<StageSpec>,
    links: Vec<Link>,
}

impl Topology {
    /// Build the topology for a validated description, forwarding `input`
    /// to the producer.
    pub fn from_config(cfg: &PipelineConfig, input: &str) -> Result<Self> {
        Self::chain(&cfg.stage, input)
    }

    /// Connect `stages` into a linear chain.
    pub fn chain(stages: &[StageConfig], input: &str) -> Result<Self> {
        if stages.is_empty() {
            return Err(TrainerError::ConfigError(
                "cannot build a pipeline without stages".to_string(),
            ));
        }
        if input.contains('\0') {
            return Err(TrainerError::InvalidArgument {
                stage: stages[0].name.clone(),
                reason: "forwarded input must not contain NUL bytes".to_string(),
            });
        }

        let last = stages.len() - 1;
        let links: Vec<Link> = (0..last)
            .map(|i| Link {
                writer: i,
                reader: i + 1,
            })
            .collect();

        let stages = stages
            .iter()
            .enumerate()
            .map(|(idx, cfg)| {
                let role = match idx {
                    0 => StageRole::Producer,
                    i if i == last => StageRole::Consumer,
                    i => StageRole::Transformer(i),
                };

                let mut argv = Vec::with_capacity(cfg.args.len() + 2);
                argv.push(cfg.program.clone());
                argv.extend(cfg.args.iter().cloned());
                if idx == 0 {
                    argv.push(input.to_string());
                }

                StageSpec {
                    name: cfg.name.clone(),
                    role,
                    program: cfg.program.clone(),
                    argv,
                    input: if idx == 0 {
                        StageInput::Inherit
                    } else {
                        StageInput::Pipe(idx - 1)
                    },
                    output: if idx == last {
                        StageOutput::Inherit
                    } else {
                        StageOutput::Pipe(idx)
                    },
                }
            })
            .collect();

        let topology = Self { stages, links };
        topology.check_wiring()?;
        Ok(topology)
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn pipe_count(&self) -> usize {
        self.links.len()
    }

    /// Human-readable `writer->reader` label for a pipe.
    pub fn link_label(&self, pipe: PipeIndex) -> String {
        match self.links.get(pipe) {
            Some(link) => format!(
                "{}->{}",
                self.stages[link.writer].name, self.stages[link.reader].name
            ),
            None => format!("pipe#{pipe}"),
        }
    }

    /// Every pipe must have exactly one writer and one reader, and they must
    /// be the stages its [`Link`] names.
    pub fn check_wiring(&self) -> Result<()> {
        for (pipe, link) in self.links.iter().enumerate() {
            let writers: Vec<StageIndex> = self
                .stages
                .iter()
                .enumerate()
                .filter(|(_, s)| s.output == StageOutput::Pipe(pipe))
                .map(|(i, _)| i)
                .collect();
            let readers: Vec<StageIndex> = self
                .stages
                .iter()
                .enumerate()
                .filter(|(_, s)| s.input == StageInput::Pipe(pipe))
                .map(|(i, _)| i)
                .collect();

            if writers != [link.writer] || readers != [link.reader] {
                return Err(TrainerError::ConfigError(format!(
                    "pipe {pipe} must have exactly one writer and one reader \
                     (writers: {writers:?}, readers: {readers:?})"
                )));
            }
        }

        let dangling = self.stages.iter().any(|s| {
            matches!(s.input, StageInput::Pipe(p) if p >= self.links.len())
                || matches!(s.output, StageOutput::Pipe(p) if p >= self.links.len())
        });
        if dangling {
            return Err(TrainerError::ConfigError(
                "stage refers to a pipe that does not exist".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "stages ({}):", self.stages.len())?;
        for (idx, stage) in self.stages.iter().enumerate() {
            writeln!(f, "  [{idx}] {} ({})", stage.name, stage.role)?;
            writeln!(f, "      argv: {:?}", stage.argv)?;
            match stage.input {
                StageInput::Inherit => writeln!(f, "      stdin: inherited")?,
                StageInput::Pipe(p) => writeln!(f, "      stdin: pipe {p} ({})", self.link_label(p))?,
            }
            match stage.output {
                StageOutput::Inherit => writeln!(f, "      stdout: inherited")?,
                StageOutput::Pipe(p) => {
                    writeln!(f, "      stdout: pipe {p} ({})", self.link_label(p))?
                }
            }
        }
        Ok(())
    }
}
