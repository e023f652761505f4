// src/pipeline/stage.rs

use std::fmt;

/// Index of a stage inside a [`Topology`](super::Topology).
pub type StageIndex = usize;

/// Index of a pipe inside a [`Topology`](super::Topology).
pub type PipeIndex = usize;

/// Position of a stage in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageRole {
    /// First stage; gets the CLI input as an argument, no piped stdin.
    Producer,
    /// Middle stage, numbered from 1.
    Transformer(usize),
    /// Last stage; writes to the orchestrator's own stdout.
    Consumer,
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageRole::Producer => write!(f, "producer"),
            StageRole::Transformer(n) => write!(f, "transformer{n}"),
            StageRole::Consumer => write!(f, "consumer"),
        }
    }
}

/// Where a stage's stdin comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageInput {
    /// No redirection: the child keeps whatever stdin the orchestrator has.
    Inherit,
    /// Read end of the given pipe.
    Pipe(PipeIndex),
}

/// Where a stage's stdout goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutput {
    /// The orchestrator's own stdout.
    Inherit,
    /// Write end of the given pipe.
    Pipe(PipeIndex),
}

/// Everything needed to spawn one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub name: String,
    pub role: StageRole,
    /// Program path or bare name (resolved through `PATH`).
    pub program: String,
    /// Full argument vector; `argv[0]` echoes `program`.
    pub argv: Vec<String>,
    pub input: StageInput,
    pub output: StageOutput,
}

impl StageSpec {
    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }
}
