// src/engine/events.rs

use std::fmt;

use nix::sys::signal::Signal;
use nix::unistd::Pid;

use crate::pipeline::StageIndex;

/// A stage process that was created successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnedChild {
    pub pid: Pid,
    pub stage: StageIndex,
    pub name: String,
}

/// How a child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    Signaled(Signal),
}

impl Termination {
    pub fn success(&self) -> bool {
        matches!(self, Termination::Exited(0))
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exited(code) => write!(f, "exited with status {code}"),
            Termination::Signaled(signal) => {
                write!(f, "terminated by signal {} ({})", *signal as i32, signal.as_str())
            }
        }
    }
}

/// Events sent to the orchestrator while draining.
///
/// Every spawned child produces exactly one of these.
#[derive(Debug)]
pub enum PipelineEvent {
    ChildReaped {
        child: SpawnedChild,
        termination: Termination,
    },
    /// Waiting for the child failed; its status is unknown.
    ReapFailed {
        child: SpawnedChild,
        error: nix::Error,
    },
}

/// Final state of one stage. `termination` is `None` if the wait failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageExit {
    pub child: SpawnedChild,
    pub termination: Option<Termination>,
}

impl StageExit {
    pub fn succeeded(&self) -> bool {
        self.termination.is_some_and(|t| t.success())
    }
}

/// Outcome of a complete run, in reap order.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub exits: Vec<StageExit>,
    /// SIGCHLD deliveries seen during the run (lower bound).
    pub death_notifications: usize,
}

impl RunReport {
    pub fn all_succeeded(&self) -> bool {
        self.exits.iter().all(StageExit::succeeded)
    }

    pub fn failed_stages(&self) -> Vec<&str> {
        self.exits
            .iter()
            .filter(|e| !e.succeeded())
            .map(|e| e.child.name.as_str())
            .collect()
    }

    pub fn exit_for(&self, stage: &str) -> Option<&StageExit> {
        self.exits.iter().find(|e| e.child.name == stage)
    }

    /// Exit status for `trainer` itself.
    ///
    /// Stage failures only count in strict mode.
    pub fn exit_code(&self, strict: bool) -> i32 {
        if strict && !self.all_succeeded() { 1 } else { 0 }
    }
}
