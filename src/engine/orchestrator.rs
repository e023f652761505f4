// src/engine/orchestrator.rs

use std::fmt;
use std::io::{self, Write};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::engine::events::{PipelineEvent, RunReport, SpawnedChild, StageExit};
use crate::errors::{Result, TrainerError};
use crate::pipeline::{StageInput, StageOutput, Topology};
use crate::process::{DeathLatch, DeathNotifier, ProcessBackend, STAGE_TARGET};

/// Lifecycle of one orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Initializing,
    PipesReady,
    AllSpawned,
    Draining,
    Done,
    Failed,
}

/// Pipe ends still owned by the orchestrator, indexed like the topology's
/// links. `None` once closed.
struct PipeEnds<F> {
    read: Option<F>,
    write: Option<F>,
}

/// Runs a [`Topology`] to completion.
///
/// Responsibilities:
/// - install the SIGCHLD latch before any child exists
/// - allocate every pipe and mark each end close-on-exec
/// - spawn the stages in order with their stdin/stdout wiring
/// - close its own copy of every pipe end, so readers see end-of-stream
/// - drain one reap event per child and write a diagnostic line for each
pub struct Orchestrator<B: ProcessBackend> {
    backend: B,
    topology: Topology,
    notifier: DeathNotifier,
    diagnostics: Box<dyn Write + Send>,
    state: OrchestratorState,
}

impl<B: ProcessBackend> Orchestrator<B> {
    pub fn new(backend: B, topology: Topology) -> Self {
        Self {
            backend,
            topology,
            notifier: DeathNotifier::new(),
            diagnostics: Box::new(io::stderr()),
            state: OrchestratorState::Initializing,
        }
    }

    /// Send the per-child termination lines somewhere other than stderr.
    pub fn with_diagnostics(mut self, sink: impl Write + Send + 'static) -> Self {
        self.diagnostics = Box::new(sink);
        self
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn death_latch(&self) -> DeathLatch {
        self.notifier.latch()
    }

    /// Run the pipeline once.
    ///
    /// Returns an error only for setup failures (pipe creation, process
    /// creation). Stage failures are part of the returned [`RunReport`].
    pub async fn run(&mut self) -> Result<RunReport> {
        self.set_state(OrchestratorState::Initializing);

        if let Err(err) = self.notifier.install() {
            warn!(error = %err, "could not listen for SIGCHLD; continuing without the latch");
        }

        let mut pipes = match self.allocate_pipes() {
            Ok(pipes) => pipes,
            Err(err) => {
                self.set_state(OrchestratorState::Failed);
                return Err(err);
            }
        };
        self.apply_hygiene(&pipes);
        self.set_state(OrchestratorState::PipesReady);

        let spawned = self.spawn_stages(&pipes);
        self.close_pipes(&mut pipes);

        let children = match spawned {
            Ok(children) => children,
            Err((err, running)) => {
                if !running.is_empty() {
                    warn!(
                        running = ?running.iter().map(|c| c.pid.as_raw()).collect::<Vec<_>>(),
                        "aborting with stages already running; they are not reaped"
                    );
                }
                self.set_state(OrchestratorState::Failed);
                return Err(err);
            }
        };
        self.set_state(OrchestratorState::AllSpawned);

        self.set_state(OrchestratorState::Draining);
        let report = self.drain(children).await;
        self.set_state(OrchestratorState::Done);

        Ok(report)
    }

    fn set_state(&mut self, state: OrchestratorState) {
        debug!(from = ?self.state, to = ?state, "orchestrator state");
        self.state = state;
    }

    fn allocate_pipes(&mut self) -> Result<Vec<PipeEnds<B::Fd>>> {
        let count = self.topology.pipe_count();
        let mut pipes = Vec::with_capacity(count);

        for index in 0..count {
            match self.backend.create_pipe() {
                Ok((read, write)) => {
                    debug!(
                        pipe = index,
                        link = %self.topology.link_label(index),
                        ?read,
                        ?write,
                        "pipe created"
                    );
                    pipes.push(PipeEnds {
                        read: Some(read),
                        write: Some(write),
                    });
                }
                Err(source) => {
                    let link = self.topology.link_label(index);
                    error!(pipe = index, %link, error = %source, "pipe creation failed");
                    self.close_pipes(&mut pipes);
                    return Err(TrainerError::PipeCreation {
                        index,
                        link,
                        source,
                    });
                }
            }
        }

        Ok(pipes)
    }

    fn apply_hygiene(&mut self, pipes: &[PipeEnds<B::Fd>]) {
        for (index, ends) in pipes.iter().enumerate() {
            for (end, fd) in [("read", &ends.read), ("write", &ends.write)] {
                let Some(fd) = fd else { continue };
                if let Err(err) = self.backend.mark_close_on_exec(fd) {
                    warn!(pipe = index, end, ?fd, error = %err, "could not mark pipe end close-on-exec");
                }
            }
        }
    }

    /// Spawn every stage in order. On failure, returns the error together
    /// with the children that are already running.
    fn spawn_stages(
        &mut self,
        pipes: &[PipeEnds<B::Fd>],
    ) -> std::result::Result<Vec<SpawnedChild>, (TrainerError, Vec<SpawnedChild>)> {
        let mut children = Vec::with_capacity(self.topology.stages().len());

        for (index, stage) in self.topology.stages().iter().enumerate() {
            let stdin = match stage.input {
                StageInput::Inherit => None,
                StageInput::Pipe(p) => pipes.get(p).and_then(|ends| ends.read.as_ref()),
            };
            let stdout = match stage.output {
                StageOutput::Inherit => None,
                StageOutput::Pipe(p) => pipes.get(p).and_then(|ends| ends.write.as_ref()),
            };

            match self.backend.spawn(stage, stdin, stdout) {
                Ok(pid) => {
                    info!(
                        target: STAGE_TARGET,
                        stage = %stage.name,
                        role = %stage.role,
                        pid = pid.as_raw(),
                        cmd = %stage.command_line(),
                        "stage started"
                    );
                    children.push(SpawnedChild {
                        pid,
                        stage: index,
                        name: stage.name.clone(),
                    });
                }
                Err(source) => {
                    error!(stage = %stage.name, error = %source, "could not create stage process");
                    let err = TrainerError::Spawn {
                        stage: stage.name.clone(),
                        source,
                    };
                    return Err((err, children));
                }
            }
        }

        Ok(children)
    }

    /// Close every pipe end still held. Each end is taken out of its slot,
    /// so calling this again closes nothing.
    fn close_pipes(&mut self, pipes: &mut [PipeEnds<B::Fd>]) {
        for ends in pipes.iter_mut() {
            if let Some(read) = ends.read.take() {
                self.backend.close(read);
            }
            if let Some(write) = ends.write.take() {
                self.backend.close(write);
            }
        }
    }

    async fn drain(&mut self, children: Vec<SpawnedChild>) -> RunReport {
        let expected = children.len();
        let (tx, mut rx) = mpsc::channel::<PipelineEvent>(expected.max(1));
        self.backend.start_reaping(children, tx);

        let mut exits = Vec::with_capacity(expected);
        while exits.len() < expected {
            match rx.recv().await {
                Some(PipelineEvent::ChildReaped { child, termination }) => {
                    debug!(
                        target: STAGE_TARGET,
                        stage = %child.name,
                        pid = child.pid.as_raw(),
                        %termination,
                        "stage reaped"
                    );
                    self.report(&child, &termination);
                    exits.push(StageExit {
                        child,
                        termination: Some(termination),
                    });
                }
                Some(PipelineEvent::ReapFailed { child, error }) => {
                    warn!(
                        stage = %child.name,
                        pid = child.pid.as_raw(),
                        error = %error,
                        "could not collect stage exit status"
                    );
                    self.report(&child, format_args!("status unknown: {error}"));
                    exits.push(StageExit {
                        child,
                        termination: None,
                    });
                }
                None => {
                    warn!(
                        missing = expected - exits.len(),
                        "reap channel closed before every stage was accounted for"
                    );
                    break;
                }
            }
        }

        let latch = self.notifier.latch();
        debug!(
            reaped = exits.len(),
            sigchld_seen = latch.has_fired(),
            deliveries = latch.deliveries(),
            "all stages reaped"
        );

        RunReport {
            exits,
            death_notifications: latch.deliveries(),
        }
    }

    /// Write the one diagnostic line for `child`.
    fn report(&mut self, child: &SpawnedChild, outcome: impl fmt::Display) {
        let line = format!("trainer: child {} ({}) {}", child.pid.as_raw(), child.name, outcome);
        if let Err(err) = writeln!(self.diagnostics, "{line}") {
            warn!(error = %err, "could not write diagnostic line");
        }
    }
}
