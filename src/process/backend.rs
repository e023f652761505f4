// src/process/backend.rs

//! Pluggable process backend.
//!
//! The orchestrator talks to a `ProcessBackend` instead of calling `nix`
//! directly, so tests can script pipe/spawn failures and child outcomes
//! without forking.
//!
//! - `NixBackend` is the production implementation: real pipes, real
//!   `fork`/`exec`, blocking `waitpid` reapers.
//! - Tests provide their own backend that records every call.

use std::fmt;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};

use nix::unistd::Pid;
use tokio::sync::mpsc;
use tracing::trace;

use crate::engine::{PipelineEvent, SpawnedChild};
use crate::pipeline::StageSpec;
use crate::process::fd::{HygieneError, open_pipe, set_cloexec};
use crate::process::reaper::spawn_reapers;
use crate::process::spawn::spawn_child;

/// Operations the orchestrator needs from the OS.
pub trait ProcessBackend: Send {
    /// Descriptor type for pipe ends. Closing consumes it, so an end can
    /// only be closed once.
    type Fd: Send + fmt::Debug;

    /// Allocate a pipe, returning `(read_end, write_end)`.
    fn create_pipe(&mut self) -> nix::Result<(Self::Fd, Self::Fd)>;

    /// Mark a descriptor close-on-exec.
    fn mark_close_on_exec(&mut self, fd: &Self::Fd) -> Result<(), HygieneError>;

    /// Create the process for `stage`, binding `stdin`/`stdout` when given.
    ///
    /// Must not close any of the orchestrator's descriptors.
    fn spawn(
        &mut self,
        stage: &StageSpec,
        stdin: Option<&Self::Fd>,
        stdout: Option<&Self::Fd>,
    ) -> nix::Result<Pid>;

    /// Release the orchestrator's copy of a descriptor.
    fn close(&mut self, fd: Self::Fd);

    /// Arrange for exactly one event per child to be sent on `events`, and
    /// for the channel to close afterwards.
    fn start_reaping(&mut self, children: Vec<SpawnedChild>, events: mpsc::Sender<PipelineEvent>);
}

/// Production backend built on `nix`.
#[derive(Debug, Default)]
pub struct NixBackend;

impl NixBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessBackend for NixBackend {
    type Fd = OwnedFd;

    fn create_pipe(&mut self) -> nix::Result<(OwnedFd, OwnedFd)> {
        open_pipe()
    }

    fn mark_close_on_exec(&mut self, fd: &OwnedFd) -> Result<(), HygieneError> {
        set_cloexec(fd.as_fd())
    }

    fn spawn(
        &mut self,
        stage: &StageSpec,
        stdin: Option<&OwnedFd>,
        stdout: Option<&OwnedFd>,
    ) -> nix::Result<Pid> {
        spawn_child(
            &stage.name,
            &stage.program,
            &stage.argv,
            stdin.map(|fd| fd.as_fd()),
            stdout.map(|fd| fd.as_fd()),
        )
    }

    fn close(&mut self, fd: OwnedFd) {
        trace!(fd = fd.as_raw_fd(), "closing pipe end");
        drop(fd);
    }

    fn start_reaping(&mut self, children: Vec<SpawnedChild>, events: mpsc::Sender<PipelineEvent>) {
        spawn_reapers(children, events);
    }
}
