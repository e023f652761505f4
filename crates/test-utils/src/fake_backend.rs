use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use nix::errno::Errno;
use nix::unistd::Pid;
use tokio::sync::mpsc;
use trainer::engine::{PipelineEvent, SpawnedChild, Termination};
use trainer::pipeline::StageSpec;
use trainer::process::{HygieneError, ProcessBackend};

/// Descriptor handed out by [`FakeBackend`]. Not `Clone`, so closing one
/// consumes it just like a real `OwnedFd`.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct FakeFd(pub i32);

/// Everything the orchestrator asked the backend to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    CreatePipe { read: i32, write: i32 },
    CreatePipeFailed,
    MarkCloexec(i32),
    Spawn {
        stage: String,
        argv: Vec<String>,
        stdin: Option<i32>,
        stdout: Option<i32>,
        pid: Option<i32>,
    },
    Close(i32),
    StartReaping(Vec<i32>),
}

/// Shared, inspectable call log.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<BackendCall>>>,
}

impl CallLog {
    fn push(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn all(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Descriptors returned by successful `create_pipe` calls.
    pub fn created_fds(&self) -> Vec<i32> {
        self.all()
            .into_iter()
            .flat_map(|c| match c {
                BackendCall::CreatePipe { read, write } => vec![read, write],
                _ => vec![],
            })
            .collect()
    }

    pub fn pipes_created(&self) -> usize {
        self.created_fds().len() / 2
    }

    pub fn marked_fds(&self) -> Vec<i32> {
        self.all()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::MarkCloexec(fd) => Some(fd),
                _ => None,
            })
            .collect()
    }

    pub fn closed_fds(&self) -> Vec<i32> {
        self.all()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::Close(fd) => Some(fd),
                _ => None,
            })
            .collect()
    }

    /// Spawn attempts as `(stage, stdin, stdout)`, including failed ones.
    pub fn spawns(&self) -> Vec<(String, Option<i32>, Option<i32>)> {
        self.all()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::Spawn {
                    stage,
                    stdin,
                    stdout,
                    ..
                } => Some((stage, stdin, stdout)),
                _ => None,
            })
            .collect()
    }

    pub fn argv_of(&self, stage: &str) -> Option<Vec<String>> {
        self.all().into_iter().find_map(|c| match c {
            BackendCall::Spawn { stage: s, argv, .. } if s == stage => Some(argv),
            _ => None,
        })
    }

    /// Index of the first call matching `pred`.
    pub fn position(&self, pred: impl Fn(&BackendCall) -> bool) -> Option<usize> {
        self.all().iter().position(pred)
    }

    pub fn reaping_started(&self) -> bool {
        self.position(|c| matches!(c, BackendCall::StartReaping(_)))
            .is_some()
    }
}

/// A fake backend that:
/// - hands out fake descriptors and pids
/// - records every call in a [`CallLog`]
/// - fails pipe creation / spawning on request
/// - reports a scripted termination for each stage (default: exit 0)
pub struct FakeBackend {
    log: CallLog,
    next_fd: i32,
    next_pid: i32,
    pipes_attempted: usize,
    spawns_attempted: usize,
    fail_pipe_at: Option<usize>,
    fail_spawn_at: Option<usize>,
    fail_cloexec: bool,
    terminations: HashMap<String, Termination>,
    unreapable: Vec<String>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            log: CallLog::default(),
            next_fd: 10,
            next_pid: 4000,
            pipes_attempted: 0,
            spawns_attempted: 0,
            fail_pipe_at: None,
            fail_spawn_at: None,
            fail_cloexec: false,
            terminations: HashMap::new(),
            unreapable: Vec::new(),
        }
    }

    /// Handle to the call log; stays valid after the backend moves into an
    /// orchestrator.
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    /// Fail the `n`th (0-based) `create_pipe` with `EMFILE`.
    pub fn fail_pipe_at(mut self, n: usize) -> Self {
        self.fail_pipe_at = Some(n);
        self
    }

    /// Fail the `n`th (0-based) `spawn` with `EAGAIN`.
    pub fn fail_spawn_at(mut self, n: usize) -> Self {
        self.fail_spawn_at = Some(n);
        self
    }

    /// Make every close-on-exec mark fail.
    pub fn fail_cloexec(mut self) -> Self {
        self.fail_cloexec = true;
        self
    }

    pub fn terminate(mut self, stage: &str, termination: Termination) -> Self {
        self.terminations.insert(stage.to_string(), termination);
        self
    }

    /// Report `ReapFailed` for this stage instead of a termination.
    pub fn unreapable(mut self, stage: &str) -> Self {
        self.unreapable.push(stage.to_string());
        self
    }

    fn fresh_fd(&mut self) -> i32 {
        let fd = self.next_fd;
        self.next_fd += 1;
        fd
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessBackend for FakeBackend {
    type Fd = FakeFd;

    fn create_pipe(&mut self) -> nix::Result<(FakeFd, FakeFd)> {
        let attempt = self.pipes_attempted;
        self.pipes_attempted += 1;

        if self.fail_pipe_at == Some(attempt) {
            self.log.push(BackendCall::CreatePipeFailed);
            return Err(Errno::EMFILE);
        }

        let read = self.fresh_fd();
        let write = self.fresh_fd();
        self.log.push(BackendCall::CreatePipe { read, write });
        Ok((FakeFd(read), FakeFd(write)))
    }

    fn mark_close_on_exec(&mut self, fd: &FakeFd) -> Result<(), HygieneError> {
        self.log.push(BackendCall::MarkCloexec(fd.0));
        if self.fail_cloexec {
            return Err(HygieneError::GetFlags(Errno::EBADF));
        }
        Ok(())
    }

    fn spawn(
        &mut self,
        stage: &StageSpec,
        stdin: Option<&FakeFd>,
        stdout: Option<&FakeFd>,
    ) -> nix::Result<Pid> {
        let attempt = self.spawns_attempted;
        self.spawns_attempted += 1;

        let pid = if self.fail_spawn_at == Some(attempt) {
            None
        } else {
            let pid = self.next_pid;
            self.next_pid += 1;
            Some(pid)
        };

        self.log.push(BackendCall::Spawn {
            stage: stage.name.clone(),
            argv: stage.argv.clone(),
            stdin: stdin.map(|fd| fd.0),
            stdout: stdout.map(|fd| fd.0),
            pid,
        });

        pid.map(Pid::from_raw).ok_or(Errno::EAGAIN)
    }

    fn close(&mut self, fd: FakeFd) {
        self.log.push(BackendCall::Close(fd.0));
    }

    fn start_reaping(&mut self, children: Vec<SpawnedChild>, events: mpsc::Sender<PipelineEvent>) {
        self.log.push(BackendCall::StartReaping(
            children.iter().map(|c| c.pid.as_raw()).collect(),
        ));

        // Reverse spawn order, so reap order differs from spawn order.
        let batch: Vec<PipelineEvent> = children
            .into_iter()
            .rev()
            .map(|child| {
                if self.unreapable.contains(&child.name) {
                    PipelineEvent::ReapFailed {
                        child,
                        error: Errno::ECHILD,
                    }
                } else {
                    let termination = self
                        .terminations
                        .get(&child.name)
                        .copied()
                        .unwrap_or(Termination::Exited(0));
                    PipelineEvent::ChildReaped { child, termination }
                }
            })
            .collect();

        tokio::spawn(async move {
            for event in batch {
                if events.send(event).await.is_err() {
                    break;
                }
            }
        });
    }
}
