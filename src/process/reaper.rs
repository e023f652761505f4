// src/process/reaper.rs

//! Blocking reaper.
//!
//! Each child gets its own `waitpid(pid)` on a tokio blocking thread. Waiting
//! on specific pids (rather than any child) keeps one orchestrator from
//! reaping processes it does not own.

use nix::errno::Errno;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::Pid;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::STAGE_TARGET;
use crate::engine::{PipelineEvent, SpawnedChild, Termination};

/// Block until `pid` terminates and return how it ended.
///
/// `EINTR` is retried; any other error is returned as is.
pub fn wait_for_exit(pid: Pid) -> nix::Result<Termination> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(Termination::Exited(code)),
            Ok(WaitStatus::Signaled(_, signal, _)) => return Ok(Termination::Signaled(signal)),
            Ok(other) => {
                trace!(target: STAGE_TARGET, pid = pid.as_raw(), ?other, "non-terminal wait status");
            }
            Err(Errno::EINTR) => continue,
            Err(err) => return Err(err),
        }
    }
}

/// Start one blocking waiter per child, each sending exactly one
/// [`PipelineEvent`] on `events`.
///
/// The channel closes once every waiter has reported.
pub fn spawn_reapers(children: Vec<SpawnedChild>, events: mpsc::Sender<PipelineEvent>) {
    for child in children {
        let tx = events.clone();
        tokio::task::spawn_blocking(move || {
            debug!(
                target: STAGE_TARGET,
                stage = %child.name,
                pid = child.pid.as_raw(),
                "waiting for stage"
            );
            let event = match wait_for_exit(child.pid) {
                Ok(termination) => PipelineEvent::ChildReaped { child, termination },
                Err(error) => PipelineEvent::ReapFailed { child, error },
            };
            let _ = tx.blocking_send(event);
        });
    }
}
