// src/process/mod.rs

//! OS process plumbing.
//!
//! - [`fd`] allocates pipes and marks descriptors close-on-exec.
//! - [`spawn`] forks a child, rebinds its stdin/stdout and execs a program.
//! - [`notifier`] latches SIGCHLD deliveries for liveness diagnostics.
//! - [`reaper`] waits for children on blocking threads and reports their
//!   termination over a channel.
//! - [`backend`] provides the `ProcessBackend` trait the orchestrator talks
//!   to, and the `NixBackend` used in production. Tests substitute a fake.

pub mod backend;
pub mod fd;
pub mod notifier;
pub mod reaper;
pub mod spawn;

/// Tracing target for per-stage lifecycle events (fork, wait, reap).
pub const STAGE_TARGET: &str = "trainer::process";

pub use backend::{NixBackend, ProcessBackend};
pub use fd::{HygieneError, open_pipe, set_cloexec};
pub use notifier::{DeathLatch, DeathNotifier};
pub use spawn::{EXIT_EXEC_FAILED, EXIT_REDIRECT_FAILED, spawn_child};
