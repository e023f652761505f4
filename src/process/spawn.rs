// src/process/spawn.rs

//! Child spawner: `fork` + `dup2` + `execvp`.
//!
//! Between `fork` and `exec` the child may only use async-signal-safe calls,
//! so every C string, the argv pointer array and the error prefix are built
//! before forking.

use std::ffi::CString;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};

use libc::c_char;
use nix::errno::Errno;
use nix::unistd::{ForkResult, Pid, fork};
use tracing::debug;

use super::STAGE_TARGET;

/// Exit status of a child whose stdin/stdout redirection failed.
pub const EXIT_REDIRECT_FAILED: i32 = 125;

/// Exit status of a child whose `execvp` failed.
pub const EXIT_EXEC_FAILED: i32 = 127;

/// Fork and exec `program` with `argv`, optionally rebinding stdin/stdout.
///
/// Returns the child's pid. An `Err` means no process was created. Failures
/// inside the child surface later as its exit status
/// ([`EXIT_REDIRECT_FAILED`], [`EXIT_EXEC_FAILED`]).
///
/// No descriptor of the caller is closed here.
pub fn spawn_child(
    label: &str,
    program: &str,
    argv: &[String],
    stdin: Option<BorrowedFd<'_>>,
    stdout: Option<BorrowedFd<'_>>,
) -> nix::Result<Pid> {
    let program_c = CString::new(program).map_err(|_| Errno::EINVAL)?;
    let argv_c = argv
        .iter()
        .map(|arg| CString::new(arg.as_str()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| Errno::EINVAL)?;

    let mut argv_ptrs: Vec<*const c_char> = argv_c.iter().map(|a| a.as_ptr()).collect();
    argv_ptrs.push(std::ptr::null());

    let prefix = format!("trainer: {label}: ");
    let stdin_fd = stdin.map(|fd| fd.as_raw_fd());
    let stdout_fd = stdout.map(|fd| fd.as_raw_fd());

    // SAFETY: the child branch only calls async-signal-safe functions on
    // memory prepared above, and never returns.
    match unsafe { fork() }? {
        ForkResult::Parent { child } => {
            debug!(
                target: STAGE_TARGET,
                stage = %label,
                pid = child.as_raw(),
                ?stdin_fd,
                ?stdout_fd,
                "forked stage"
            );
            Ok(child)
        }
        ForkResult::Child => unsafe {
            exec_in_child(&program_c, &argv_ptrs, stdin_fd, stdout_fd, prefix.as_bytes())
        },
    }
}

unsafe fn exec_in_child(
    program: &CString,
    argv: &[*const c_char],
    stdin_fd: Option<RawFd>,
    stdout_fd: Option<RawFd>,
    prefix: &[u8],
) -> ! {
    unsafe {
        if let Some(fd) = stdin_fd {
            if fd != libc::STDIN_FILENO && libc::dup2(fd, libc::STDIN_FILENO) < 0 {
                child_fail(prefix, b"dup2 stdin: ", EXIT_REDIRECT_FAILED);
            }
        }
        if let Some(fd) = stdout_fd {
            if fd != libc::STDOUT_FILENO && libc::dup2(fd, libc::STDOUT_FILENO) < 0 {
                child_fail(prefix, b"dup2 stdout: ", EXIT_REDIRECT_FAILED);
            }
        }

        // The Rust runtime ignores SIGPIPE and ignored dispositions survive
        // exec; stages expect the default.
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);

        libc::execvp(program.as_ptr(), argv.as_ptr());
        child_fail(prefix, b"execvp: ", EXIT_EXEC_FAILED)
    }
}

fn child_fail(prefix: &[u8], what: &[u8], code: i32) -> ! {
    let errno = Errno::last();
    write_stderr(prefix);
    write_stderr(what);
    write_stderr(errno.desc().as_bytes());
    write_stderr(b"\n");
    unsafe { libc::_exit(code) }
}

fn write_stderr(bytes: &[u8]) {
    // SAFETY: plain write(2) on a borrowed slice.
    unsafe {
        libc::write(libc::STDERR_FILENO, bytes.as_ptr().cast(), bytes.len());
    }
}
