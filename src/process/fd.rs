// src/process/fd.rs

//! Descriptor hygiene.

use std::os::fd::{BorrowedFd, OwnedFd};

use nix::errno::Errno;
use nix::fcntl::{FcntlArg, FdFlag, fcntl};
use thiserror::Error;

/// Which half of the read-modify-write on the descriptor flags failed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HygieneError {
    #[error("fcntl(F_GETFD) failed: {0}")]
    GetFlags(Errno),

    #[error("fcntl(F_SETFD) failed: {0}")]
    SetFlags(Errno),
}

/// Mark `fd` close-on-exec, keeping every other descriptor flag.
///
/// If the flags cannot be read the descriptor is left untouched.
pub fn set_cloexec(fd: BorrowedFd<'_>) -> Result<(), HygieneError> {
    let current = fcntl(fd, FcntlArg::F_GETFD).map_err(HygieneError::GetFlags)?;
    let flags = FdFlag::from_bits_retain(current) | FdFlag::FD_CLOEXEC;
    fcntl(fd, FcntlArg::F_SETFD(flags)).map_err(HygieneError::SetFlags)?;
    Ok(())
}

/// Whether `fd` currently carries `FD_CLOEXEC`.
pub fn is_cloexec(fd: BorrowedFd<'_>) -> nix::Result<bool> {
    let current = fcntl(fd, FcntlArg::F_GETFD)?;
    Ok(FdFlag::from_bits_retain(current).contains(FdFlag::FD_CLOEXEC))
}

/// Allocate a pipe, returning `(read_end, write_end)`.
///
/// Where the platform allows it the pipe is created with `O_CLOEXEC`
/// atomically, so a fork on another thread cannot inherit it before
/// [`set_cloexec`] runs.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn open_pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn open_pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    nix::unistd::pipe()
}
