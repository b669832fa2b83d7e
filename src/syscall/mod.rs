//! Descriptor System Calls
//!
//! Translates POSIX-style descriptor syscalls into descriptor table
//! operations.
//!
//! # Security Model
//! - Whitelist approach: only explicitly implemented syscalls are allowed
//! - All parameters are validated before use
//! - Invalid inputs return errors, never panic
//! - A signal while waiting for the table lock yields `EINTR` and no
//!   side effects
//!
//! # Current Syscalls
//! - 3: close(fd)
//! - 32: dup(fd)
//! - 33: dup2(oldfd, newfd)
//! - 72: fcntl(fd, cmd, arg) - F_DUPFD, F_GETFD, F_SETFD, F_DUPFD_CLOEXEC
//! - 292: dup3(oldfd, newfd, flags)
//! - 436: closefrom(fd)
//! - open, pipe2, socketpair, read, write, fork, execve: typed entry points

mod handler;
mod validate;

pub use handler::{
    abi, dispatch, install_pair, numbers, sys_close, sys_closefrom, sys_dup, sys_dup2, sys_dup3,
    sys_execve_commit, sys_fcntl, sys_fork, sys_open, sys_pipe2, sys_read, sys_socketpair,
    sys_write, SyscallError, SyscallResult,
};
pub use validate::{validate_fd, validate_fd_flags, validate_open_flags};
