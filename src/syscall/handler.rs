//! System Call Handler
//!
//! Dispatches descriptor system calls and implements the handlers.
//!
//! # Security Considerations
//! - All syscall numbers are validated against the whitelist
//! - Unknown syscalls return ENOSYS
//! - Parameters are validated before the table is locked
//! - Syscalls that install several descriptors reserve first, so they
//!   never leave one end installed and the other missing

use alloc::sync::Arc;

use log::{trace, warn};

use super::validate::{
    fd_bits, fd_flags_from_open, validate_fd, validate_fd_flags, validate_min_index,
    validate_open_flags,
};
use crate::fd::{DescriptorRef, FdError, FdFlags, IoError};
use crate::io;
use crate::process::{Pid, Process};

/// System call numbers
pub mod numbers {
    pub const SYS_CLOSE: usize = 3;
    pub const SYS_DUP: usize = 32;
    pub const SYS_DUP2: usize = 33;
    pub const SYS_FCNTL: usize = 72;
    pub const SYS_DUP3: usize = 292;
    pub const SYS_CLOSEFROM: usize = 436;
}

/// Flag and command values shared with userland.
pub mod abi {
    /// `open`/`pipe2`/`dup3`: set close-on-exec on the new descriptor.
    pub const O_CLOEXEC: u32 = 0o2000000;
    /// `open`/`pipe2`/`dup3`: set close-on-fork on the new descriptor.
    pub const O_CLOFORK: u32 = 0o4000000;

    pub const FD_CLOEXEC: u32 = 1;
    pub const FD_CLOFORK: u32 = 2;

    pub const F_DUPFD: i32 = 0;
    pub const F_GETFD: i32 = 1;
    pub const F_SETFD: i32 = 2;
    pub const F_DUPFD_CLOEXEC: i32 = 1030;
}

/// System call error codes
#[repr(i64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    /// Interrupted by a signal
    Eintr = -4,
    /// Bad file descriptor
    Ebadf = -9,
    /// Operation would block
    Eagain = -11,
    /// Out of kernel memory
    Enomem = -12,
    /// Descriptor slot busy
    Ebusy = -16,
    /// Invalid argument
    Einval = -22,
    /// Too many open files
    Emfile = -24,
    /// Broken pipe
    Epipe = -32,
    /// Invalid system call number
    Enosys = -38,
}

impl From<FdError> for SyscallError {
    fn from(err: FdError) -> Self {
        match err {
            FdError::BadDescriptor => Self::Ebadf,
            FdError::TooManyOpen => Self::Emfile,
            FdError::OutOfMemory => Self::Enomem,
            FdError::Busy => Self::Ebusy,
            FdError::Interrupted => Self::Eintr,
        }
    }
}

impl From<IoError> for SyscallError {
    fn from(err: IoError) -> Self {
        match err {
            IoError::NotSupported | IoError::InvalidInput => Self::Einval,
            IoError::WouldBlock => Self::Eagain,
            IoError::BrokenPipe => Self::Epipe,
        }
    }
}

pub type SyscallResult<T> = Result<T, SyscallError>;

/// Dispatch a descriptor system call
///
/// # Arguments
/// * `process` - Calling thread's process
/// * `syscall_num` - System call number
/// * `args` - Raw argument registers
///
/// # Returns
/// Result value for the return register: non-negative on success,
/// negative errno on failure
pub fn dispatch(process: &Process, syscall_num: usize, args: &[usize; 6]) -> i64 {
    let result = match syscall_num {
        numbers::SYS_CLOSE => sys_close(process, args[0] as i32),
        numbers::SYS_DUP => sys_dup(process, args[0] as i32),
        numbers::SYS_DUP2 => sys_dup2(process, args[0] as i32, args[1] as i32),
        numbers::SYS_DUP3 => sys_dup3(process, args[0] as i32, args[1] as i32, args[2] as u32),
        numbers::SYS_FCNTL => sys_fcntl(process, args[0] as i32, args[1] as i32, args[2]),
        numbers::SYS_CLOSEFROM => sys_closefrom(process, args[0] as i32),
        _ => {
            warn!("[SYSCALL] Unknown syscall: {}", syscall_num);
            Err(SyscallError::Enosys)
        }
    };
    match result {
        Ok(value) => value as i64,
        Err(err) => {
            trace!("[SYSCALL] {} failed: {:?}", syscall_num, err);
            err as i64
        }
    }
}

/// Open system call, after path resolution.
///
/// A slot is reserved before `make` creates the object, so a full table
/// is reported before anything is opened, and a failing `make` leaves no
/// trace in the table.
pub fn sys_open<F>(process: &Process, o_flags: u32, make: F) -> SyscallResult<i32>
where
    F: FnOnce() -> SyscallResult<DescriptorRef>,
{
    let flags = fd_flags_from_open(o_flags);
    let table = process.fds();
    let mut reservation = table.lock_interruptible(process.signals())?.reserve(1)?;
    let descriptor = make()?;
    let fd = table.allocate_reserved(&mut reservation, descriptor, flags, 0);
    Ok(fd as i32)
}

/// Install two new objects as one unit.
///
/// Both descriptors appear or neither does.
pub fn install_pair<F>(process: &Process, flags: FdFlags, make: F) -> SyscallResult<[i32; 2]>
where
    F: FnOnce() -> SyscallResult<(DescriptorRef, DescriptorRef)>,
{
    let table = process.fds();
    let mut reservation = table.lock_interruptible(process.signals())?.reserve(2)?;
    let (first, second) = make()?;

    let mut guard = table.lock();
    let first = guard.allocate_reserved(&mut reservation, first, flags, 0);
    let second = guard.allocate_reserved(&mut reservation, second, flags, 0);
    drop(guard);

    trace!("[SYSCALL] installed pair [{}, {}]", first, second);
    Ok([first as i32, second as i32])
}

/// Pipe system call
///
/// # Returns
/// `[read_fd, write_fd]`
pub fn sys_pipe2(process: &Process, o_flags: u32) -> SyscallResult<[i32; 2]> {
    let flags = validate_open_flags(o_flags)?;
    install_pair(process, flags, || {
        let (reader, writer) = io::pipe();
        Ok((Arc::new(reader) as DescriptorRef, Arc::new(writer) as DescriptorRef))
    })
}

/// Socketpair system call (local stream sockets only).
pub fn sys_socketpair(process: &Process, o_flags: u32) -> SyscallResult<[i32; 2]> {
    let flags = validate_open_flags(o_flags)?;
    install_pair(process, flags, || {
        let (left, right) = io::socket_pair();
        Ok((Arc::new(left) as DescriptorRef, Arc::new(right) as DescriptorRef))
    })
}

/// Read system call, into an already-copied kernel buffer.
///
/// The table lock is only held to look the object up.
pub fn sys_read(process: &Process, fd: i32, buf: &mut [u8]) -> SyscallResult<usize> {
    let index = validate_fd(fd)?;
    let descriptor = process
        .fds()
        .lock_interruptible(process.signals())?
        .get(index)
        .ok_or(SyscallError::Ebadf)?;
    Ok(descriptor.read(buf)?)
}

/// Write system call, from an already-copied kernel buffer.
pub fn sys_write(process: &Process, fd: i32, buf: &[u8]) -> SyscallResult<usize> {
    let index = validate_fd(fd)?;
    let descriptor = process
        .fds()
        .lock_interruptible(process.signals())?
        .get(index)
        .ok_or(SyscallError::Ebadf)?;
    Ok(descriptor.write(buf)?)
}

/// Dup system call: lowest free descriptor, flags cleared.
pub fn sys_dup(process: &Process, fd: i32) -> SyscallResult<i32> {
    let index = validate_fd(fd)?;
    let mut guard = process.fds().lock_interruptible(process.signals())?;
    let new = guard.duplicate(index, FdFlags::empty(), 0)?;
    Ok(new as i32)
}

/// Dup2 system call
///
/// Duplicating a descriptor onto itself only checks that it is open.
pub fn sys_dup2(process: &Process, oldfd: i32, newfd: i32) -> SyscallResult<i32> {
    let old = validate_fd(oldfd)?;
    let new = validate_fd(newfd)?;
    let mut guard = process.fds().lock_interruptible(process.signals())?;
    if old == new {
        return if guard.is_good_entry(old) {
            Ok(newfd)
        } else {
            Err(SyscallError::Ebadf)
        };
    }
    guard.copy(old, new, FdFlags::empty())?;
    Ok(newfd)
}

/// Dup3 system call
pub fn sys_dup3(process: &Process, oldfd: i32, newfd: i32, o_flags: u32) -> SyscallResult<i32> {
    let flags = validate_open_flags(o_flags)?;
    let old = validate_fd(oldfd)?;
    let new = validate_fd(newfd)?;
    if old == new {
        return Err(SyscallError::Einval);
    }
    process
        .fds()
        .lock_interruptible(process.signals())?
        .copy(old, new, flags)?;
    Ok(newfd)
}

/// Close system call
pub fn sys_close(process: &Process, fd: i32) -> SyscallResult<i32> {
    let index = validate_fd(fd)?;
    process
        .fds()
        .lock_interruptible(process.signals())?
        .free(index)?;
    Ok(0)
}

/// Closefrom system call
pub fn sys_closefrom(process: &Process, fd: i32) -> SyscallResult<i32> {
    let index = validate_fd(fd)?;
    process
        .fds()
        .lock_interruptible(process.signals())?
        .close_from(index);
    Ok(0)
}

/// Fcntl system call (descriptor commands only)
pub fn sys_fcntl(process: &Process, fd: i32, cmd: i32, arg: usize) -> SyscallResult<i32> {
    let index = validate_fd(fd)?;
    let mut guard = process.fds().lock_interruptible(process.signals())?;
    match cmd {
        abi::F_GETFD => Ok(fd_bits(guard.flags(index)?) as i32),
        abi::F_SETFD => {
            let flags = validate_fd_flags(arg)?;
            guard.set_flags(index, flags)?;
            Ok(0)
        }
        abi::F_DUPFD | abi::F_DUPFD_CLOEXEC => {
            if !guard.is_good_entry(index) {
                return Err(SyscallError::Ebadf);
            }
            let min_index = validate_min_index(arg, guard.limit())?;
            let flags = if cmd == abi::F_DUPFD_CLOEXEC {
                FdFlags::CLOEXEC
            } else {
                FdFlags::empty()
            };
            Ok(guard.duplicate(index, flags, min_index)? as i32)
        }
        _ => {
            warn!("[SYSCALL] fcntl: unsupported command {}", cmd);
            Err(SyscallError::Einval)
        }
    }
}

/// Fork system call, descriptor part: the child's inherited table.
pub fn sys_fork(process: &Process, child: Pid) -> SyscallResult<Process> {
    Ok(process.fork(child)?)
}

/// Execve system call, at the point the new image is committed.
pub fn sys_execve_commit(process: &Process) -> SyscallResult<i32> {
    process.commit_exec();
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fd::TableConfig;
    use crate::io::NullDevice;

    fn process() -> Process {
        Process::new(Pid::new(1), TableConfig::DEFAULT).unwrap()
    }

    fn open_null(process: &Process, o_flags: u32) -> i32 {
        sys_open(process, o_flags, || Ok(Arc::new(NullDevice) as DescriptorRef)).unwrap()
    }

    fn args(a: usize, b: usize, c: usize) -> [usize; 6] {
        [a, b, c, 0, 0, 0]
    }

    #[test]
    fn test_unknown_syscall() {
        let proc = process();
        assert_eq!(dispatch(&proc, 9999, &[0; 6]), SyscallError::Enosys as i64);
    }

    #[test]
    fn test_open_and_close() {
        let proc = process();
        assert_eq!(open_null(&proc, 0), 0);
        assert_eq!(open_null(&proc, 0), 1);
        assert_eq!(dispatch(&proc, numbers::SYS_CLOSE, &args(0, 0, 0)), 0);
        assert_eq!(
            dispatch(&proc, numbers::SYS_CLOSE, &args(0, 0, 0)),
            SyscallError::Ebadf as i64
        );
        assert_eq!(
            dispatch(&proc, numbers::SYS_CLOSE, &args(-1i32 as usize, 0, 0)),
            SyscallError::Ebadf as i64
        );
        assert_eq!(open_null(&proc, 0), 0);
    }

    #[test]
    fn test_failed_open_leaves_no_trace() {
        let proc = process();
        let result = sys_open(&proc, 0, || Err(SyscallError::Enomem));
        assert_eq!(result, Err(SyscallError::Enomem));
        assert_eq!(proc.fds().reserved_count(), 0);
        assert_eq!(proc.fds().occupied_count(), 0);
        assert_eq!(open_null(&proc, 0), 0);
    }

    #[test]
    fn test_open_when_full_does_not_create() {
        let proc = Process::new(
            Pid::new(1),
            TableConfig {
                limit: 1,
                initial_capacity: 1,
            },
        )
        .unwrap();
        open_null(&proc, 0);
        let mut created = false;
        let result = sys_open(&proc, 0, || {
            created = true;
            Ok(Arc::new(NullDevice) as DescriptorRef)
        });
        assert_eq!(result, Err(SyscallError::Emfile));
        assert!(!created);
    }

    #[test]
    fn test_pipe_roundtrip() {
        let proc = process();
        let [read_fd, write_fd] = sys_pipe2(&proc, abi::O_CLOEXEC).unwrap();
        assert_eq!((read_fd, write_fd), (0, 1));
        assert_eq!(sys_write(&proc, write_fd, b"abc"), Ok(3));
        let mut buf = [0u8; 8];
        assert_eq!(sys_read(&proc, read_fd, &mut buf), Ok(3));
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(sys_read(&proc, read_fd, &mut buf), Err(SyscallError::Eagain));
        assert_eq!(
            sys_fcntl(&proc, read_fd, abi::F_GETFD, 0),
            Ok(abi::FD_CLOEXEC as i32)
        );
        assert_eq!(sys_write(&proc, read_fd, b"x"), Err(SyscallError::Einval));

        sys_close(&proc, read_fd).unwrap();
        assert_eq!(sys_write(&proc, write_fd, b"x"), Err(SyscallError::Epipe));
    }

    #[test]
    fn test_pipe_rejects_unknown_flags() {
        let proc = process();
        assert_eq!(sys_pipe2(&proc, 0o1), Err(SyscallError::Einval));
        assert!(proc.fds().is_empty());
    }

    #[test]
    fn test_pipe_exhaustion_installs_nothing() {
        let proc = Process::new(
            Pid::new(1),
            TableConfig {
                limit: 3,
                initial_capacity: 0,
            },
        )
        .unwrap();
        open_null(&proc, 0);
        open_null(&proc, 0);
        assert_eq!(sys_pipe2(&proc, 0), Err(SyscallError::Emfile));
        assert_eq!(proc.fds().occupied_count(), 2);
        assert_eq!(proc.fds().reserved_count(), 0);
    }

    #[test]
    fn test_pair_construction_failure_installs_nothing() {
        let proc = process();
        let result = install_pair(&proc, FdFlags::empty(), || Err(SyscallError::Enomem));
        assert_eq!(result, Err(SyscallError::Enomem));
        assert!(proc.fds().is_empty());
        assert_eq!(proc.fds().reserved_count(), 0);
    }

    #[test]
    fn test_socketpair() {
        let proc = process();
        let [left, right] = sys_socketpair(&proc, abi::O_CLOFORK).unwrap();
        assert_eq!(sys_write(&proc, left, b"hi"), Ok(2));
        let mut buf = [0u8; 2];
        assert_eq!(sys_read(&proc, right, &mut buf), Ok(2));
        assert_eq!(
            sys_fcntl(&proc, right, abi::F_GETFD, 0),
            Ok(abi::FD_CLOFORK as i32)
        );
    }

    #[test]
    fn test_dup_family() {
        let proc = process();
        let fd = open_null(&proc, abi::O_CLOEXEC);
        assert_eq!(dispatch(&proc, numbers::SYS_DUP, &args(0, 0, 0)), 1);
        assert_eq!(sys_fcntl(&proc, 1, abi::F_GETFD, 0), Ok(0));

        // dup2 onto itself leaves the flags alone
        assert_eq!(sys_dup2(&proc, fd, fd), Ok(fd));
        assert_eq!(
            sys_fcntl(&proc, fd, abi::F_GETFD, 0),
            Ok(abi::FD_CLOEXEC as i32)
        );
        assert_eq!(sys_dup2(&proc, 9, 9), Err(SyscallError::Ebadf));

        assert_eq!(dispatch(&proc, numbers::SYS_DUP2, &args(0, 20, 0)), 20);
        assert_eq!(sys_dup3(&proc, 0, 0, 0), Err(SyscallError::Einval));
        assert_eq!(sys_dup3(&proc, 0, 20, abi::O_CLOEXEC), Ok(20));
        assert_eq!(
            sys_fcntl(&proc, 20, abi::F_GETFD, 0),
            Ok(abi::FD_CLOEXEC as i32)
        );
        assert_eq!(sys_dup2(&proc, 5, 6), Err(SyscallError::Ebadf));
        assert_eq!(sys_dup2(&proc, 0, -1), Err(SyscallError::Ebadf));
        assert_eq!(proc.fds().occupied_count(), 3);
    }

    #[test]
    fn test_fcntl() {
        let proc = process();
        let fd = open_null(&proc, 0);
        assert_eq!(sys_fcntl(&proc, fd, abi::F_DUPFD, 10), Ok(10));
        assert_eq!(sys_fcntl(&proc, fd, abi::F_DUPFD, 10), Ok(11));
        assert_eq!(sys_fcntl(&proc, fd, abi::F_DUPFD_CLOEXEC, 0), Ok(1));
        assert_eq!(
            sys_fcntl(&proc, 1, abi::F_GETFD, 0),
            Ok(abi::FD_CLOEXEC as i32)
        );
        assert_eq!(
            sys_fcntl(&proc, fd, abi::F_SETFD, abi::FD_CLOFORK as usize),
            Ok(0)
        );
        assert_eq!(
            sys_fcntl(&proc, fd, abi::F_GETFD, 0),
            Ok(abi::FD_CLOFORK as i32)
        );
        assert_eq!(sys_fcntl(&proc, fd, abi::F_SETFD, 8), Err(SyscallError::Einval));
        assert_eq!(sys_fcntl(&proc, fd, abi::F_DUPFD, 4096), Err(SyscallError::Einval));
        assert_eq!(sys_fcntl(&proc, 50, abi::F_DUPFD, 0), Err(SyscallError::Ebadf));
        assert_eq!(sys_fcntl(&proc, 50, abi::F_GETFD, 0), Err(SyscallError::Ebadf));
        assert_eq!(sys_fcntl(&proc, fd, 999, 0), Err(SyscallError::Einval));
    }

    #[test]
    fn test_closefrom() {
        let proc = process();
        for _ in 0..4 {
            open_null(&proc, 0);
        }
        assert_eq!(
            dispatch(&proc, numbers::SYS_CLOSEFROM, &args(-3i32 as usize, 0, 0)),
            SyscallError::Ebadf as i64
        );
        assert_eq!(dispatch(&proc, numbers::SYS_CLOSEFROM, &args(1, 0, 0)), 0);
        assert_eq!(proc.fds().occupied_count(), 1);
        assert_eq!(dispatch(&proc, numbers::SYS_CLOSEFROM, &args(1, 0, 0)), 0);
    }

    #[test]
    fn test_fork_then_exec() {
        let parent = process();
        open_null(&parent, 0);
        open_null(&parent, abi::O_CLOFORK);
        open_null(&parent, abi::O_CLOEXEC);

        let child = sys_fork(&parent, Pid::new(2)).unwrap();
        assert!(child.fds().get(0).is_some());
        assert!(child.fds().get(1).is_none());
        assert!(child.fds().get(2).is_some());

        assert_eq!(sys_execve_commit(&child), Ok(0));
        assert!(child.fds().get(2).is_none());
        assert!(parent.fds().get(2).is_some());
        assert_eq!(open_null(&child, 0), 1);
    }

    #[test]
    fn test_signal_while_contended_is_eintr() {
        let proc = process();
        open_null(&proc, 0);
        let held = proc.fds().lock();
        proc.signals().raise(2);
        assert_eq!(
            dispatch(&proc, numbers::SYS_CLOSE, &args(0, 0, 0)),
            SyscallError::Eintr as i64
        );
        assert_eq!(sys_pipe2(&proc, 0), Err(SyscallError::Eintr));
        drop(held);
        assert_eq!(proc.fds().occupied_count(), 1);
        assert_eq!(proc.fds().reserved_count(), 0);
        assert_eq!(sys_close(&proc, 0), Ok(0));
    }

    #[test]
    fn test_fork_while_contended_is_eintr() {
        let parent = process();
        open_null(&parent, 0);
        let held = parent.fds().lock();
        parent.signals().raise(2);
        assert_eq!(
            sys_fork(&parent, Pid::new(2)).err(),
            Some(SyscallError::Eintr)
        );
        drop(held);

        parent.signals().take();
        let child = sys_fork(&parent, Pid::new(2)).unwrap();
        assert!(child.fds().get(0).is_some());
    }
}
