//! System Call Input Validation
//!
//! Turns raw register values into table arguments before anything touches
//! the descriptor table.
//!
//! # Security Principles
//! - Validate ALL inputs before use
//! - Fail-secure: unknown flag bits are rejected, not ignored
//! - Negative descriptors never reach the table as huge indices

use super::handler::{abi, SyscallError};
use crate::fd::FdFlags;

/// Validate a descriptor number.
///
/// Negative numbers are `EBADF`. Range against the table limit is the
/// table's business.
#[inline]
pub fn validate_fd(raw: i32) -> Result<usize, SyscallError> {
    usize::try_from(raw).map_err(|_| SyscallError::Ebadf)
}

/// Validate `FD_*` bits from `fcntl(F_SETFD)`.
pub fn validate_fd_flags(bits: usize) -> Result<FdFlags, SyscallError> {
    let bits = u32::try_from(bits).map_err(|_| SyscallError::Einval)?;
    if bits & !(abi::FD_CLOEXEC | abi::FD_CLOFORK) != 0 {
        return Err(SyscallError::Einval);
    }
    Ok(fd_flags_from_fd_bits(bits))
}

/// Validate `O_*` bits for calls that only accept descriptor flags
/// (`pipe2`, `dup3`, `socketpair`).
pub fn validate_open_flags(o_flags: u32) -> Result<FdFlags, SyscallError> {
    if o_flags & !(abi::O_CLOEXEC | abi::O_CLOFORK) != 0 {
        return Err(SyscallError::Einval);
    }
    Ok(fd_flags_from_open(o_flags))
}

/// Extract the descriptor flags from `open` flags. Other bits belong to
/// the file, not the slot.
pub fn fd_flags_from_open(o_flags: u32) -> FdFlags {
    let mut flags = FdFlags::empty();
    if o_flags & abi::O_CLOEXEC != 0 {
        flags |= FdFlags::CLOEXEC;
    }
    if o_flags & abi::O_CLOFORK != 0 {
        flags |= FdFlags::CLOFORK;
    }
    flags
}

/// Convert slot flags to the `FD_*` bits returned by `F_GETFD`.
pub fn fd_bits(flags: FdFlags) -> u32 {
    let mut bits = 0;
    if flags.contains(FdFlags::CLOEXEC) {
        bits |= abi::FD_CLOEXEC;
    }
    if flags.contains(FdFlags::CLOFORK) {
        bits |= abi::FD_CLOFORK;
    }
    bits
}

fn fd_flags_from_fd_bits(bits: u32) -> FdFlags {
    let mut flags = FdFlags::empty();
    if bits & abi::FD_CLOEXEC != 0 {
        flags |= FdFlags::CLOEXEC;
    }
    if bits & abi::FD_CLOFORK != 0 {
        flags |= FdFlags::CLOFORK;
    }
    flags
}

/// Validate the lower bound of `F_DUPFD`.
pub fn validate_min_index(arg: usize, limit: usize) -> Result<usize, SyscallError> {
    if arg >= limit || arg > i32::MAX as usize {
        return Err(SyscallError::Einval);
    }
    Ok(arg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_fd() {
        assert_eq!(validate_fd(-1), Err(SyscallError::Ebadf));
        assert_eq!(validate_fd(i32::MIN), Err(SyscallError::Ebadf));
        assert_eq!(validate_fd(0), Ok(0));
        assert_eq!(validate_fd(42), Ok(42));
    }

    #[test]
    fn test_fd_flags() {
        assert_eq!(validate_fd_flags(0), Ok(FdFlags::empty()));
        assert_eq!(
            validate_fd_flags((abi::FD_CLOEXEC | abi::FD_CLOFORK) as usize),
            Ok(FdFlags::CLOEXEC | FdFlags::CLOFORK)
        );
        assert_eq!(validate_fd_flags(4), Err(SyscallError::Einval));
        assert_eq!(validate_fd_flags(usize::MAX), Err(SyscallError::Einval));
        assert_eq!(fd_bits(FdFlags::CLOFORK), abi::FD_CLOFORK);
    }

    #[test]
    fn test_open_flags() {
        assert_eq!(validate_open_flags(abi::O_CLOEXEC), Ok(FdFlags::CLOEXEC));
        assert_eq!(validate_open_flags(0o1), Err(SyscallError::Einval));
        // open passes file flags through untouched
        assert_eq!(fd_flags_from_open(0o2 | abi::O_CLOFORK), FdFlags::CLOFORK);
    }

    #[test]
    fn test_min_index() {
        assert_eq!(validate_min_index(3, 1024), Ok(3));
        assert_eq!(validate_min_index(1024, 1024), Err(SyscallError::Einval));
        assert_eq!(validate_min_index(usize::MAX, usize::MAX), Err(SyscallError::Einval));
    }
}
