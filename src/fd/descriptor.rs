//! Descriptor Capability and Slot Flags
//!
//! Defines the boundary between the descriptor table and the kernel I/O
//! objects it holds.
//!
//! # Ownership
//! ```text
//! ┌──────────────┐      ┌──────────────────────────┐
//! │ table slot 3 │─────▶│                          │
//! ├──────────────┤      │  Arc<dyn Descriptor>     │
//! │ table slot 5 │─────▶│  (pipe, socket, device)  │
//! └──────────────┘      │                          │
//! ┌──────────────┐      │  strong count = number   │
//! │ child slot 3 │─────▶│  of slots referring to it│
//! └──────────────┘      └──────────────────────────┘
//! ```
//! The table only clones (acquire) and drops (release) the handle. The
//! object's teardown is its `Drop`, run when the last reference goes.

use alloc::sync::Arc;
use core::fmt;

use bitflags::bitflags;

bitflags! {
    /// Per-slot flags, independent of the underlying object.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FdFlags: u32 {
        /// Close the slot when the process commits to a new image.
        const CLOEXEC = 1 << 0;
        /// Leave the slot free in the child of a fork.
        const CLOFORK = 1 << 1;
    }
}

bitflags! {
    /// Readiness reported by [`Descriptor::poll`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PollEvents: u16 {
        /// Data can be read without blocking.
        const IN = 1 << 0;
        /// Data can be written without blocking.
        const OUT = 1 << 2;
        /// An error condition is pending.
        const ERR = 1 << 3;
        /// The peer hung up.
        const HUP = 1 << 4;
    }
}

/// Kind of kernel object behind a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    /// Regular file.
    File,
    /// Read or write end of a pipe.
    Pipe,
    /// Connected socket.
    Socket,
    /// Character device.
    Device,
}

/// Result of [`Descriptor::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Object kind.
    pub kind: DescriptorKind,
    /// Bytes available (files: length, pipes: buffered bytes).
    pub size: u64,
}

/// Error type for descriptor I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    /// The object does not support this operation.
    NotSupported,
    /// The operation would block.
    WouldBlock,
    /// The peer end is gone.
    BrokenPipe,
    /// Invalid argument.
    InvalidInput,
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSupported => write!(f, "operation not supported"),
            Self::WouldBlock => write!(f, "operation would block"),
            Self::BrokenPipe => write!(f, "broken pipe"),
            Self::InvalidInput => write!(f, "invalid input"),
        }
    }
}

/// Result type for descriptor I/O.
pub type IoResult<T> = Result<T, IoError>;

/// A kernel I/O object reachable through a descriptor.
///
/// Objects are shared between slots, tables and threads, so every
/// operation takes `&self` and implementations use interior mutability.
pub trait Descriptor: Send + Sync {
    /// Kind of the object.
    fn kind(&self) -> DescriptorKind;

    /// Read bytes into `buf`, returning the count read (0 at end of file).
    fn read(&self, _buf: &mut [u8]) -> IoResult<usize> {
        Err(IoError::NotSupported)
    }

    /// Write bytes from `buf`, returning the count written.
    fn write(&self, _buf: &[u8]) -> IoResult<usize> {
        Err(IoError::NotSupported)
    }

    /// Describe the object.
    fn stat(&self) -> Stat {
        Stat {
            kind: self.kind(),
            size: 0,
        }
    }

    /// Report readiness without blocking.
    fn poll(&self) -> PollEvents {
        PollEvents::IN | PollEvents::OUT
    }
}

/// Shared-ownership handle to a descriptor object.
pub type DescriptorRef = Arc<dyn Descriptor>;

/// Whether two handles refer to the same object.
#[inline]
pub fn same_object(a: &DescriptorRef, b: &DescriptorRef) -> bool {
    Arc::ptr_eq(a, b)
}
