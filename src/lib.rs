//! PantherOS - Per-Process File Descriptor Table
//!
//! The descriptor layer of the PantherOS kernel: the table mapping small
//! integers to open objects, and the syscalls built on it.
//!
//! # Guarantees
//! - New descriptors always get the lowest free number at or above a bound
//! - Multi-descriptor syscalls (`pipe2`, `socketpair`) install all or nothing
//! - Objects are released outside the table lock
//! - A signal while waiting for the table lock aborts with `EINTR` and no
//!   side effects
//!
//! # Layout
//! - `sync`: kernel mutex and pending-signal state
//! - `fd`: descriptor objects, the table, reservations
//! - `io`: pipes, socket pairs, the null device
//! - `process`: the per-process view (table + signals)
//! - `syscall`: dispatch, validation, handlers

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod fd;
pub mod io;
pub mod process;
pub mod sync;
pub mod syscall;

pub use fd::{
    Descriptor, DescriptorKind, DescriptorRef, DescriptorTable, FdError, FdFlags, FdResult,
    Reservation, TableConfig, TableGuard,
};
pub use process::{Pid, Process};
pub use syscall::{SyscallError, SyscallResult};
