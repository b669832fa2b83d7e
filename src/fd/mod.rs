//! File Descriptor Tables
//!
//! Each process owns a table mapping small integers to shared kernel I/O
//! objects (files, pipes, sockets, devices).
//!
//! # Design
//! - Slots are free, reserved, or occupied
//! - An occupied slot holds one `Arc` reference to its object
//! - Per-slot flags (close-on-exec, close-on-fork) live in the table
//! - Fork copies the table; exec prunes it
//!
//! # Security Properties
//! - Objects are released only by dropping a reference (no double close)
//! - Reservations keep multi-descriptor syscalls all-or-nothing
//! - Descriptor numbers are stable for the lifetime of a binding

pub mod descriptor;
pub mod reservation;
mod state;
pub mod table;

pub use descriptor::{Descriptor, DescriptorKind, DescriptorRef, FdFlags, IoError, IoResult, PollEvents, Stat};
pub use reservation::Reservation;
pub use state::MIN_GROWTH;
pub use table::{DescriptorTable, FdError, FdResult, TableConfig, TableGuard, DEFAULT_LIMIT};
