//! Kernel Synchronization Primitives
//!
//! Provides the blocking lock used by per-process kernel structures and
//! the pending-signal state that lets a contended acquire be abandoned.
//!
//! # Design
//! - `KMutex<T>` wraps a spinlock; the guard is the only way to the data
//! - `lock_interruptible` gives up when the calling thread has a signal
//!   pending, without ever touching the protected value

mod mutex;
mod signal;

pub use mutex::{Interrupted, KMutex, KMutexGuard};
pub use signal::Signals;
