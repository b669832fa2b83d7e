//! Kernel Mutex
//!
//! A thin layer over `spin::Mutex` adding a signal-interruptible acquire.
//!
//! # Security Considerations
//! - The protected value is only reachable through a guard
//! - An interrupted acquire never observes or mutates the value

use core::fmt;

use spin::{Mutex, MutexGuard};

use super::Signals;

/// Guard returned by [`KMutex`]; unlocking is dropping it.
pub type KMutexGuard<'a, T> = MutexGuard<'a, T>;

/// The acquire was abandoned because a signal arrived while waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "interrupted by signal")
    }
}

/// Blocking mutual exclusion usable from any kernel thread.
pub struct KMutex<T> {
    inner: Mutex<T>,
}

impl<T> KMutex<T> {
    /// Create a new unlocked mutex.
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Acquire the lock, spinning until it is available.
    #[inline]
    pub fn lock(&self) -> KMutexGuard<'_, T> {
        self.inner.lock()
    }

    /// Acquire the lock unless a signal is delivered while waiting.
    ///
    /// An uncontended lock is always acquired, even with a signal
    /// pending. Only a thread that would have to wait checks `signals`.
    pub fn lock_interruptible(&self, signals: &Signals) -> Result<KMutexGuard<'_, T>, Interrupted> {
        loop {
            if let Some(guard) = self.inner.try_lock() {
                return Ok(guard);
            }
            if signals.is_pending() {
                return Err(Interrupted);
            }
            core::hint::spin_loop();
        }
    }

    /// Try to acquire the lock without waiting.
    #[inline]
    pub fn try_lock(&self) -> Option<KMutexGuard<'_, T>> {
        self.inner.try_lock()
    }

    /// Access the value through an exclusive borrow, without locking.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// Whether some thread currently holds the lock.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

impl<T: Default> Default for KMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for KMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KMutex")
            .field("locked", &self.is_locked())
            .finish()
    }
}
