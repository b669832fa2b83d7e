//! Pending Signal State
//!
//! One bit per signal number, shared by every thread of a process.

use core::sync::atomic::{AtomicU64, Ordering};

/// Highest signal number that can be recorded.
pub const MAX_SIGNAL: u32 = 63;

/// Pending-signal bitmask for a process.
#[derive(Debug, Default)]
pub struct Signals {
    pending: AtomicU64,
}

impl Signals {
    /// Create an empty signal set.
    pub const fn new() -> Self {
        Self {
            pending: AtomicU64::new(0),
        }
    }

    /// Mark `signo` pending. Out-of-range numbers are ignored.
    pub fn raise(&self, signo: u32) {
        if signo == 0 || signo > MAX_SIGNAL {
            return;
        }
        self.pending.fetch_or(1 << signo, Ordering::AcqRel);
    }

    /// Clear `signo` if pending.
    pub fn clear(&self, signo: u32) {
        if signo == 0 || signo > MAX_SIGNAL {
            return;
        }
        self.pending.fetch_and(!(1 << signo), Ordering::AcqRel);
    }

    /// Whether any signal is pending.
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire) != 0
    }

    /// Take and clear every pending signal.
    pub fn take(&self) -> u64 {
        self.pending.swap(0, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raise_and_clear() {
        let signals = Signals::new();
        assert!(!signals.is_pending());
        signals.raise(9);
        assert!(signals.is_pending());
        signals.clear(9);
        assert!(!signals.is_pending());
    }

    #[test]
    fn test_invalid_numbers_ignored() {
        let signals = Signals::new();
        signals.raise(0);
        signals.raise(64);
        assert!(!signals.is_pending());
    }

    #[test]
    fn test_take_drains() {
        let signals = Signals::new();
        signals.raise(1);
        signals.raise(3);
        assert_eq!(signals.take(), (1 << 1) | (1 << 3));
        assert!(!signals.is_pending());
    }
}
