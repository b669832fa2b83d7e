//! Per-Process Descriptor Table
//!
//! Maps small integer descriptors to shared kernel I/O objects.
//!
//! # Design
//! - One table-wide lock; every operation runs under it
//! - Lowest free index first, with a `first_not_taken` hint
//! - Reservations make multi-descriptor syscalls all-or-nothing
//! - References released under the lock are dropped after unlocking
//!
//! # Security Properties
//! - A slot owns exactly one reference to its object (no use-after-free)
//! - Two allocations never receive the same index
//! - No operation leaves the table half-mutated on failure

use alloc::vec::Vec;
use core::fmt;

use log::{debug, trace};

use super::descriptor::{DescriptorRef, FdFlags};
use super::reservation::Reservation;
use super::state::TableState;
use crate::sync::{Interrupted, KMutex, KMutexGuard, Signals};

/// Default per-process descriptor limit (RLIMIT_NOFILE).
pub const DEFAULT_LIMIT: usize = 1024;

/// Error type for descriptor table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdError {
    /// The index does not hold an object.
    BadDescriptor,
    /// The per-process descriptor limit is reached.
    TooManyOpen,
    /// The table storage could not grow.
    OutOfMemory,
    /// The target slot is reserved by an in-flight operation.
    Busy,
    /// A signal arrived while waiting for the table lock.
    Interrupted,
}

impl fmt::Display for FdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadDescriptor => write!(f, "bad file descriptor"),
            Self::TooManyOpen => write!(f, "too many open files"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::Busy => write!(f, "descriptor slot busy"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

impl From<Interrupted> for FdError {
    fn from(_: Interrupted) -> Self {
        Self::Interrupted
    }
}

/// Result type for descriptor table operations.
pub type FdResult<T> = Result<T, FdError>;

/// Table construction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableConfig {
    /// New descriptors must be below this index.
    pub limit: usize,
    /// Slots allocated up front.
    pub initial_capacity: usize,
}

impl TableConfig {
    pub const DEFAULT: Self = Self {
        limit: DEFAULT_LIMIT,
        initial_capacity: 0,
    };
}

impl Default for TableConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Descriptor table of one process, shared by its threads.
pub struct DescriptorTable {
    state: KMutex<TableState>,
}

impl DescriptorTable {
    /// Create an empty table with the default limit.
    pub const fn new() -> Self {
        Self {
            state: KMutex::new(TableState::new(DEFAULT_LIMIT)),
        }
    }

    /// Create an empty table, allocating `initial_capacity` slots.
    pub fn with_config(config: TableConfig) -> FdResult<Self> {
        let mut state = TableState::new(config.limit);
        if config.initial_capacity > 0 {
            state.enlargen(0, config.initial_capacity.min(config.limit))?;
        }
        Ok(Self {
            state: KMutex::new(state),
        })
    }

    /// Lock the table for a sequence of operations.
    pub fn lock(&self) -> TableGuard<'_> {
        TableGuard {
            state: self.state.lock(),
            released: Vec::new(),
            table: self,
        }
    }

    /// Lock the table unless a signal arrives while waiting.
    pub fn lock_interruptible(&self, signals: &Signals) -> FdResult<TableGuard<'_>> {
        Ok(TableGuard {
            state: self.state.lock_interruptible(signals)?,
            released: Vec::new(),
            table: self,
        })
    }

    /// The object at `index`, with a reference the caller must drop.
    pub fn get(&self, index: usize) -> Option<DescriptorRef> {
        self.lock().get(index)
    }

    /// Reserve `count` slots for later allocation.
    pub fn reserve(&self, count: usize) -> FdResult<Reservation<'_>> {
        self.lock().reserve(count)
    }

    /// Release the unconsumed slots of `reservation`.
    pub fn unreserve(&self, reservation: Reservation<'_>) {
        self.lock().unreserve(reservation);
    }

    /// Bind `descriptor` to the lowest free index at or above `min_index`.
    pub fn allocate(
        &self,
        descriptor: DescriptorRef,
        flags: FdFlags,
        min_index: usize,
    ) -> FdResult<usize> {
        self.lock().allocate(descriptor, flags, min_index)
    }

    /// Bind `descriptor` to a slot of `reservation`. Cannot fail.
    pub fn allocate_reserved(
        &self,
        reservation: &mut Reservation<'_>,
        descriptor: DescriptorRef,
        flags: FdFlags,
        min_index: usize,
    ) -> usize {
        self.lock()
            .allocate_reserved(reservation, descriptor, flags, min_index)
    }

    /// Bind the object at `src` to the lowest free index at or above
    /// `min_index`.
    pub fn duplicate(&self, src: usize, flags: FdFlags, min_index: usize) -> FdResult<usize> {
        self.lock().duplicate(src, flags, min_index)
    }

    /// Bind the object at `src` to a slot of `reservation`.
    pub fn duplicate_reserved(
        &self,
        reservation: &mut Reservation<'_>,
        src: usize,
        flags: FdFlags,
        min_index: usize,
    ) -> FdResult<usize> {
        self.lock()
            .duplicate_reserved(reservation, src, flags, min_index)
    }

    /// Bind `to` to the object at `from`, closing what `to` held.
    pub fn copy(&self, from: usize, to: usize, flags: FdFlags) -> FdResult<()> {
        self.lock().copy(from, to, flags)
    }

    /// Close `index`.
    pub fn free(&self, index: usize) -> FdResult<()> {
        self.lock().free(index)
    }

    /// Remove `index` from the table, handing its reference to the caller.
    pub fn free_keep(&self, index: usize) -> FdResult<DescriptorRef> {
        self.lock().free_keep(index)
    }

    pub fn flags(&self, index: usize) -> FdResult<FdFlags> {
        self.lock().flags(index)
    }

    pub fn set_flags(&self, index: usize, flags: FdFlags) -> FdResult<()> {
        self.lock().set_flags(index, flags)
    }

    /// Nearest occupied index below `cursor`; `None` starts at the end.
    pub fn previous(&self, cursor: Option<usize>) -> Option<usize> {
        self.lock().previous(cursor)
    }

    /// Nearest occupied index above `cursor`; `None` starts at the start.
    pub fn next(&self, cursor: Option<usize>) -> Option<usize> {
        self.lock().next(cursor)
    }

    /// Close every descriptor at or above `index`. Returns how many.
    pub fn close_from(&self, index: usize) -> usize {
        self.lock().close_from(index)
    }

    /// Close every close-on-exec descriptor. Returns how many.
    pub fn on_execute(&self) -> usize {
        self.lock().on_execute()
    }

    /// Independent copy for a forked child.
    pub fn fork(&self) -> FdResult<Self> {
        self.lock().fork()
    }

    pub fn limit(&self) -> usize {
        self.lock().limit()
    }

    /// Change the limit for new descriptors. Existing ones stay valid.
    pub fn set_limit(&self, limit: usize) {
        self.lock().set_limit(limit);
    }

    /// Highest index ever used, plus one.
    pub fn entries_used(&self) -> usize {
        self.lock().entries_used()
    }

    pub fn is_empty(&self) -> bool {
        self.occupied_count() == 0
    }

    pub fn occupied_count(&self) -> usize {
        self.lock().occupied_count()
    }

    pub fn reserved_count(&self) -> usize {
        self.lock().reserved_count()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DescriptorTable {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        debug!(
            "[FD] table dropped, releasing {} descriptors",
            state.occupied_count()
        );
    }
}

impl fmt::Debug for DescriptorTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.try_lock() {
            Some(state) => f
                .debug_struct("DescriptorTable")
                .field("entries_used", &state.entries_used())
                .field("capacity", &state.capacity())
                .field("reserved", &state.reserved_count())
                .field("limit", &state.limit())
                .finish(),
            None => f.debug_struct("DescriptorTable").finish_non_exhaustive(),
        }
    }
}

/// Locked view of a [`DescriptorTable`].
///
/// References released through the guard are dropped after the lock is
/// released, so an object's teardown never runs under the table lock.
pub struct TableGuard<'a> {
    // Field order is drop order: unlock first, then release.
    state: KMutexGuard<'a, TableState>,
    released: Vec<DescriptorRef>,
    table: &'a DescriptorTable,
}

impl<'a> TableGuard<'a> {
    pub fn get(&self, index: usize) -> Option<DescriptorRef> {
        self.state.get(index)
    }

    /// Whether `index` holds an object.
    pub fn is_good_entry(&self, index: usize) -> bool {
        self.state.is_good_entry(index)
    }

    pub fn reserve(&mut self, count: usize) -> FdResult<Reservation<'a>> {
        let slots = self.state.reserve(count)?;
        Ok(Reservation::new(self.table, slots))
    }

    pub fn unreserve(&mut self, mut reservation: Reservation<'_>) {
        assert!(
            reservation.belongs_to(self.table),
            "reservation belongs to another table"
        );
        self.state.unreserve(reservation.slots_mut());
    }

    pub(crate) fn release_slots(&mut self, slots: &mut Vec<usize>) {
        self.state.unreserve(slots);
    }

    pub fn allocate(
        &mut self,
        descriptor: DescriptorRef,
        flags: FdFlags,
        min_index: usize,
    ) -> FdResult<usize> {
        self.state.allocate(descriptor, flags, min_index)
    }

    /// # Panics
    /// If `reservation` belongs to another table or has no slot at or
    /// above `min_index`.
    pub fn allocate_reserved(
        &mut self,
        reservation: &mut Reservation<'_>,
        descriptor: DescriptorRef,
        flags: FdFlags,
        min_index: usize,
    ) -> usize {
        assert!(
            reservation.belongs_to(self.table),
            "reservation belongs to another table"
        );
        self.state
            .allocate_reserved(reservation.slots_mut(), descriptor, flags, min_index)
    }

    pub fn duplicate(&mut self, src: usize, flags: FdFlags, min_index: usize) -> FdResult<usize> {
        let descriptor = self.state.get(src).ok_or(FdError::BadDescriptor)?;
        self.state.allocate(descriptor, flags, min_index)
    }

    pub fn duplicate_reserved(
        &mut self,
        reservation: &mut Reservation<'_>,
        src: usize,
        flags: FdFlags,
        min_index: usize,
    ) -> FdResult<usize> {
        let descriptor = self.state.get(src).ok_or(FdError::BadDescriptor)?;
        Ok(self.allocate_reserved(reservation, descriptor, flags, min_index))
    }

    pub fn copy(&mut self, from: usize, to: usize, flags: FdFlags) -> FdResult<()> {
        if let Some(old) = self.state.copy(from, to, flags)? {
            self.released.push(old);
        }
        Ok(())
    }

    pub fn free(&mut self, index: usize) -> FdResult<()> {
        let descriptor = self.state.take(index)?;
        self.released.push(descriptor);
        Ok(())
    }

    pub fn free_keep(&mut self, index: usize) -> FdResult<DescriptorRef> {
        self.state.take(index)
    }

    pub fn flags(&self, index: usize) -> FdResult<FdFlags> {
        self.state.flags(index)
    }

    pub fn set_flags(&mut self, index: usize, flags: FdFlags) -> FdResult<()> {
        self.state.set_flags(index, flags)
    }

    pub fn previous(&self, cursor: Option<usize>) -> Option<usize> {
        self.state.previous(cursor)
    }

    pub fn next(&self, cursor: Option<usize>) -> Option<usize> {
        self.state.next(cursor)
    }

    pub fn close_from(&mut self, index: usize) -> usize {
        let closed = self
            .state
            .close_matching(index, |_| true, &mut self.released);
        trace!("[FD] closefrom({}) closed {}", index, closed);
        closed
    }

    pub fn on_execute(&mut self) -> usize {
        let closed = self.state.close_matching(
            0,
            |flags| flags.contains(FdFlags::CLOEXEC),
            &mut self.released,
        );
        debug!("[FD] exec closed {} close-on-exec descriptors", closed);
        closed
    }

    pub fn fork(&self) -> FdResult<DescriptorTable> {
        let child = self.state.fork()?;
        debug!(
            "[FD] forked table: {} of {} descriptors inherited",
            child.occupied_count(),
            self.state.occupied_count()
        );
        Ok(DescriptorTable {
            state: KMutex::new(child),
        })
    }

    pub fn limit(&self) -> usize {
        self.state.limit()
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.state.set_limit(limit);
    }

    pub fn entries_used(&self) -> usize {
        self.state.entries_used()
    }

    pub fn is_empty(&self) -> bool {
        self.state.occupied_count() == 0
    }

    pub fn occupied_count(&self) -> usize {
        self.state.occupied_count()
    }

    pub fn reserved_count(&self) -> usize {
        self.state.reserved_count()
    }

    pub fn capacity(&self) -> usize {
        self.state.capacity()
    }
}

impl fmt::Debug for TableGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableGuard")
            .field("entries_used", &self.state.entries_used())
            .field("released", &self.released.len())
            .finish()
    }
}
