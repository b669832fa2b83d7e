//! Slot Reservations
//!
//! A reservation pre-commits table slots before anything externally
//! visible happens, so a syscall that installs several descriptors either
//! installs all of them or none.
//!
//! Dropping a reservation returns its unconsumed slots to the table.

use alloc::vec::Vec;
use core::fmt;

use log::debug;

use super::table::DescriptorTable;

/// Slots held for a later allocation.
///
/// # Deadlock
/// Dropping a non-empty reservation locks its table. Never let one drop
/// while the same thread holds a [`TableGuard`](super::TableGuard) on that
/// table; hand it to [`TableGuard::unreserve`](super::TableGuard::unreserve)
/// instead.
#[must_use = "dropping a reservation immediately releases its slots"]
pub struct Reservation<'t> {
    table: &'t DescriptorTable,
    /// Reserved indices, ascending.
    slots: Vec<usize>,
}

impl<'t> Reservation<'t> {
    pub(crate) fn new(table: &'t DescriptorTable, slots: Vec<usize>) -> Self {
        Self { table, slots }
    }

    /// Slots not yet consumed.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The unconsumed slot indices, ascending.
    #[inline]
    pub fn slots(&self) -> &[usize] {
        &self.slots
    }

    #[inline]
    pub(crate) fn belongs_to(&self, table: &DescriptorTable) -> bool {
        core::ptr::eq(self.table, table)
    }

    #[inline]
    pub(crate) fn slots_mut(&mut self) -> &mut Vec<usize> {
        &mut self.slots
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.slots.is_empty() {
            return;
        }
        debug!("[FD] releasing unused reservation {:?}", self.slots);
        self.table.lock().release_slots(&mut self.slots);
    }
}

impl fmt::Debug for Reservation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation")
            .field("slots", &self.slots)
            .finish()
    }
}
