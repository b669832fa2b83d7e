//! Descriptor Table State
//!
//! The slot array and its bookkeeping, without any locking. Everything in
//! here runs with the table lock held.
//!
//! # Layout
//! ```text
//!  index:   0     1     2     3     4     5     6     7
//!         ┌─────┬─────┬─────┬─────┬─────┬─────┬─────┬─────┐
//!         │ occ │ occ │ res │ free│ occ │ free│ free│ free│
//!         └─────┴─────┴─────┴─────┴─────┴─────┴─────┴─────┘
//!                             ▲                 ▲           ▲
//!                   first_not_taken       entries_used  entries.len()
//! ```
//! - Every index below `first_not_taken` is reserved or occupied
//! - Every index at or above `entries_used` is free
//! - Capacity only grows

use alloc::vec::Vec;

use log::{trace, warn};

use super::descriptor::{DescriptorRef, FdFlags};
use super::table::{FdError, FdResult};

/// Smallest number of slots added by one growth step.
pub const MIN_GROWTH: usize = 8;

/// One entry of the table.
pub(crate) enum Slot {
    /// Nothing here.
    Free,
    /// Counted by a reservation, not yet bound.
    Reserved,
    /// Bound to an object; the slot owns one reference.
    Occupied {
        descriptor: DescriptorRef,
        flags: FdFlags,
    },
}

impl Slot {
    #[inline]
    fn is_free(&self) -> bool {
        matches!(self, Self::Free)
    }

    #[inline]
    fn is_occupied(&self) -> bool {
        matches!(self, Self::Occupied { .. })
    }

    fn into_descriptor(self) -> Option<DescriptorRef> {
        match self {
            Self::Occupied { descriptor, .. } => Some(descriptor),
            _ => None,
        }
    }
}

/// Unlocked table contents.
pub(crate) struct TableState {
    /// Slot storage; `entries.len()` is the allocated capacity.
    entries: Vec<Slot>,
    /// Highest index ever reserved or occupied, plus one.
    entries_used: usize,
    /// Slots reserved and not yet consumed.
    reserved_count: usize,
    /// Lowest index that may be free. A hint, re-checked on every use.
    first_not_taken: usize,
    /// Indices at or above this are refused to new allocations.
    limit: usize,
}

impl TableState {
    /// Create an empty state.
    pub const fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            entries_used: 0,
            reserved_count: 0,
            first_not_taken: 0,
            limit,
        }
    }

    /// Ensure room for `need_count` slots starting at `need_index`.
    ///
    /// Grows geometrically. On failure nothing changes.
    pub fn enlargen(&mut self, need_index: usize, need_count: usize) -> FdResult<()> {
        let need = need_index
            .checked_add(need_count)
            .ok_or(FdError::TooManyOpen)?;
        let length = self.entries.len();
        if need <= length {
            return Ok(());
        }
        if need > self.limit {
            warn!("[FD] descriptor limit {} reached (need {})", self.limit, need);
            return Err(FdError::TooManyOpen);
        }

        let target = length
            .saturating_mul(2)
            .max(length + MIN_GROWTH)
            .max(need)
            .min(self.limit);
        if self.entries.try_reserve_exact(target - length).is_err() {
            warn!("[FD] cannot grow table from {} to {} slots", length, target);
            return Err(FdError::OutOfMemory);
        }
        self.entries.resize_with(target, || Slot::Free);
        trace!("[FD] table grown {} -> {} slots", length, target);
        Ok(())
    }

    /// Whether `index` holds an object.
    #[inline]
    pub fn is_good_entry(&self, index: usize) -> bool {
        index < self.entries_used && self.entries[index].is_occupied()
    }

    /// Lowest free index at or above `min_index`.
    ///
    /// May return `entries.len()` or beyond, in which case the caller has
    /// to grow the table before using it.
    fn lowest_free(&self, min_index: usize) -> usize {
        let mut index = min_index.max(self.first_not_taken);
        while index < self.entries.len() && !self.entries[index].is_free() {
            index += 1;
        }
        index
    }

    /// Store `slot` at `index` (which must be within capacity) and return
    /// whatever was there.
    fn put(&mut self, index: usize, slot: Slot) -> Slot {
        let old = core::mem::replace(&mut self.entries[index], slot);
        if index >= self.entries_used {
            self.entries_used = index + 1;
        }
        if index == self.first_not_taken {
            let mut hint = index + 1;
            while hint < self.entries.len() && !self.entries[hint].is_free() {
                hint += 1;
            }
            self.first_not_taken = hint;
        }
        old
    }

    /// Mark `index` free and return its previous contents.
    fn clear(&mut self, index: usize) -> Slot {
        let old = core::mem::replace(&mut self.entries[index], Slot::Free);
        if index < self.first_not_taken {
            self.first_not_taken = index;
        }
        old
    }

    /// Reserve the `count` lowest free slots.
    pub fn reserve(&mut self, count: usize) -> FdResult<Vec<usize>> {
        let mut slots = Vec::new();
        if count == 0 {
            return Ok(slots);
        }
        slots
            .try_reserve_exact(count)
            .map_err(|_| FdError::OutOfMemory)?;

        let end = self.entries.len().min(self.limit);
        let mut index = self.lowest_free(0);
        while slots.len() < count && index < end {
            if self.entries[index].is_free() {
                slots.push(index);
            }
            index += 1;
        }

        let missing = count - slots.len();
        if missing > 0 {
            let start = self.entries.len();
            self.enlargen(start, missing)?;
            slots.extend(start..start + missing);
        }

        for &index in &slots {
            self.put(index, Slot::Reserved);
        }
        self.reserved_count += count;
        trace!("[FD] reserved {:?}", slots);
        Ok(slots)
    }

    /// Return unconsumed reserved slots to the free pool.
    pub fn unreserve(&mut self, slots: &mut Vec<usize>) {
        for index in slots.drain(..) {
            assert!(
                matches!(self.entries[index], Slot::Reserved),
                "slot {} is not reserved",
                index
            );
            self.clear(index);
            self.reserved_count -= 1;
        }
    }

    /// Bind `descriptor` to the lowest free index at or above `min_index`.
    pub fn allocate(
        &mut self,
        descriptor: DescriptorRef,
        flags: FdFlags,
        min_index: usize,
    ) -> FdResult<usize> {
        let index = self.lowest_free(min_index);
        if index >= self.limit {
            warn!("[FD] no descriptor below limit {}", self.limit);
            return Err(FdError::TooManyOpen);
        }
        self.enlargen(index, 1)?;
        self.put(index, Slot::Occupied { descriptor, flags });
        trace!("[FD] allocated {} flags={:?}", index, flags);
        Ok(index)
    }

    /// Bind `descriptor` to the lowest slot of `slots` at or above
    /// `min_index`, consuming it from the reservation.
    ///
    /// # Panics
    /// If the reservation has no such slot. That is a sizing bug in the
    /// caller and continuing would corrupt the accounting.
    pub fn allocate_reserved(
        &mut self,
        slots: &mut Vec<usize>,
        descriptor: DescriptorRef,
        flags: FdFlags,
        min_index: usize,
    ) -> usize {
        let position = slots.iter().position(|&index| index >= min_index);
        let Some(position) = position else {
            panic!("reservation {:?} has no slot at or above {}", slots, min_index);
        };
        let index = slots.remove(position);
        assert!(
            matches!(self.entries[index], Slot::Reserved),
            "slot {} is not reserved",
            index
        );
        self.entries[index] = Slot::Occupied { descriptor, flags };
        self.reserved_count -= 1;
        trace!("[FD] allocated reserved {} flags={:?}", index, flags);
        index
    }

    /// The object at `index`, with a new reference.
    pub fn get(&self, index: usize) -> Option<DescriptorRef> {
        if !self.is_good_entry(index) {
            return None;
        }
        match &self.entries[index] {
            Slot::Occupied { descriptor, .. } => Some(descriptor.clone()),
            _ => None,
        }
    }

    /// Bind `to` to the object at `from`, returning whatever `to` held.
    pub fn copy(
        &mut self,
        from: usize,
        to: usize,
        flags: FdFlags,
    ) -> FdResult<Option<DescriptorRef>> {
        if !self.is_good_entry(from) {
            return Err(FdError::BadDescriptor);
        }
        if from == to {
            if let Slot::Occupied { flags: current, .. } = &mut self.entries[to] {
                *current = flags;
            }
            return Ok(None);
        }
        if to >= self.limit {
            return Err(FdError::BadDescriptor);
        }
        if matches!(self.entries.get(to), Some(Slot::Reserved)) {
            return Err(FdError::Busy);
        }
        self.enlargen(to, 1)?;

        let descriptor = match &self.entries[from] {
            Slot::Occupied { descriptor, .. } => descriptor.clone(),
            _ => return Err(FdError::BadDescriptor),
        };
        let old = self.put(to, Slot::Occupied { descriptor, flags });
        trace!("[FD] copied {} -> {} flags={:?}", from, to, flags);
        Ok(old.into_descriptor())
    }

    /// Unbind `index`, handing its reference to the caller.
    pub fn take(&mut self, index: usize) -> FdResult<DescriptorRef> {
        if !self.is_good_entry(index) {
            return Err(FdError::BadDescriptor);
        }
        trace!("[FD] freed {}", index);
        self.clear(index)
            .into_descriptor()
            .ok_or(FdError::BadDescriptor)
    }

    pub fn flags(&self, index: usize) -> FdResult<FdFlags> {
        match self.entries.get(index) {
            Some(Slot::Occupied { flags, .. }) if index < self.entries_used => Ok(*flags),
            _ => Err(FdError::BadDescriptor),
        }
    }

    pub fn set_flags(&mut self, index: usize, new_flags: FdFlags) -> FdResult<()> {
        if !self.is_good_entry(index) {
            return Err(FdError::BadDescriptor);
        }
        if let Slot::Occupied { flags, .. } = &mut self.entries[index] {
            *flags = new_flags;
        }
        Ok(())
    }

    /// Nearest occupied index below `cursor` (`None`: from the end).
    pub fn previous(&self, cursor: Option<usize>) -> Option<usize> {
        let end = cursor.map_or(self.entries_used, |c| c.min(self.entries_used));
        (0..end).rev().find(|&index| self.is_good_entry(index))
    }

    /// Nearest occupied index above `cursor` (`None`: from the start).
    pub fn next(&self, cursor: Option<usize>) -> Option<usize> {
        let start = cursor.map_or(0, |c| c.saturating_add(1));
        (start..self.entries_used).find(|&index| self.is_good_entry(index))
    }

    /// Unbind every occupied slot at or above `index` whose flags match
    /// `filter`, pushing the released references onto `released`.
    pub fn close_matching(
        &mut self,
        index: usize,
        filter: impl Fn(FdFlags) -> bool,
        released: &mut Vec<DescriptorRef>,
    ) -> usize {
        let mut closed = 0;
        for i in index..self.entries_used {
            let matches = match &self.entries[i] {
                Slot::Occupied { flags, .. } => filter(*flags),
                _ => false,
            };
            if matches {
                if let Some(descriptor) = self.clear(i).into_descriptor() {
                    released.push(descriptor);
                    closed += 1;
                }
            }
        }
        closed
    }

    /// Copy of this state for a forked child.
    ///
    /// Close-on-fork slots and reservations become holes; indices are
    /// never renumbered.
    pub fn fork(&self) -> FdResult<Self> {
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(self.entries.len())
            .map_err(|_| FdError::OutOfMemory)?;
        for slot in &self.entries {
            entries.push(match slot {
                Slot::Occupied { descriptor, flags } if !flags.contains(FdFlags::CLOFORK) => {
                    Slot::Occupied {
                        descriptor: descriptor.clone(),
                        flags: *flags,
                    }
                }
                _ => Slot::Free,
            });
        }
        Ok(Self {
            entries,
            entries_used: self.entries_used,
            reserved_count: 0,
            first_not_taken: 0,
            limit: self.limit,
        })
    }

    #[inline]
    pub fn entries_used(&self) -> usize {
        self.entries_used
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn reserved_count(&self) -> usize {
        self.reserved_count
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    #[inline]
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    pub fn occupied_count(&self) -> usize {
        self.entries[..self.entries_used]
            .iter()
            .filter(|slot| slot.is_occupied())
            .count()
    }

    #[cfg(test)]
    pub fn first_not_taken(&self) -> usize {
        self.first_not_taken
    }
}
