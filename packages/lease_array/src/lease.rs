use std::alloc::Layout;
use std::any::type_name;
use std::ptr::NonNull;
use std::{fmt, mem};

use tracing::trace;

use crate::{Error, Result, SlotAllocator, SystemSlots};

/// Exclusive ownership of one contiguous region of raw slots for values of type `T`.
///
/// The lease knows nothing about element lifetime. Every slot is raw memory as far as the lease
/// is concerned - constructing values in the slots and destroying them again before the lease is
/// released is the responsibility of the owner (typically a [`DynArray`][crate::DynArray]).
///
/// A lease is acquired with a "primary" slot count and an optional "extra" slot count. The first
/// `primary` slots are meant for immediate construction by the owner, the remaining slots are
/// spare capacity. Both come from a single allocation.
///
/// # Ownership
///
/// A lease can be moved but never copied - two owners of one region would release it twice.
/// [`take()`](Self::take) moves the region out while leaving an empty lease behind, whose release
/// is a no-op.
///
/// ```compile_fail
/// use lease_array::{MemoryLease, SystemSlots};
///
/// let lease = MemoryLease::<u32>::acquire(SystemSlots, 4, 0).unwrap();
/// let copy = lease.clone(); // Leases cannot be duplicated.
/// ```
///
/// # Examples
///
/// ```
/// use lease_array::{MemoryLease, SystemSlots};
///
/// let lease = MemoryLease::<u64>::acquire(SystemSlots, 3, 5).unwrap();
///
/// assert_eq!(lease.primary(), 3);
/// assert_eq!(lease.capacity(), 8);
/// ```
pub struct MemoryLease<T, A: SlotAllocator = SystemSlots> {
    allocator: A,

    /// First slot of the region. Dangling (but aligned) if nothing was allocated.
    first: NonNull<T>,

    /// Number of leading slots reserved for immediate construction by the owner.
    primary: usize,

    /// Total number of slots in the region, primary and extra.
    capacity: usize,

    /// Layout of the allocated region. Zero-sized if no allocation was made, in which
    /// case the release is a no-op.
    layout: Layout,
}

impl<T, A: SlotAllocator> MemoryLease<T, A> {
    /// Creates a lease that owns no memory, with zero capacity.
    ///
    /// This never calls the allocator.
    #[must_use]
    pub fn empty(allocator: A) -> Self {
        Self {
            allocator,
            first: NonNull::dangling(),
            primary: 0,
            capacity: 0,
            layout: Layout::new::<()>(),
        }
    }

    /// Acquires a region of `primary + extra` slots from `allocator`.
    ///
    /// No memory is requested if the total is zero or if `T` is zero-sized. In the latter
    /// case the lease still reports the requested capacity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityOverflow`] if the slot count or the byte size of the region
    /// cannot be represented, or [`Error::AllocationFailed`] if the allocator cannot satisfy
    /// the request. Nothing is retained in either case.
    pub fn acquire(allocator: A, primary: usize, extra: usize) -> Result<Self> {
        let capacity = primary
            .checked_add(extra)
            .ok_or(Error::CapacityOverflow {
                requested: usize::MAX,
            })?;

        let layout = Layout::array::<T>(capacity)
            .map_err(|_layout_error| Error::CapacityOverflow {
                requested: capacity,
            })?;

        if layout.size() == 0 {
            return Ok(Self {
                allocator,
                first: NonNull::dangling(),
                primary,
                capacity,
                layout,
            });
        }

        let first = allocator.allocate(layout)?.cast::<T>();

        trace!(
            element = type_name::<T>(),
            primary,
            capacity,
            bytes = layout.size(),
            "acquired memory lease"
        );

        Ok(Self {
            allocator,
            first,
            primary,
            capacity,
            layout,
        })
    }

    /// Moves the region out of this lease, leaving behind an empty lease that owns nothing.
    ///
    /// The allocator handle is cloned, so the empty lease remains usable.
    #[must_use]
    pub fn take(&mut self) -> Self {
        let empty = Self::empty(self.allocator.clone());
        mem::replace(self, empty)
    }

    /// Total number of slots in the region.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of leading slots that were reserved for immediate construction.
    #[must_use]
    #[inline]
    pub fn primary(&self) -> usize {
        self.primary
    }

    /// Number of slots beyond the primary ones.
    #[must_use]
    #[inline]
    pub fn extra(&self) -> usize {
        // Cannot underflow - primary is always a part of capacity.
        self.capacity.wrapping_sub(self.primary)
    }

    /// Pointer to the first slot.
    ///
    /// The pointer is dangling (but well-aligned) if the lease owns no memory.
    #[must_use]
    #[inline]
    pub fn first(&self) -> NonNull<T> {
        self.first
    }

    /// The allocator the region was obtained from.
    #[must_use]
    #[inline]
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Whether this lease holds an allocation that must be returned to the allocator.
    #[must_use]
    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.layout.size() != 0
    }
}

impl<T, A: SlotAllocator> Drop for MemoryLease<T, A> {
    fn drop(&mut self) {
        if !self.is_allocated() {
            return;
        }

        trace!(
            element = type_name::<T>(),
            capacity = self.capacity,
            bytes = self.layout.size(),
            "released memory lease"
        );

        // SAFETY: The region was obtained from this allocator with this exact layout in
        // acquire() and nobody else can release it because the lease is not copyable.
        unsafe {
            self.allocator
                .deallocate(self.first.cast::<u8>(), self.layout);
        }
    }
}

impl<T, A: SlotAllocator + fmt::Debug> fmt::Debug for MemoryLease<T, A> {
    #[cfg_attr(test, mutants::skip)] // Diagnostic output only, mutation is meaningless.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("allocator", &self.allocator)
            .field("first", &self.first)
            .field("primary", &self.primary)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

// SAFETY: The lease is the exclusive owner of its region; sending it to another thread moves
// that ownership along with it. The region may hold values of type T, hence the T: Send bound.
unsafe impl<T: Send, A: SlotAllocator + Send> Send for MemoryLease<T, A> {}

// SAFETY: Shared access only exposes pointers and counts. The owner may hand out &T through
// those pointers, so T: Sync is required.
unsafe impl<T: Sync, A: SlotAllocator + Sync> Sync for MemoryLease<T, A> {}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    reason = "test code doesn't need the same safety rigor as production code"
)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::testing::CountingSlots;

    assert_impl_all!(MemoryLease<u32>: Send, Sync, fmt::Debug);
    assert_not_impl_any!(MemoryLease<u32>: Clone, Copy);
    assert_not_impl_any!(MemoryLease<Cell<u32>>: Sync);

    #[test]
    fn acquire_splits_primary_and_extra() {
        let slots = CountingSlots::new();
        let lease = MemoryLease::<u32, _>::acquire(slots.clone(), 3, 5).unwrap();

        assert_eq!(lease.primary(), 3);
        assert_eq!(lease.extra(), 5);
        assert_eq!(lease.capacity(), 8);
        assert!(lease.is_allocated());
        assert_eq!(slots.allocations(), 1);

        drop(lease);

        assert_eq!(slots.live_regions(), 0);
    }

    #[test]
    fn slots_are_writable() {
        let lease = MemoryLease::<u64>::acquire(SystemSlots, 4, 0).unwrap();

        unsafe {
            for index in 0..4 {
                lease.first().add(index).write(index as u64 + 100);
            }

            assert_eq!(lease.first().add(2).read(), 102);
        }
    }

    #[test]
    fn zero_slots_do_not_allocate() {
        let slots = CountingSlots::new();
        let lease = MemoryLease::<u32, _>::acquire(slots.clone(), 0, 0).unwrap();

        assert_eq!(lease.capacity(), 0);
        assert!(!lease.is_allocated());
        assert_eq!(slots.allocations(), 0);
    }

    #[test]
    fn zero_sized_type_does_not_allocate() {
        let slots = CountingSlots::new();
        let lease = MemoryLease::<(), _>::acquire(slots.clone(), 10, 6).unwrap();

        assert_eq!(lease.capacity(), 16);
        assert!(!lease.is_allocated());
        assert_eq!(slots.allocations(), 0);
    }

    #[test]
    fn empty_lease_owns_nothing() {
        let slots = CountingSlots::new();
        let lease = MemoryLease::<String, _>::empty(slots.clone());

        assert_eq!(lease.capacity(), 0);
        assert_eq!(lease.primary(), 0);
        assert!(!lease.is_allocated());

        drop(lease);

        assert_eq!(slots.allocations(), 0);
    }

    #[test]
    fn take_transfers_ownership() {
        let slots = CountingSlots::new();
        let mut source = MemoryLease::<u32, _>::acquire(slots.clone(), 2, 2).unwrap();
        let first = source.first();

        let taken = source.take();

        assert_eq!(taken.first(), first);
        assert_eq!(taken.capacity(), 4);
        assert_eq!(source.capacity(), 0);
        assert!(!source.is_allocated());

        // Releasing the emptied source must not release the transferred region.
        drop(source);
        assert_eq!(slots.live_regions(), 1);

        drop(taken);
        assert_eq!(slots.live_regions(), 0);
    }

    #[test]
    fn allocation_failure_is_reported() {
        let slots = CountingSlots::new();
        slots.fail_next_allocation();

        let result = MemoryLease::<u64, _>::acquire(slots.clone(), 4, 0);

        assert!(matches!(result, Err(Error::AllocationFailed { layout }) if layout.size() == 32));
        assert_eq!(slots.live_regions(), 0);
    }

    #[test]
    fn slot_count_overflow_is_reported() {
        let result = MemoryLease::<u8>::acquire(SystemSlots, usize::MAX, 1);

        assert!(matches!(
            result,
            Err(Error::CapacityOverflow {
                requested: usize::MAX
            })
        ));
    }

    #[test]
    fn byte_size_overflow_is_reported() {
        let result = MemoryLease::<u64>::acquire(SystemSlots, usize::MAX / 4, 0);

        assert!(matches!(result, Err(Error::CapacityOverflow { .. })));
    }

    #[test]
    fn debug_output_names_the_type() {
        let lease = MemoryLease::<u32>::acquire(SystemSlots, 1, 0).unwrap();
        let debug_output = format!("{lease:?}");

        assert!(debug_output.contains("MemoryLease"));
        assert!(debug_output.contains("capacity: 1"));
    }
}
