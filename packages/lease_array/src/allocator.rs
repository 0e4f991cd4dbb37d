use std::alloc::{Layout, alloc, dealloc};
use std::ptr::NonNull;

use crate::{Error, Result};

/// Provides raw memory regions for a [`MemoryLease`][crate::MemoryLease].
///
/// The allocator only hands out and takes back memory. It is never asked to construct or destroy
/// elements - element lifetime is managed entirely by the [`DynArray`][crate::DynArray] that owns
/// the lease, which is what allows elements to be relocated between regions with a plain move.
///
/// Allocator handles are cloned whenever an array is copied, so a handle is expected to be a
/// cheap reference to some shared allocator state (or a zero-sized type).
///
/// # Safety
///
/// Implementations must guarantee that:
///
/// 1. A region returned by `allocate()` is valid for reads and writes of `layout.size()` bytes,
///    aligned to `layout.align()` and not aliased by any other live allocation.
/// 2. The region remains valid until it is passed to `deallocate()` on this allocator or on any
///    clone of it.
pub unsafe trait SlotAllocator: Clone {
    /// Allocates a raw region matching `layout`.
    ///
    /// The layout is never zero-sized - the lease does not request memory for empty regions
    /// or zero-sized element types.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailed`] if the memory cannot be provided.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>>;

    /// Returns a region previously obtained from [`allocate()`](Self::allocate).
    ///
    /// # Safety
    ///
    /// The caller must guarantee that `ptr` was returned by `allocate()` on this allocator
    /// (or a clone of it) with the same `layout`, and that it has not yet been deallocated.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The default slot allocator, backed by the global Rust allocator.
///
/// # Examples
///
/// ```
/// use lease_array::{DynArray, SystemSlots};
///
/// let mut items = DynArray::new_in(SystemSlots);
/// items.push(1);
/// assert_eq!(items.len(), 1);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct SystemSlots;

// SAFETY: Regions come straight from the global allocator, which upholds the same contract.
unsafe impl SlotAllocator for SystemSlots {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>> {
        debug_assert!(layout.size() > 0, "zero-sized slot regions are never allocated");

        // SAFETY: The trait contract guarantees a non-zero-sized layout.
        let ptr = unsafe { alloc(layout) };

        NonNull::new(ptr).ok_or(Error::AllocationFailed { layout })
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarding the caller's guarantee that ptr came from alloc() with this layout.
        unsafe {
            dealloc(ptr.as_ptr(), layout);
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    reason = "test code doesn't need the same safety rigor as production code"
)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(SystemSlots: Send, Sync, Copy, Default, std::fmt::Debug);

    #[test]
    fn allocate_and_deallocate_round_trip() {
        let layout = Layout::array::<u64>(4).unwrap();
        let ptr = SystemSlots.allocate(layout).unwrap();

        assert_eq!(ptr.as_ptr().align_offset(layout.align()), 0);

        let slots = ptr.cast::<u64>();

        unsafe {
            for (index, value) in [0_u64, 10, 20, 30].into_iter().enumerate() {
                slots.add(index).write(value);
            }

            assert_eq!(slots.add(3).read(), 30);

            SystemSlots.deallocate(ptr, layout);
        }
    }

    #[test]
    fn over_aligned_layout_is_honored() {
        let layout = Layout::from_size_align(64, 64).unwrap();
        let ptr = SystemSlots.allocate(layout).unwrap();

        assert_eq!(ptr.as_ptr().align_offset(64), 0);

        unsafe {
            SystemSlots.deallocate(ptr, layout);
        }
    }
}
