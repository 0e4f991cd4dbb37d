use std::cell::Cell;
use std::marker::PhantomData;

use crate::{AssignPolicy, DynArray, MemoryLease, Result, SlotAllocator, SystemSlots, unwrap_storage};

/// Builder for creating an instance of [`DynArray`].
///
/// All settings are optional. By default the array uses [`SystemSlots`], starts without
/// capacity and uses [`AssignPolicy::ReuseStorage`].
///
/// # Examples
///
/// ```
/// use lease_array::{AssignPolicy, DynArray};
///
/// let items = DynArray::<u64>::builder()
///     .capacity(32)
///     .assign_policy(AssignPolicy::AllocateAndSwap)
///     .build();
///
/// assert_eq!(items.capacity(), 32);
/// assert_eq!(items.assign_policy(), AssignPolicy::AllocateAndSwap);
/// ```
///
/// # Thread safety
///
/// The builder is thread-mobile ([`Send`]) whenever its allocator is, allowing configuration
/// to happen on a different thread than where the array is used. It is not thread-safe
/// ([`Sync`]) as it contains mutable configuration state.
#[derive(Debug)]
#[must_use]
pub struct DynArrayBuilder<T, A: SlotAllocator = SystemSlots> {
    allocator: A,
    capacity: usize,
    assign_policy: AssignPolicy,

    _element: PhantomData<fn() -> T>,

    // Prevents Sync while allowing Send - builders are thread-mobile but not thread-safe
    _not_sync: PhantomData<Cell<()>>,
}

impl<T> DynArrayBuilder<T> {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            allocator: SystemSlots,
            capacity: 0,
            assign_policy: AssignPolicy::default(),
            _element: PhantomData,
            _not_sync: PhantomData,
        }
    }
}

impl<T, A: SlotAllocator> DynArrayBuilder<T, A> {
    /// Sets the allocator that will provide storage for the array.
    ///
    /// # Examples
    ///
    /// ```
    /// use lease_array::{DynArray, SystemSlots};
    ///
    /// let items = DynArray::<u8>::builder().allocator(SystemSlots).build();
    /// assert!(items.is_empty());
    /// ```
    #[inline]
    pub fn allocator<B: SlotAllocator>(self, allocator: B) -> DynArrayBuilder<T, B> {
        DynArrayBuilder {
            allocator,
            capacity: self.capacity,
            assign_policy: self.assign_policy,
            _element: PhantomData,
            _not_sync: PhantomData,
        }
    }

    /// Sets the number of slots to reserve when the array is built.
    ///
    /// The array will have exactly this capacity. Zero (the default) means no storage is
    /// acquired until the first element is added.
    #[inline]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the [assign policy][AssignPolicy] of the array. This governs how copy assignment
    /// into the array behaves if an element `Clone` panics.
    #[inline]
    pub fn assign_policy(mut self, policy: AssignPolicy) -> Self {
        self.assign_policy = policy;
        self
    }

    /// Builds the array with the specified configuration.
    ///
    /// # Panics
    ///
    /// Panics if the requested capacity cannot be allocated.
    #[must_use]
    #[track_caller]
    pub fn build(self) -> DynArray<T, A> {
        unwrap_storage(self.try_build())
    }

    /// Builds the array with the specified configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the requested capacity cannot be allocated.
    pub fn try_build(self) -> Result<DynArray<T, A>> {
        let lease = MemoryLease::acquire(self.allocator, 0, self.capacity)?;

        Ok(DynArray::with_lease(lease, self.assign_policy))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::Error;
    use crate::testing::CountingSlots;

    assert_impl_all!(DynArrayBuilder<String>: Send, std::fmt::Debug);
    assert_not_impl_any!(DynArrayBuilder<String>: Sync);

    #[test]
    fn builder_new_creates_default_state() {
        let builder = DynArrayBuilder::<u32>::new();

        assert_eq!(builder.capacity, 0);
        assert_eq!(builder.assign_policy, AssignPolicy::default());
    }

    #[test]
    fn default_build_does_not_allocate() {
        let slots = CountingSlots::new();
        let items = DynArray::<u32>::builder().allocator(slots.clone()).build();

        assert_eq!(items.capacity(), 0);
        assert_eq!(slots.allocations(), 0);
    }

    #[test]
    fn capacity_is_reserved_exactly() {
        let slots = CountingSlots::new();
        let items = DynArray::<u32>::builder()
            .capacity(13)
            .allocator(slots.clone())
            .build();

        assert!(items.is_empty());
        assert_eq!(items.capacity(), 13);
        assert_eq!(slots.allocations(), 1);
    }

    #[test]
    fn settings_can_be_overridden() {
        let builder = DynArray::<u32>::builder()
            .capacity(4)
            .capacity(9)
            .assign_policy(AssignPolicy::AllocateAndSwap)
            .assign_policy(AssignPolicy::ReuseStorage);

        assert_eq!(builder.capacity, 9);
        assert_eq!(builder.assign_policy, AssignPolicy::ReuseStorage);
    }

    #[test]
    fn allocator_switch_keeps_other_settings() {
        let items = DynArray::<u32>::builder()
            .capacity(3)
            .assign_policy(AssignPolicy::AllocateAndSwap)
            .allocator(CountingSlots::new())
            .build();

        assert_eq!(items.capacity(), 3);
        assert_eq!(items.assign_policy(), AssignPolicy::AllocateAndSwap);
    }

    #[test]
    fn try_build_reports_allocation_failure() {
        let slots = CountingSlots::new();
        slots.fail_next_allocation();

        let result = DynArray::<u64>::builder()
            .capacity(8)
            .allocator(slots)
            .try_build();

        assert!(matches!(result, Err(Error::AllocationFailed { .. })));
    }

    #[test]
    #[should_panic]
    fn build_panics_on_overflow() {
        let _items = DynArray::<u64>::builder().capacity(usize::MAX).build();
    }

    #[test]
    fn builder_send_trait() {
        // Verify builder can be moved between threads.
        let builder = DynArray::<u64>::builder().capacity(2);
        let handle = std::thread::spawn(move || builder.build());
        let items = handle.join().expect("thread completed successfully");

        assert_eq!(items.capacity(), 2);
    }
}
