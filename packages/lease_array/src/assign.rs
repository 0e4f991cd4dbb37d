//! Copy construction and copy assignment for [`DynArray`].

use std::mem;

use crate::{AssignPolicy, DynArray, Result, SlotAllocator, slots, unwrap_storage};

impl<T: Clone, A: SlotAllocator> DynArray<T, A> {
    /// Creates an independent copy of this array in freshly acquired storage.
    ///
    /// The copy has the same elements, allocator and assign policy, with a capacity equal to
    /// its length. If an element `Clone` panics, the partial copy is discarded without leaking.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be allocated.
    pub fn try_clone(&self) -> Result<Self> {
        let mut copy = Self::try_from_slice_in(self.as_slice(), self.allocator().clone())?;
        copy.set_assign_policy(self.assign_policy());

        Ok(copy)
    }

    /// Makes this array element-wise equal to `source`.
    ///
    /// # Panics
    ///
    /// Panics if storage is needed and cannot be allocated.
    #[track_caller]
    pub fn assign_from(&mut self, source: &Self) {
        unwrap_storage(self.try_assign_from(source));
    }

    /// Makes this array element-wise equal to `source`.
    ///
    /// How this happens is governed by the array's [`AssignPolicy`]:
    ///
    /// * With [`AssignPolicy::ReuseStorage`] and enough capacity for every element of `source`,
    ///   the existing elements are assigned over with `Clone::clone_from`, excess elements are
    ///   dropped and missing elements are cloned into the spare slots. No allocation happens.
    ///   If a `Clone` panics, the array is left valid but holding an unspecified mix of old and
    ///   new values.
    /// * Otherwise a complete copy of `source` is built in new storage and swapped in, after
    ///   which the old elements are dropped and the old storage is released. If a `Clone`
    ///   panics, the array is left exactly as it was.
    ///
    /// Assigning an array to itself is rejected by the borrow checker:
    ///
    /// ```compile_fail
    /// use lease_array::DynArray;
    ///
    /// let mut items = DynArray::from([1, 2, 3]);
    /// items.assign_from(&items);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if storage is needed and cannot be allocated, in which case the array
    /// is untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use lease_array::DynArray;
    ///
    /// let mut target = DynArray::from_elem(10, 0);
    /// let source = DynArray::from([1, 2, 3]);
    ///
    /// target.assign_from(&source);
    ///
    /// assert_eq!(target, [1, 2, 3]);
    ///
    /// // The storage of the target was reused.
    /// assert_eq!(target.capacity(), 10);
    /// ```
    pub fn try_assign_from(&mut self, source: &Self) -> Result<()> {
        match self.assign_policy() {
            AssignPolicy::ReuseStorage if self.capacity() >= source.len() => {
                self.assign_in_place(source.as_slice());
                Ok(())
            }
            _ => self.assign_by_swap(source),
        }
    }

    /// Strong-guarantee assignment: build the copy first, then swap it in.
    fn assign_by_swap(&mut self, source: &Self) -> Result<()> {
        let mut replacement = Self::try_from_slice_in(source.as_slice(), self.allocator().clone())?;
        replacement.set_assign_policy(self.assign_policy());

        mem::swap(self, &mut replacement);

        // `replacement` now holds our previous elements and storage, both released here.
        Ok(())
    }

    /// Basic-guarantee assignment within the existing capacity.
    fn assign_in_place(&mut self, source: &[T]) {
        debug_assert!(self.capacity() >= source.len());

        // Shrinking first means the overlapping prefix is all that is left to assign over.
        self.truncate(source.len());

        let (overlap, missing) = source.split_at(self.len());

        self.as_mut_slice().clone_from_slice(overlap);

        // SAFETY: The capacity covers all of `source`, so there are at least `missing.len()` raw
        // slots after the live elements. If a clone panics, slots::clone_from_slice() destroys
        // what it constructed and `len` still covers only the assigned prefix.
        unsafe {
            slots::clone_from_slice(self.spare_first(), missing);
        }

        // SAFETY: The assigned prefix and the newly cloned suffix together cover `source.len()`
        // slots, which fits in the capacity.
        unsafe {
            self.set_len(source.len());
        }
    }
}

impl<T: Clone, A: SlotAllocator> Clone for DynArray<T, A> {
    /// Creates an independent copy of this array.
    ///
    /// # Panics
    ///
    /// Panics if the storage cannot be allocated.
    #[track_caller]
    fn clone(&self) -> Self {
        unwrap_storage(self.try_clone())
    }

    /// Makes this array element-wise equal to `source`, honoring the [`AssignPolicy`] of `self`.
    ///
    /// # Panics
    ///
    /// Panics if storage is needed and cannot be allocated.
    #[track_caller]
    fn clone_from(&mut self, source: &Self) {
        self.assign_from(source);
    }
}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    reason = "test code doesn't need the same safety rigor as production code"
)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::rc::Rc;

    use super::*;
    use crate::testing::{CountingSlots, Tracked, Tracker, values};

    fn tracked_array(
        tracker: &Rc<Tracker>,
        slots: &CountingSlots,
        items: &[u32],
    ) -> DynArray<Tracked, CountingSlots> {
        let mut array = DynArray::new_in(slots.clone());
        array.reserve(items.len());

        for &value in items {
            array.push(tracker.item(value));
        }

        array
    }

    #[test]
    fn clone_is_independent() {
        let original = DynArray::from([String::from("a"), String::from("b")]);
        let mut copy = original.clone();

        assert_eq!(copy, original);
        assert_ne!(copy.as_ptr(), original.as_ptr());

        copy[0].push('!');
        copy.push(String::from("c"));

        assert_eq!(original, ["a", "b"]);
        assert_eq!(copy, ["a!", "b", "c"]);
    }

    #[test]
    fn clone_has_exact_capacity_and_same_policy() {
        let mut original = DynArray::from_elem(3, 1_u8);
        original.reserve(50);
        original.set_assign_policy(AssignPolicy::AllocateAndSwap);

        let copy = original.clone();

        assert_eq!(copy.capacity(), 3);
        assert_eq!(copy.assign_policy(), AssignPolicy::AllocateAndSwap);
    }

    #[test]
    fn clone_of_empty_does_not_allocate() {
        let slots = CountingSlots::new();
        let original = DynArray::<u32, _>::new_in(slots.clone());

        let copy = original.clone();

        assert!(copy.is_empty());
        assert_eq!(slots.allocations(), 0);
    }

    #[test]
    fn try_clone_panicking_element_leaks_nothing() {
        let tracker = Tracker::new();
        let slots = CountingSlots::new();
        let original = tracked_array(&tracker, &slots, &[1, 2, 3, 4]);

        tracker.panic_after_clones(2);

        let result = panic::catch_unwind(AssertUnwindSafe(|| original.try_clone()));

        assert!(result.is_err());
        assert_eq!(tracker.live(), 4);
        assert_eq!(slots.live_regions(), 1);
    }

    #[test]
    fn reuse_assignment_does_not_allocate() {
        let tracker = Tracker::new();
        let slots = CountingSlots::new();
        let mut target = tracked_array(&tracker, &slots, &[9, 9, 9, 9, 9]);
        let source = tracked_array(&tracker, &slots, &[1, 2, 3]);
        let storage = target.as_ptr();
        let allocations = slots.allocations();

        target.assign_from(&source);

        assert_eq!(values(&target), [1, 2, 3]);
        assert_eq!(target.as_ptr(), storage);
        assert_eq!(target.capacity(), 5);
        assert_eq!(slots.allocations(), allocations);
        assert_eq!(tracker.live(), 6);
    }

    #[test]
    fn reuse_assignment_grows_within_capacity() {
        let tracker = Tracker::new();
        let slots = CountingSlots::new();
        let mut target = tracked_array(&tracker, &slots, &[9]);
        target.reserve(10);
        let source = tracked_array(&tracker, &slots, &[1, 2, 3, 4]);
        let allocations = slots.allocations();

        target.assign_from(&source);

        assert_eq!(values(&target), [1, 2, 3, 4]);
        assert_eq!(slots.allocations(), allocations);
        assert_eq!(tracker.live(), 8);
    }

    #[test]
    fn insufficient_capacity_allocates_and_swaps() {
        let tracker = Tracker::new();
        let slots = CountingSlots::new();
        let mut target = tracked_array(&tracker, &slots, &[9]);
        let source = tracked_array(&tracker, &slots, &[1, 2, 3]);
        let allocations = slots.allocations();

        target.assign_from(&source);

        assert_eq!(values(&target), [1, 2, 3]);
        assert_eq!(target.capacity(), 3);
        assert_eq!(slots.allocations(), allocations + 1);

        // The previous storage of the target was released.
        assert_eq!(slots.live_regions(), 2);
        assert_eq!(tracker.live(), 6);
    }

    #[test]
    fn allocate_and_swap_policy_always_allocates() {
        let slots = CountingSlots::new();
        let mut target = DynArray::try_from_elem_in(10, 0_u32, slots.clone()).unwrap();
        target.set_assign_policy(AssignPolicy::AllocateAndSwap);
        let source = DynArray::try_from_elem_in(2, 5_u32, slots.clone()).unwrap();

        target.assign_from(&source);

        assert_eq!(target, [5, 5]);
        assert_eq!(target.capacity(), 2);
        assert_eq!(target.assign_policy(), AssignPolicy::AllocateAndSwap);
        assert_eq!(slots.allocations(), 3);
        assert_eq!(slots.live_regions(), 2);
    }

    #[test]
    fn allocate_and_swap_is_strong_on_panic() {
        let tracker = Tracker::new();
        let slots = CountingSlots::new();
        let mut target = tracked_array(&tracker, &slots, &[7, 8, 9, 10]);
        target.set_assign_policy(AssignPolicy::AllocateAndSwap);
        let source = tracked_array(&tracker, &slots, &[1, 2, 3]);
        let storage = target.as_ptr();

        tracker.panic_after_clones(1);

        let result = panic::catch_unwind(AssertUnwindSafe(|| target.assign_from(&source)));

        assert!(result.is_err());
        assert_eq!(values(&target), [7, 8, 9, 10]);
        assert_eq!(target.as_ptr(), storage);
        assert_eq!(tracker.live(), 7);
        assert_eq!(slots.live_regions(), 2);
    }

    #[test]
    fn reuse_storage_is_basic_on_panic() {
        let tracker = Tracker::new();
        let slots = CountingSlots::new();
        let mut target = tracked_array(&tracker, &slots, &[7, 8]);
        target.reserve(8);
        let source = tracked_array(&tracker, &slots, &[1, 2, 3, 4, 5]);

        // The first two clones assign over the existing elements, the third one (the first
        // clone into a spare slot) succeeds too and the fourth panics.
        tracker.panic_after_clones(3);

        let result = panic::catch_unwind(AssertUnwindSafe(|| target.assign_from(&source)));
        tracker.disarm();

        assert!(result.is_err());

        // The overlapping prefix was assigned, the partially cloned suffix was discarded.
        assert_eq!(values(&target), [1, 2]);
        assert_eq!(target.capacity(), 8);
        assert_eq!(tracker.live(), 7);

        drop(target);
        drop(source);

        assert_eq!(tracker.live(), 0);
        assert_eq!(slots.live_regions(), 0);
    }

    #[test]
    fn assigning_an_equal_copy_changes_nothing() {
        let mut items = DynArray::from([4, 5, 6]);
        items.reserve(12);
        let storage = items.as_ptr();

        let snapshot = items.clone();
        items.assign_from(&snapshot);

        assert_eq!(items, [4, 5, 6]);
        assert_eq!(items.capacity(), 12);
        assert_eq!(items.as_ptr(), storage);
    }

    #[test]
    fn clone_from_uses_assign_policy() {
        let mut target = DynArray::from_elem(6, 0_u16);
        let source = DynArray::from([1_u16, 2]);

        target.clone_from(&source);
        assert_eq!(target.capacity(), 6);

        target.set_assign_policy(AssignPolicy::AllocateAndSwap);
        target.clone_from(&source);
        assert_eq!(target.capacity(), 2);
        assert_eq!(target, [1, 2]);
    }

    #[test]
    fn assignment_failure_leaves_target_untouched() {
        let slots = CountingSlots::new();
        let mut target = DynArray::try_from_elem_in(1, 3_u64, slots.clone()).unwrap();
        let source = DynArray::try_from_elem_in(4, 8_u64, slots.clone()).unwrap();

        slots.fail_next_allocation();

        assert!(target.try_assign_from(&source).is_err());
        assert_eq!(target, [3]);
        assert_eq!(target.capacity(), 1);
    }
}
