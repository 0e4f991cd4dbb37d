//! Integration tests for the `lease_array` package.
//!
//! These exercise the public API end to end, including a custom slot allocator that
//! observes every region acquired and released through the lease.

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use lease_array::{AssignPolicy, DynArray, Error, Result, SlotAllocator, SystemSlots, dyn_array};

/// Forwards to the system allocator while counting regions.
#[derive(Clone, Debug, Default)]
struct ObservedSlots {
    allocated: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl ObservedSlots {
    fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    fn live(&self) -> usize {
        self.allocated() - self.released.load(Ordering::Relaxed)
    }
}

// SAFETY: Every region comes from SystemSlots, which upholds the trait contract.
unsafe impl SlotAllocator for ObservedSlots {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>> {
        let ptr = SystemSlots.allocate(layout)?;
        self.allocated.fetch_add(1, Ordering::Relaxed);
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.released.fetch_add(1, Ordering::Relaxed);

        // SAFETY: Forwarding the caller's guarantees unchanged.
        unsafe { SystemSlots.deallocate(ptr, layout) }
    }
}

/// Refuses every request.
#[derive(Clone, Debug)]
struct ExhaustedSlots;

// SAFETY: Never hands out a region, so there is nothing to keep valid.
unsafe impl SlotAllocator for ExhaustedSlots {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>> {
        Err(Error::AllocationFailed { layout })
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {
        unreachable!("no region was ever allocated");
    }
}

#[test]
fn fill_push_resize_reserve_scenario() {
    let mut numbers = DynArray::from_elem(3, 7);
    assert_eq!(numbers.len(), 3);
    assert_eq!(numbers, [7, 7, 7]);

    numbers.push(9);
    assert_eq!(numbers.len(), 4);
    assert_eq!(numbers.last(), Some(&9));

    numbers.resize(2, 0);
    assert_eq!(numbers.len(), 2);
    assert_eq!(numbers, [7, 7]);

    numbers.reserve(100);
    assert!(numbers.capacity() >= 100);
    assert_eq!(numbers, [7, 7]);
}

#[test]
fn literal_list_traverses_in_order() {
    let words = dyn_array!["ab", "ac", "ad"];

    assert_eq!(words.len(), 3);

    let mut iter = words.iter();
    assert_eq!(iter.next(), Some(&"ab"));
    assert_eq!(iter.next(), Some(&"ac"));
    assert_eq!(iter.next(), Some(&"ad"));
    assert_eq!(iter.next(), None);
}

#[test]
fn fill_constructor_for_various_lengths() {
    for len in [0, 1, 2, 8, 9, 100] {
        let items = DynArray::from_elem(len, "v".to_string());

        assert_eq!(items.len(), len);
        assert!(items.iter().all(|item| item == "v"));
    }
}

#[test]
fn copy_is_disjoint_from_original() {
    let original = DynArray::from(["one".to_string(), "two".to_string()]);
    let mut copy = original.clone();

    assert_eq!(copy, original);
    assert_ne!(copy.as_ptr(), original.as_ptr());

    copy[0].push('!');
    copy.push("three".to_string());

    assert_eq!(original, ["one", "two"]);
    assert_eq!(copy, ["one!", "two", "three"]);
}

#[test]
fn move_transfers_everything_and_empties_source() {
    let mut source = DynArray::from_elem(5, 1_u64);
    source.reserve(12);
    let storage = source.as_ptr();

    let destination = source.take();

    assert_eq!(destination.len(), 5);
    assert_eq!(destination.capacity(), 12);
    assert_eq!(destination.as_ptr(), storage);
    assert_eq!(source.len(), 0);
    assert_eq!(source.capacity(), 0);

    // The moved-from array remains fully usable.
    source.push(3);
    assert_eq!(source, [3]);
}

#[test]
fn move_assignment_releases_previous_storage() {
    let slots = ObservedSlots::default();
    let mut target = DynArray::try_from_elem_in(4, 0_u32, slots.clone()).unwrap();
    let mut source = DynArray::try_from_elem_in(2, 1_u32, slots.clone()).unwrap();
    assert_eq!(slots.live(), 2);

    target.move_from(&mut source);

    assert_eq!(target, [1, 1]);
    assert!(source.is_empty());
    assert_eq!(source.capacity(), 0);
    assert_eq!(slots.live(), 1);
}

#[test]
fn reserve_within_capacity_does_not_reallocate() {
    let slots = ObservedSlots::default();
    let mut items = DynArray::try_from_elem_in(10, 'x', slots.clone()).unwrap();
    let storage = items.as_ptr();

    items.reserve(4);
    items.reserve(10);

    assert_eq!(slots.allocated(), 1);
    assert_eq!(items.as_ptr(), storage);
    assert_eq!(items.capacity(), 10);
}

#[test]
fn reserve_beyond_capacity_is_exact_and_keeps_values() {
    let mut items = DynArray::from([1, 2, 3]);

    items.reserve(37);

    assert_eq!(items.capacity(), 37);
    assert_eq!(items, [1, 2, 3]);
}

#[test]
fn pushes_reallocate_logarithmically() {
    let slots = ObservedSlots::default();
    let mut items = DynArray::new_in(slots.clone());

    for value in 0..4096_u32 {
        items.push(value);
    }

    // 8, 16, 32, ..., 4096
    assert_eq!(slots.allocated(), 10);
    assert_eq!(slots.live(), 1);
    assert!(items.iter().copied().eq(0..4096));
}

#[test]
fn resize_shrinks_and_grows() {
    let mut items = DynArray::from([1, 2, 3, 4]);

    items.resize(2, 0);
    assert_eq!(items, [1, 2]);

    items.resize(5, 9);
    assert_eq!(items, [1, 2, 9, 9, 9]);
}

#[test]
fn self_assignment_through_clone_is_unchanged() {
    let mut items = DynArray::from([5, 6, 7]);
    items.reserve(16);

    let snapshot = items.clone();
    items.assign_from(&snapshot);

    assert_eq!(items, [5, 6, 7]);
    assert_eq!(items.capacity(), 16);
}

#[test]
fn assignment_policies_differ_in_allocation() {
    let slots = ObservedSlots::default();
    let source = DynArray::try_from_elem_in(3, 1_u8, slots.clone()).unwrap();

    let mut reusing = DynArray::try_from_elem_in(6, 0_u8, slots.clone()).unwrap();
    let mut swapping = reusing.try_clone().unwrap();
    swapping.set_assign_policy(AssignPolicy::AllocateAndSwap);
    let before = slots.allocated();

    reusing.assign_from(&source);
    assert_eq!(slots.allocated(), before);
    assert_eq!(reusing.capacity(), 6);

    swapping.assign_from(&source);
    assert_eq!(slots.allocated(), before + 1);
    assert_eq!(swapping.capacity(), 3);

    assert_eq!(reusing, swapping);
}

#[test]
fn exhausted_allocator_reports_errors() {
    let mut items = DynArray::new_in(ExhaustedSlots);

    assert!(matches!(
        items.try_push(1_u16),
        Err(Error::AllocationFailed { .. })
    ));
    assert!(matches!(
        items.try_reserve(3),
        Err(Error::AllocationFailed { .. })
    ));
    assert!(items.is_empty());
    assert_eq!(items.capacity(), 0);
}

#[test]
fn zero_sized_elements_never_allocate() {
    let slots = ObservedSlots::default();
    let mut items = DynArray::new_in(slots.clone());

    for _ in 0..100 {
        items.push(());
    }

    assert_eq!(items.len(), 100);
    assert_eq!(slots.allocated(), 0);
}

#[test]
fn owning_iteration_releases_storage() {
    let slots = ObservedSlots::default();
    let items =
        DynArray::try_from_slice_in(&["a".to_string(), "b".to_string()], slots.clone()).unwrap();

    let collected: Vec<String> = items.into_iter().collect();

    assert_eq!(collected, ["a", "b"]);
    assert_eq!(slots.live(), 0);
}

#[test]
fn array_moves_between_threads() {
    let items = DynArray::from_elem(16, 3_u64);

    let sum = thread::spawn(move || items.iter().sum::<u64>())
        .join()
        .expect("thread completed successfully");

    assert_eq!(sum, 48);
}

#[test]
fn builder_configures_everything() {
    let slots = ObservedSlots::default();

    let items = DynArray::<String>::builder()
        .capacity(20)
        .assign_policy(AssignPolicy::AllocateAndSwap)
        .allocator(slots.clone())
        .build();

    assert_eq!(items.capacity(), 20);
    assert_eq!(items.assign_policy(), AssignPolicy::AllocateAndSwap);
    assert_eq!(slots.allocated(), 1);

    drop(items);
    assert_eq!(slots.live(), 0);
}
