//! Test-only allocator and element types that make storage and lifetime events observable.

use std::alloc::Layout;
use std::cell::{Cell, RefCell};
use std::ptr::NonNull;
use std::rc::Rc;

use crate::{Error, Result, SlotAllocator, SystemSlots};

/// A slot allocator that counts the regions it hands out and can be told to fail.
///
/// Clones share the same counters, just like clones of a real allocator handle share the heap.
#[derive(Clone, Debug, Default)]
pub(crate) struct CountingSlots {
    state: Rc<CountingState>,
}

#[derive(Debug, Default)]
struct CountingState {
    allocations: Cell<usize>,
    deallocations: Cell<usize>,
    fail_next: Cell<bool>,
}

impl CountingSlots {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of successful `allocate()` calls so far.
    pub(crate) fn allocations(&self) -> usize {
        self.state.allocations.get()
    }

    /// Number of regions allocated but not yet returned.
    pub(crate) fn live_regions(&self) -> usize {
        self.state
            .allocations
            .get()
            .checked_sub(self.state.deallocations.get())
            .expect("more regions were returned than allocated")
    }

    /// The next `allocate()` call will fail with [`Error::AllocationFailed`].
    pub(crate) fn fail_next_allocation(&self) {
        self.state.fail_next.set(true);
    }
}

// SAFETY: All real work is forwarded to SystemSlots.
unsafe impl SlotAllocator for CountingSlots {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>> {
        if self.state.fail_next.replace(false) {
            return Err(Error::AllocationFailed { layout });
        }

        let ptr = SystemSlots.allocate(layout)?;
        self.state
            .allocations
            .set(self.state.allocations.get().wrapping_add(1));
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.state
            .deallocations
            .set(self.state.deallocations.get().wrapping_add(1));

        // SAFETY: Forwarding the caller's guarantee; every region we hand out came from SystemSlots.
        unsafe {
            SystemSlots.deallocate(ptr, layout);
        }
    }
}

/// Counts live [`Tracked`] instances and optionally injects a panic into `Clone` or `Default`.
#[derive(Debug, Default)]
pub(crate) struct Tracker {
    live: Cell<usize>,
    clones_before_panic: Cell<Option<usize>>,
    defaults_before_panic: Cell<Option<usize>>,
}

thread_local! {
    // `Default::default()` takes no arguments, so the tracker that default values report to
    // is registered per thread.
    static DEFAULT_TRACKER: RefCell<Option<Rc<Tracker>>> = const { RefCell::new(None) };
}

impl Tracker {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub(crate) fn item(self: &Rc<Self>, value: u32) -> Tracked {
        self.live.set(self.live.get().wrapping_add(1));

        Tracked {
            value,
            tracker: Rc::clone(self),
        }
    }

    /// Number of [`Tracked`] instances that have been created and not yet dropped.
    pub(crate) fn live(&self) -> usize {
        self.live.get()
    }

    /// Allows `clones` more successful clones, after which `Clone::clone` panics.
    pub(crate) fn panic_after_clones(&self, clones: usize) {
        self.clones_before_panic.set(Some(clones));
    }

    /// Makes `Tracked::default()` on this thread create items reporting to this tracker.
    pub(crate) fn provide_defaults(self: &Rc<Self>) {
        DEFAULT_TRACKER.with_borrow_mut(|tracker| *tracker = Some(Rc::clone(self)));
    }

    /// Allows `defaults` more successful `Default::default()` calls, after which it panics.
    pub(crate) fn panic_after_defaults(&self, defaults: usize) {
        self.defaults_before_panic.set(Some(defaults));
    }

    /// Removes any injected clone or default failure.
    pub(crate) fn disarm(&self) {
        self.clones_before_panic.set(None);
        self.defaults_before_panic.set(None);
    }
}

/// An element that reports its lifetime to a [`Tracker`].
#[derive(Debug)]
pub(crate) struct Tracked {
    pub(crate) value: u32,
    tracker: Rc<Tracker>,
}

impl Clone for Tracked {
    fn clone(&self) -> Self {
        if let Some(remaining) = self.tracker.clones_before_panic.get() {
            assert!(remaining > 0, "clone failure injected by test");
            self.tracker
                .clones_before_panic
                .set(Some(remaining.wrapping_sub(1)));
        }

        self.tracker.item(self.value)
    }
}

impl Default for Tracked {
    fn default() -> Self {
        let tracker = DEFAULT_TRACKER
            .with_borrow(Option::clone)
            .expect("Tracker::provide_defaults() must be called before Tracked::default()");

        if let Some(remaining) = tracker.defaults_before_panic.get() {
            assert!(remaining > 0, "default failure injected by test");
            tracker
                .defaults_before_panic
                .set(Some(remaining.wrapping_sub(1)));
        }

        tracker.item(0)
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.tracker
            .live
            .set(self.tracker.live.get().wrapping_sub(1));
    }
}

impl PartialEq for Tracked {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

/// Extracts the plain values from a slice of tracked elements.
pub(crate) fn values(items: &[Tracked]) -> Vec<u32> {
    items.iter().map(|item| item.value).collect()
}
