//! Construction, destruction and relocation of values in raw slots.
//!
//! This is the only place where element lifetime is manipulated through raw pointers. Every
//! construction routine here is panic-safe: if producing a value panics partway, the values
//! already constructed by that routine are destroyed before the panic continues, so the caller
//! only ever observes "all slots constructed" or "no slots constructed".

use std::ptr::{self, NonNull};

use scopeguard::ScopeGuard;

/// Constructs `count` values in consecutive slots starting at `dst`, obtaining each value
/// from `make`.
///
/// # Safety
///
/// The caller must guarantee that `dst` is valid for writes of `count` values of `T` and that
/// the slots do not currently hold live values (they would be overwritten without being dropped).
pub(crate) unsafe fn fill_with<T>(dst: NonNull<T>, count: usize, mut make: impl FnMut() -> T) {
    let mut constructed = scopeguard::guard(0_usize, |constructed| {
        // SAFETY: Exactly `constructed` leading slots were initialized below.
        unsafe {
            destroy(dst, constructed);
        }
    });

    while *constructed < count {
        let value = make();

        // SAFETY: The caller guarantees `count` writable slots and we stay below `count`.
        let slot = unsafe { dst.add(*constructed) };

        // SAFETY: The slot is valid for writes and holds no live value.
        unsafe {
            slot.write(value);
        }

        // Cannot overflow - bounded by `count`.
        *constructed = constructed.wrapping_add(1);
    }

    ScopeGuard::into_inner(constructed);
}

/// Constructs `count` copies of `value` in consecutive slots starting at `dst`.
///
/// The last slot receives `value` itself, all others receive clones.
///
/// # Safety
///
/// Same as [`fill_with()`].
pub(crate) unsafe fn fill<T: Clone>(dst: NonNull<T>, count: usize, value: T) {
    let Some(cloned) = count.checked_sub(1) else {
        // Nothing to construct, the value is simply dropped.
        return;
    };

    // SAFETY: Forwarding the caller's guarantees for the first `cloned` slots.
    unsafe {
        fill_with(dst, cloned, || value.clone());
    }

    // SAFETY: `cloned` is below `count`, so this is still within the writable slots.
    let last = unsafe { dst.add(cloned) };

    // SAFETY: The last slot is writable and holds no live value. Moving a value cannot panic,
    // so there is nothing to clean up after this point.
    unsafe {
        last.write(value);
    }
}

/// Constructs clones of every element of `src` in consecutive slots starting at `dst`.
///
/// # Safety
///
/// The caller must guarantee that `dst` is valid for writes of `src.len()` values of `T`, that
/// the slots do not hold live values and that they do not overlap with `src`.
pub(crate) unsafe fn clone_from_slice<T: Clone>(dst: NonNull<T>, src: &[T]) {
    // SAFETY: Forwarding the caller's guarantees. A slice iterator never runs dry early,
    // so every one of the `src.len()` slots is constructed.
    let written = unsafe { write_from_iter(dst, src.len(), &mut src.iter().cloned()) };

    debug_assert_eq!(written, src.len());
}

/// Constructs up to `count` values taken from `source` in consecutive slots starting at `dst`.
///
/// Returns the number of slots constructed, which is less than `count` if the iterator ran out
/// early. Surplus items are left in the iterator.
///
/// # Safety
///
/// The caller must guarantee that `dst` is valid for writes of `count` values of `T` and that
/// the slots do not hold live values.
pub(crate) unsafe fn write_from_iter<T>(
    dst: NonNull<T>,
    count: usize,
    source: &mut impl Iterator<Item = T>,
) -> usize {
    let mut constructed = scopeguard::guard(0_usize, |constructed| {
        // SAFETY: Exactly `constructed` leading slots were initialized below.
        unsafe {
            destroy(dst, constructed);
        }
    });

    while *constructed < count {
        let Some(value) = source.next() else {
            break;
        };

        // SAFETY: The caller guarantees `count` writable slots and we stay below `count`.
        let slot = unsafe { dst.add(*constructed) };

        // SAFETY: The slot is valid for writes and holds no live value.
        unsafe {
            slot.write(value);
        }

        // Cannot overflow - bounded by `count`.
        *constructed = constructed.wrapping_add(1);
    }

    ScopeGuard::into_inner(constructed)
}

/// Destroys `count` live values in consecutive slots starting at `first`.
///
/// The slots become raw memory again. If a destructor panics, the remaining values are still
/// destroyed (this is the behavior of dropping a slice in place).
///
/// # Safety
///
/// The caller must guarantee that the slots hold `count` live values and that nothing uses
/// those values afterwards.
pub(crate) unsafe fn destroy<T>(first: NonNull<T>, count: usize) {
    let live = ptr::slice_from_raw_parts_mut(first.as_ptr(), count);

    // SAFETY: Forwarding the caller's guarantee that these are live values no longer in use.
    unsafe {
        ptr::drop_in_place(live);
    }
}

/// Relocates `count` live values from the slots at `src` into the raw slots at `dst`.
///
/// This is a move-construct at the destination followed by ending the value's life at the
/// source. Moves in Rust are bitwise copies that cannot fail, so relocation either fully
/// happens or (for a caller that never reaches it) does not happen at all - there is no
/// partially relocated state to roll back. Afterwards the source slots are raw memory and
/// must not be dropped.
///
/// # Safety
///
/// The caller must guarantee that `src` holds `count` live values, that `dst` is valid for
/// writes of `count` values and holds no live values, and that the two ranges do not overlap.
pub(crate) unsafe fn relocate<T>(src: NonNull<T>, dst: NonNull<T>, count: usize) {
    // SAFETY: Forwarding the caller's guarantees of validity and non-overlap.
    unsafe {
        ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), count);
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
    use std::panic::{self, AssertUnwindSafe};

    use super::*;
    use crate::testing::Tracker;
    use crate::{MemoryLease, SystemSlots};

    #[test]
    fn fill_constructs_every_slot() {
        let tracker = Tracker::new();
        let lease = MemoryLease::acquire(SystemSlots, 4, 0).unwrap();

        unsafe {
            fill(lease.first(), 4, tracker.item(7));
        }

        // Three clones plus the original value moved into the last slot.
        assert_eq!(tracker.live(), 4);

        unsafe {
            assert_eq!(lease.first().add(0).as_ref().value, 7);
            assert_eq!(lease.first().add(3).as_ref().value, 7);

            destroy(lease.first(), 4);
        }

        assert_eq!(tracker.live(), 0);
    }

    #[test]
    fn fill_zero_count_drops_the_value() {
        let tracker = Tracker::new();
        let lease = MemoryLease::acquire(SystemSlots, 0, 0).unwrap();

        unsafe {
            fill(lease.first(), 0, tracker.item(1));
        }

        assert_eq!(tracker.live(), 0);
    }

    #[test]
    fn panicking_fill_destroys_constructed_prefix() {
        let tracker = Tracker::new();
        let lease = MemoryLease::acquire(SystemSlots, 5, 0).unwrap();
        let template = tracker.item(3);

        tracker.panic_after_clones(2);

        let result = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
            fill(lease.first(), 5, template);
        }));

        assert!(result.is_err());

        // The two successful clones were destroyed by the guard and the template
        // was dropped during unwinding.
        assert_eq!(tracker.live(), 0);
    }

    #[test]
    fn clone_from_slice_preserves_order() {
        let source = vec![String::from("a"), String::from("b"), String::from("c")];
        let lease = MemoryLease::<String>::acquire(SystemSlots, 3, 0).unwrap();

        unsafe {
            clone_from_slice(lease.first(), &source);

            let copied = std::slice::from_raw_parts(lease.first().as_ptr(), 3);
            assert_eq!(copied, source.as_slice());

            destroy(lease.first(), 3);
        }
    }

    #[test]
    fn write_from_iter_stops_when_iterator_runs_dry() {
        let lease = MemoryLease::<u32>::acquire(SystemSlots, 5, 0).unwrap();
        let mut source = [1_u32, 2, 3].into_iter();

        let written = unsafe { write_from_iter(lease.first(), 5, &mut source) };

        assert_eq!(written, 3);
        unsafe {
            assert_eq!(lease.first().add(2).read(), 3);
        }
    }

    #[test]
    fn write_from_iter_leaves_surplus_in_iterator() {
        let lease = MemoryLease::<u32>::acquire(SystemSlots, 2, 0).unwrap();
        let mut source = [1_u32, 2, 3, 4].into_iter();

        let written = unsafe { write_from_iter(lease.first(), 2, &mut source) };

        assert_eq!(written, 2);
        assert_eq!(source.next(), Some(3));
    }

    #[test]
    fn relocate_moves_values_without_duplicating() {
        let tracker = Tracker::new();
        let old = MemoryLease::acquire(SystemSlots, 3, 0).unwrap();
        let new = MemoryLease::acquire(SystemSlots, 3, 2).unwrap();

        unsafe {
            let mut next = 0;
            fill_with(old.first(), 3, || {
                next += 1;
                tracker.item(next)
            });

            relocate(old.first(), new.first(), 3);
        }

        // Relocation neither creates nor destroys values.
        assert_eq!(tracker.live(), 3);

        unsafe {
            assert_eq!(new.first().add(0).as_ref().value, 1);
            assert_eq!(new.first().add(2).as_ref().value, 3);

            destroy(new.first(), 3);
        }

        assert_eq!(tracker.live(), 0);
    }
}
