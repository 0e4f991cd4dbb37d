use std::iter::FusedIterator;
use std::{fmt, slice};

use crate::{DynArray, MemoryLease, SlotAllocator, SystemSlots, slots};

/// An iterator that moves elements out of a [`DynArray`], front to back.
///
/// Elements that are not consumed are dropped together with the iterator, after which the
/// storage is released.
///
/// # Examples
///
/// ```
/// use lease_array::DynArray;
///
/// let words = DynArray::from(["ab".to_string(), "ac".to_string(), "ad".to_string()]);
///
/// let joined: String = words.into_iter().collect();
/// assert_eq!(joined, "abacad");
/// ```
pub struct IntoIter<T, A: SlotAllocator = SystemSlots> {
    lease: MemoryLease<T, A>,

    /// Index of the next element to yield from the front.
    front: usize,

    /// One past the index of the next element to yield from the back.
    back: usize,
}

impl<T, A: SlotAllocator> IntoIter<T, A> {
    /// The elements that have not yet been yielded.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: The slots between front and back hold live values that we own.
        let first = unsafe { self.lease.first().add(self.front) };

        // Cannot underflow - front never passes back.
        let remaining = self.back.wrapping_sub(self.front);

        // SAFETY: `remaining` live values start at `first`.
        unsafe { slice::from_raw_parts(first.as_ptr(), remaining) }
    }
}

impl<T, A: SlotAllocator> Iterator for IntoIter<T, A> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.front == self.back {
            return None;
        }

        // SAFETY: front is below back, so the slot holds a live value that we own.
        let slot = unsafe { self.lease.first().add(self.front) };

        // Cannot overflow - bounded by back.
        self.front = self.front.wrapping_add(1);

        // SAFETY: The slot held a live value and is now outside the live range, so this read
        // transfers ownership to the caller.
        Some(unsafe { slot.read() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len();
        (remaining, Some(remaining))
    }
}

impl<T, A: SlotAllocator> DoubleEndedIterator for IntoIter<T, A> {
    fn next_back(&mut self) -> Option<T> {
        if self.front == self.back {
            return None;
        }

        // Cannot underflow - back is above front.
        self.back = self.back.wrapping_sub(1);

        // SAFETY: back is below the old back, so the slot is within the region.
        let slot = unsafe { self.lease.first().add(self.back) };

        // SAFETY: The slot held a live value and is now outside the live range.
        Some(unsafe { slot.read() })
    }
}

impl<T, A: SlotAllocator> ExactSizeIterator for IntoIter<T, A> {
    fn len(&self) -> usize {
        // Cannot underflow - front never passes back.
        self.back.wrapping_sub(self.front)
    }
}

impl<T, A: SlotAllocator> FusedIterator for IntoIter<T, A> {}

impl<T, A: SlotAllocator> Drop for IntoIter<T, A> {
    fn drop(&mut self) {
        // SAFETY: front is within the region.
        let first = unsafe { self.lease.first().add(self.front) };

        let remaining = self.len();

        // Empty the live range before dropping, so a panicking destructor cannot
        // cause a double drop.
        self.front = self.back;

        // SAFETY: The remaining slots hold live values that nobody else can reach.
        unsafe {
            slots::destroy(first, remaining);
        }
    }
}

impl<T: fmt::Debug, A: SlotAllocator> fmt::Debug for IntoIter<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IntoIter").field(&self.as_slice()).finish()
    }
}

impl<T, A: SlotAllocator> IntoIterator for DynArray<T, A> {
    type Item = T;
    type IntoIter = IntoIter<T, A>;

    fn into_iter(self) -> Self::IntoIter {
        let (lease, len) = self.into_parts();

        IntoIter {
            lease,
            front: 0,
            back: len,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::testing::{CountingSlots, Tracker};

    assert_impl_all!(IntoIter<u32>: Send, Sync, fmt::Debug, ExactSizeIterator, DoubleEndedIterator);

    #[test]
    fn yields_in_order() {
        let items = DynArray::from([1, 2, 3]);

        assert_eq!(items.into_iter().collect::<Vec<_>>(), [1, 2, 3]);
    }

    #[test]
    fn yields_from_both_ends() {
        let mut iter = DynArray::from([1, 2, 3, 4]).into_iter();

        assert_eq!(iter.next(), Some(1));
        assert_eq!(iter.next_back(), Some(4));
        assert_eq!(iter.len(), 2);
        assert_eq!(iter.as_slice(), &[2, 3]);
        assert_eq!(iter.next_back(), Some(3));
        assert_eq!(iter.next(), Some(2));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next_back(), None);
    }

    #[test]
    fn partially_consumed_iterator_drops_the_rest() {
        let tracker = Tracker::new();
        let slots = CountingSlots::new();
        let mut items = DynArray::new_in(slots.clone());

        for value in 0..10 {
            items.push(tracker.item(value));
        }

        let mut iter = items.into_iter();
        let first = iter.next().unwrap();
        let last = iter.next_back().unwrap();

        assert_eq!(first.value, 0);
        assert_eq!(last.value, 9);

        drop(iter);

        assert_eq!(tracker.live(), 2);
        assert_eq!(slots.live_regions(), 0);
    }

    #[test]
    fn empty_array_yields_nothing() {
        let mut iter = DynArray::<String>::new().into_iter();

        assert_eq!(iter.size_hint(), (0, Some(0)));
        assert!(iter.next().is_none());
    }

    #[test]
    fn debug_shows_remaining() {
        let mut iter = DynArray::from([5, 6]).into_iter();
        iter.next();

        assert_eq!(format!("{iter:?}"), "IntoIter([6])");
    }
}
