use std::any::type_name;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::num::NonZero;
use std::ops::{Deref, DerefMut, Range};
use std::ptr::NonNull;
use std::{fmt, mem, slice};

use new_zealand::nz;
use tracing::debug;

use crate::{
    AssignPolicy, DynArrayBuilder, Error, MemoryLease, Result, SlotAllocator, SystemSlots, slots,
    unwrap_storage,
};

/// Capacity of the first region acquired when pushing into an array without spare capacity.
///
/// Doubling alone would never get an empty array off the ground, so growth starts here.
pub(crate) const MIN_GROWTH_CAPACITY: NonZero<usize> = nz!(8);

/// A contiguous growable array that stores its elements in a [`MemoryLease`].
///
/// The array owns exactly one lease at a time. The leading `len()` slots of the lease hold live
/// elements, the remaining slots up to `capacity()` are raw memory. Operations that change the
/// capacity acquire a new lease and relocate the elements into it; operations that only change
/// the length construct or destroy elements in place.
///
/// # Fallible and panicking operations
///
/// Every operation that may need storage comes in two forms: a `try_` form that returns
/// [`Error`] if the [`SlotAllocator`] cannot provide memory, leaving the array untouched, and a
/// plain form that panics in that situation.
///
/// Element operations (`Clone`, `Default`) report failure by panicking. The array never leaks
/// or double-drops when that happens; see the individual methods for what state the array is
/// left in.
///
/// # Growth
///
/// Pushing into a full array doubles its capacity (starting from 8 slots), giving amortized O(1)
/// appends. [`reserve()`](Self::reserve) on the other hand grows to exactly the requested
/// capacity.
///
/// # Examples
///
/// ```
/// use lease_array::DynArray;
///
/// let mut numbers = DynArray::from_elem(3, 7);
/// assert_eq!(numbers, [7, 7, 7]);
///
/// numbers.push(9);
/// assert_eq!(numbers.len(), 4);
/// assert_eq!(numbers.last(), Some(&9));
///
/// numbers.resize(2, 0);
/// assert_eq!(numbers, [7, 7]);
///
/// numbers.reserve(100);
/// assert!(numbers.capacity() >= 100);
/// assert_eq!(numbers, [7, 7]);
/// ```
///
/// # Thread safety
///
/// The array is [`Send`] and [`Sync`] whenever its element type and allocator are, just like any
/// other owned collection. It performs no internal synchronization.
pub struct DynArray<T, A: SlotAllocator = SystemSlots> {
    lease: MemoryLease<T, A>,

    /// Number of leading slots in the lease that hold live elements.
    len: usize,

    assign_policy: AssignPolicy,

    // We own values of type T and drop them in our Drop implementation.
    _owns: PhantomData<T>,
}

impl<T> DynArray<T> {
    /// Creates an empty array without allocating any memory.
    ///
    /// # Examples
    ///
    /// ```
    /// use lease_array::DynArray;
    ///
    /// let items = DynArray::<String>::new();
    ///
    /// assert!(items.is_empty());
    /// assert_eq!(items.capacity(), 0);
    /// ```
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::new_in(SystemSlots)
    }

    /// Creates a builder for configuring the allocator, initial capacity and
    /// [assign policy][AssignPolicy] of a new array.
    ///
    /// # Examples
    ///
    /// ```
    /// use lease_array::DynArray;
    ///
    /// let items = DynArray::<u32>::builder().capacity(16).build();
    ///
    /// assert!(items.is_empty());
    /// assert_eq!(items.capacity(), 16);
    /// ```
    #[inline]
    pub fn builder() -> DynArrayBuilder<T> {
        DynArrayBuilder::new()
    }

    /// Creates an array of `len` elements, each equal to `value`.
    ///
    /// # Panics
    ///
    /// Panics if the storage cannot be allocated. If cloning `value` panics, all elements
    /// cloned so far are dropped and the storage is released before the panic continues.
    ///
    /// # Examples
    ///
    /// ```
    /// use lease_array::DynArray;
    ///
    /// let greetings = DynArray::from_elem(2, "hello".to_string());
    /// assert_eq!(greetings, ["hello", "hello"]);
    /// ```
    #[must_use]
    #[track_caller]
    pub fn from_elem(len: usize, value: T) -> Self
    where
        T: Clone,
    {
        unwrap_storage(Self::try_from_elem(len, value))
    }

    /// Creates an array of `len` elements, each equal to `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be allocated. No array is produced and `value`
    /// is dropped.
    pub fn try_from_elem(len: usize, value: T) -> Result<Self>
    where
        T: Clone,
    {
        Self::try_from_elem_in(len, value, SystemSlots)
    }

    /// Creates an array of `len` default-valued elements.
    ///
    /// # Panics
    ///
    /// Panics if the storage cannot be allocated.
    #[must_use]
    #[track_caller]
    pub fn with_len_default(len: usize) -> Self
    where
        T: Default,
    {
        unwrap_storage(Self::try_with_len_default(len))
    }

    /// Creates an array of `len` default-valued elements.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be allocated.
    pub fn try_with_len_default(len: usize) -> Result<Self>
    where
        T: Default,
    {
        Self::try_with_len_default_in(len, SystemSlots)
    }

    /// Creates an array holding clones of the elements of `source`, in order.
    ///
    /// # Panics
    ///
    /// Panics if the storage cannot be allocated.
    #[must_use]
    #[track_caller]
    pub fn from_slice(source: &[T]) -> Self
    where
        T: Clone,
    {
        unwrap_storage(Self::try_from_slice(source))
    }

    /// Creates an array holding clones of the elements of `source`, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be allocated.
    pub fn try_from_slice(source: &[T]) -> Result<Self>
    where
        T: Clone,
    {
        Self::try_from_slice_in(source, SystemSlots)
    }

    /// Creates an array from a sequence of known length, allocating exactly once.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be allocated.
    ///
    /// # Examples
    ///
    /// ```
    /// use lease_array::DynArray;
    ///
    /// let squares = DynArray::try_from_iter_exact((1..5).map(|x| x * x)).unwrap();
    ///
    /// assert_eq!(squares, [1, 4, 9, 16]);
    /// assert_eq!(squares.capacity(), 4);
    /// ```
    pub fn try_from_iter_exact<I>(items: I) -> Result<Self>
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator<Item = T>,
    {
        Self::try_from_iter_exact_in(items, SystemSlots)
    }
}

impl<T, A: SlotAllocator> DynArray<T, A> {
    /// Creates an empty array that will obtain its storage from `allocator`.
    ///
    /// This does not allocate.
    #[must_use]
    #[inline]
    pub fn new_in(allocator: A) -> Self {
        Self::with_lease(MemoryLease::empty(allocator), AssignPolicy::default())
    }

    /// Wraps a lease that holds no live elements.
    pub(crate) fn with_lease(lease: MemoryLease<T, A>, assign_policy: AssignPolicy) -> Self {
        Self {
            lease,
            len: 0,
            assign_policy,
            _owns: PhantomData,
        }
    }

    /// Creates an array of `len` elements equal to `value`, using storage from `allocator`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be allocated.
    pub fn try_from_elem_in(len: usize, value: T, allocator: A) -> Result<Self>
    where
        T: Clone,
    {
        let lease = MemoryLease::acquire(allocator, len, 0)?;
        let mut array = Self::with_lease(lease, AssignPolicy::default());

        // SAFETY: The fresh lease has `len` primary slots, none of them holding a value.
        // If a clone panics, fill() destroys what it constructed and the lease is released
        // as `array` unwinds with a length of zero.
        unsafe {
            slots::fill(array.lease.first(), len, value);
        }

        array.len = array.lease.primary();
        Ok(array)
    }

    /// Creates an array of `len` default-valued elements, using storage from `allocator`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be allocated.
    pub fn try_with_len_default_in(len: usize, allocator: A) -> Result<Self>
    where
        T: Default,
    {
        let lease = MemoryLease::acquire(allocator, len, 0)?;
        let mut array = Self::with_lease(lease, AssignPolicy::default());

        // SAFETY: The fresh lease has `len` primary slots, none of them holding a value.
        unsafe {
            slots::fill_with(array.lease.first(), len, T::default);
        }

        array.len = array.lease.primary();
        Ok(array)
    }

    /// Creates an array holding clones of `source`, using storage from `allocator`.
    ///
    /// The capacity of the new array is exactly `source.len()`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be allocated.
    pub fn try_from_slice_in(source: &[T], allocator: A) -> Result<Self>
    where
        T: Clone,
    {
        let lease = MemoryLease::acquire(allocator, source.len(), 0)?;
        let mut array = Self::with_lease(lease, AssignPolicy::default());

        // SAFETY: The fresh lease has `source.len()` primary slots, none of them holding a
        // value, and it cannot overlap with a slice that existed before it was acquired.
        unsafe {
            slots::clone_from_slice(array.lease.first(), source);
        }

        array.len = array.lease.primary();
        Ok(array)
    }

    /// Creates an array from a sequence of known length, using storage from `allocator`.
    ///
    /// A single region sized by the iterator's reported length is acquired up front. If the
    /// iterator turns out to yield fewer items, the array is simply shorter than its capacity;
    /// if it yields more, the array grows to fit them.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be allocated.
    pub fn try_from_iter_exact_in<I>(items: I, allocator: A) -> Result<Self>
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator<Item = T>,
    {
        let mut source = items.into_iter();
        let expected = source.len();

        let lease = MemoryLease::acquire(allocator, expected, 0)?;
        let mut array = Self::with_lease(lease, AssignPolicy::default());

        // SAFETY: The fresh lease has `expected` primary slots, none of them holding a value.
        array.len = unsafe { slots::write_from_iter(array.lease.first(), expected, &mut source) };

        for item in source {
            array.try_push(item)?;
        }

        Ok(array)
    }

    /// Number of live elements.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Number of elements the array can hold before it needs to acquire new storage.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.lease.capacity()
    }

    /// Whether the array holds no elements.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The allocator that provides storage for this array.
    #[must_use]
    #[inline]
    pub fn allocator(&self) -> &A {
        self.lease.allocator()
    }

    /// The [policy][AssignPolicy] used when copy-assigning into this array.
    #[must_use]
    #[inline]
    pub fn assign_policy(&self) -> AssignPolicy {
        self.assign_policy
    }

    /// Changes the [policy][AssignPolicy] used when copy-assigning into this array.
    #[inline]
    pub fn set_assign_policy(&mut self, policy: AssignPolicy) {
        self.assign_policy = policy;
    }

    /// Views the live elements as a slice.
    #[must_use]
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: The first `len` slots hold live values and the pointer is non-null and aligned
        // even when nothing is allocated.
        unsafe { slice::from_raw_parts(self.lease.first().as_ptr(), self.len) }
    }

    /// Views the live elements as a mutable slice.
    #[must_use]
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: As in as_slice(), and &mut self guarantees exclusive access.
        unsafe { slice::from_raw_parts_mut(self.lease.first().as_ptr(), self.len) }
    }

    /// Pointer to the first slot.
    ///
    /// The pointer is dangling if the array has never allocated.
    #[must_use]
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.lease.first().as_ptr()
    }

    /// Mutable pointer to the first slot.
    #[must_use]
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.lease.first().as_ptr()
    }

    /// The boundaries of the live range, for linear traversal with raw pointers.
    ///
    /// No bounds checks are performed when the pointers are used. The positions are invalidated
    /// by any operation that changes the capacity; prefer [`iter()`](slice::iter) whenever
    /// a borrow will do.
    ///
    /// # Examples
    ///
    /// ```
    /// use lease_array::DynArray;
    ///
    /// let items = DynArray::from([1, 2, 3]);
    /// let range = items.as_ptr_range();
    ///
    /// // SAFETY: Both pointers come from the same live range.
    /// let distance = unsafe { range.end.offset_from(range.start) };
    /// assert_eq!(distance, 3);
    /// ```
    #[must_use]
    #[inline]
    pub fn as_ptr_range(&self) -> Range<*const T> {
        self.as_slice().as_ptr_range()
    }

    /// The mutable boundaries of the live range, for linear traversal with raw pointers.
    ///
    /// The same caveats apply as for [`as_ptr_range()`](Self::as_ptr_range).
    #[must_use]
    #[inline]
    pub fn as_mut_ptr_range(&mut self) -> Range<*mut T> {
        self.as_mut_slice().as_mut_ptr_range()
    }

    /// Pointer to the first raw slot after the live elements.
    pub(crate) fn spare_first(&self) -> NonNull<T> {
        // SAFETY: `len` never exceeds the capacity of the lease, so this stays within
        // (or one past the end of) the region.
        unsafe { self.lease.first().add(self.len) }
    }

    /// Marks the first `len` slots as the live range.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that `len` does not exceed the capacity and that exactly
    /// the first `len` slots hold live values.
    pub(crate) unsafe fn set_len(&mut self, len: usize) {
        debug_assert!(len <= self.capacity());
        self.len = len;
    }

    /// Ensures the capacity is at least `capacity`.
    ///
    /// # Panics
    ///
    /// Panics if the storage cannot be allocated.
    #[track_caller]
    pub fn reserve(&mut self, capacity: usize) {
        unwrap_storage(self.try_reserve(capacity));
    }

    /// Ensures the capacity is at least `capacity`.
    ///
    /// Does nothing if the capacity is already sufficient. Otherwise acquires a region of
    /// exactly `capacity` slots, relocates the live elements into it in index order and releases
    /// the previous region. Lengths and element values never change.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be allocated, in which case the array is untouched.
    pub fn try_reserve(&mut self, capacity: usize) -> Result<()> {
        if capacity <= self.capacity() {
            return Ok(());
        }

        // Cannot underflow - capacity exceeds the current capacity, which is at least len.
        let extra = capacity.wrapping_sub(self.len);

        let replacement = MemoryLease::acquire(self.allocator().clone(), self.len, extra)?;

        // SAFETY: Our first `len` slots hold live values, the replacement has `len` primary
        // slots holding nothing and the two regions are distinct allocations. After this,
        // the values live only in the replacement.
        unsafe {
            slots::relocate(self.lease.first(), replacement.first(), self.len);
        }

        // The superseded lease holds no live values anymore and is released as it drops.
        drop(mem::replace(&mut self.lease, replacement));

        Ok(())
    }

    /// Grows the capacity ahead of a push into a full array.
    #[cfg_attr(test, mutants::skip)] // Can be mutated to skip growth and write past the end of the region.
    fn grow_for_push(&mut self) -> Result<()> {
        let doubled = self.len.checked_mul(2).ok_or(Error::CapacityOverflow {
            requested: usize::MAX,
        })?;

        let target = doubled.max(MIN_GROWTH_CAPACITY.get());

        debug!(
            element = type_name::<T>(),
            from_capacity = self.capacity(),
            to_capacity = target,
            "growing array storage"
        );

        self.try_reserve(target)
    }

    /// Appends `value` as the new last element.
    ///
    /// # Panics
    ///
    /// Panics if the array is full and new storage cannot be allocated.
    #[track_caller]
    pub fn push(&mut self, value: T) {
        unwrap_storage(self.try_push(value));
    }

    /// Appends `value` as the new last element, growing the storage if the array is full.
    ///
    /// # Errors
    ///
    /// Returns an error if the array is full and new storage cannot be allocated. The array
    /// is untouched and `value` is dropped.
    pub fn try_push(&mut self, value: T) -> Result<()> {
        if self.len == self.capacity() {
            self.grow_for_push()?;
        }

        // SAFETY: We just ensured there is at least one raw slot after the live elements.
        unsafe {
            self.spare_first().write(value);
        }

        // Cannot overflow - bounded by capacity.
        self.len = self.len.wrapping_add(1);

        Ok(())
    }

    /// Removes the last element and returns it, or `None` if the array is empty.
    pub fn pop(&mut self) -> Option<T> {
        self.len = self.len.checked_sub(1)?;

        // SAFETY: The slot at the old last index held a live value. Having reduced `len`,
        // we are now the only owner of that value.
        Some(unsafe { self.spare_first().read() })
    }

    /// Shortens the array to `len` elements, dropping the rest.
    ///
    /// Does nothing if the array is already that short. The capacity is unchanged.
    pub fn truncate(&mut self, len: usize) {
        let Some(excess) = self.len.checked_sub(len) else {
            return;
        };

        // Update the length first so a panicking destructor cannot cause a double drop.
        self.len = len;

        // SAFETY: The `excess` slots after the new length held live values that are now
        // outside the live range and no longer reachable.
        unsafe {
            slots::destroy(self.spare_first(), excess);
        }
    }

    /// Drops all elements, keeping the capacity.
    #[inline]
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Changes the length to `len`, either dropping excess elements or appending clones
    /// of `value`.
    ///
    /// # Panics
    ///
    /// Panics if the storage cannot be allocated.
    #[track_caller]
    pub fn resize(&mut self, len: usize, value: T)
    where
        T: Clone,
    {
        unwrap_storage(self.try_resize(len, value));
    }

    /// Changes the length to `len`, either dropping excess elements or appending clones
    /// of `value`. The surviving prefix is never modified.
    ///
    /// When growing beyond the current capacity, the capacity becomes exactly `len`.
    ///
    /// If cloning `value` panics while growing, the elements appended so far are dropped and the
    /// array keeps its previous length (its capacity may already have grown).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be allocated, in which case the array is untouched.
    pub fn try_resize(&mut self, len: usize, value: T) -> Result<()>
    where
        T: Clone,
    {
        let Some(additional) = len.checked_sub(self.len) else {
            self.truncate(len);
            return Ok(());
        };

        self.try_reserve(len)?;

        // SAFETY: After the reservation there are at least `additional` raw slots after the
        // live elements. On panic, fill() destroys its partial work and `len` is untouched.
        unsafe {
            slots::fill(self.spare_first(), additional, value);
        }

        self.len = len;
        Ok(())
    }

    /// Changes the length to `len`, either dropping excess elements or appending
    /// default-valued elements.
    ///
    /// # Panics
    ///
    /// Panics if the storage cannot be allocated.
    #[track_caller]
    pub fn resize_default(&mut self, len: usize)
    where
        T: Default,
    {
        unwrap_storage(self.try_resize_default(len));
    }

    /// Changes the length to `len`, either dropping excess elements or appending
    /// default-valued elements.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be allocated, in which case the array is untouched.
    pub fn try_resize_default(&mut self, len: usize) -> Result<()>
    where
        T: Default,
    {
        let Some(additional) = len.checked_sub(self.len) else {
            self.truncate(len);
            return Ok(());
        };

        self.try_reserve(len)?;

        // SAFETY: After the reservation there are at least `additional` raw slots after the
        // live elements.
        unsafe {
            slots::fill_with(self.spare_first(), additional, T::default);
        }

        self.len = len;
        Ok(())
    }

    /// Moves all elements and the storage out of this array, leaving it empty with zero capacity.
    ///
    /// The emptied array keeps its allocator and assign policy and can be used again.
    ///
    /// # Examples
    ///
    /// ```
    /// use lease_array::DynArray;
    ///
    /// let mut source = DynArray::from([1, 2, 3]);
    /// let target = source.take();
    ///
    /// assert_eq!(target, [1, 2, 3]);
    /// assert_eq!(source.len(), 0);
    /// assert_eq!(source.capacity(), 0);
    /// ```
    #[must_use]
    pub fn take(&mut self) -> Self {
        let len = mem::replace(&mut self.len, 0);

        Self {
            lease: self.lease.take(),
            len,
            assign_policy: self.assign_policy,
            _owns: PhantomData,
        }
    }

    /// Replaces the contents of this array with the contents of `source`, leaving `source`
    /// empty with zero capacity.
    ///
    /// The previous elements of this array are dropped and its storage is released.
    pub fn move_from(&mut self, source: &mut Self) {
        let policy = self.assign_policy;

        *self = source.take();
        self.assign_policy = policy;
    }

    /// Hands the lease over to an owning iterator. The array is left empty.
    pub(crate) fn into_parts(mut self) -> (MemoryLease<T, A>, usize) {
        let len = mem::replace(&mut self.len, 0);
        (self.lease.take(), len)
    }
}

impl<T, A: SlotAllocator> Drop for DynArray<T, A> {
    fn drop(&mut self) {
        // The lease releases the region after this, once it is itself dropped.
        self.clear();
    }
}

impl<T, A: SlotAllocator + Default> Default for DynArray<T, A> {
    #[inline]
    fn default() -> Self {
        Self::new_in(A::default())
    }
}

impl<T, A: SlotAllocator> Deref for DynArray<T, A> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, A: SlotAllocator> DerefMut for DynArray<T, A> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T, A: SlotAllocator> AsRef<[T]> for DynArray<T, A> {
    #[inline]
    fn as_ref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, A: SlotAllocator> AsMut<[T]> for DynArray<T, A> {
    #[inline]
    fn as_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: fmt::Debug, A: SlotAllocator> fmt::Debug for DynArray<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T, U, A, B> PartialEq<DynArray<U, B>> for DynArray<T, A>
where
    T: PartialEq<U>,
    A: SlotAllocator,
    B: SlotAllocator,
{
    fn eq(&self, other: &DynArray<U, B>) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Eq, A: SlotAllocator> Eq for DynArray<T, A> {}

impl<T, U, A, const N: usize> PartialEq<[U; N]> for DynArray<T, A>
where
    T: PartialEq<U>,
    A: SlotAllocator,
{
    fn eq(&self, other: &[U; N]) -> bool {
        self.as_slice() == other
    }
}

impl<T, U, A> PartialEq<&[U]> for DynArray<T, A>
where
    T: PartialEq<U>,
    A: SlotAllocator,
{
    fn eq(&self, other: &&[U]) -> bool {
        self.as_slice() == *other
    }
}

impl<T: Hash, A: SlotAllocator> Hash for DynArray<T, A> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state);
    }
}

impl<T, const N: usize> From<[T; N]> for DynArray<T> {
    #[track_caller]
    fn from(items: [T; N]) -> Self {
        unwrap_storage(Self::try_from_iter_exact(items))
    }
}

impl<T: Clone> From<&[T]> for DynArray<T> {
    #[track_caller]
    fn from(items: &[T]) -> Self {
        Self::from_slice(items)
    }
}

impl<T> FromIterator<T> for DynArray<T> {
    fn from_iter<I: IntoIterator<Item = T>>(items: I) -> Self {
        let mut array = Self::new();
        array.extend(items);
        array
    }
}

impl<T, A: SlotAllocator> Extend<T> for DynArray<T, A> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, items: I) {
        let items = items.into_iter();
        let (lower_bound, _) = items.size_hint();

        let needed = self.len.saturating_add(lower_bound);
        if needed > self.capacity() {
            // Repeated small extends must not reallocate on every call.
            self.reserve(needed.max(self.len.saturating_mul(2)));
        }

        for item in items {
            self.push(item);
        }
    }
}

impl<'a, T, A: SlotAllocator> IntoIterator for &'a DynArray<T, A> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T, A: SlotAllocator> IntoIterator for &'a mut DynArray<T, A> {
    type Item = &'a mut T;
    type IntoIter = slice::IterMut<'a, T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::indexing_slicing,
    reason = "test code doesn't need the same safety rigor as production code"
)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;
    use std::panic::{self, AssertUnwindSafe};
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::testing::{CountingSlots, Tracked, Tracker, values};

    assert_impl_all!(DynArray<u32>: Send, Sync, fmt::Debug, Default, Clone);
    assert_impl_all!(DynArray<Cell<u32>>: Send);
    assert_not_impl_any!(DynArray<Cell<u32>>: Sync);
    assert_not_impl_any!(DynArray<Rc<u32>>: Send, Sync);

    #[test]
    fn smoke_test() {
        let mut items = DynArray::from_elem(3, 7);

        assert_eq!(items.len(), 3);
        assert_eq!(items, [7, 7, 7]);

        items.push(9);
        assert_eq!(items.len(), 4);
        assert_eq!(items[3], 9);

        items.resize(2, 0);
        assert_eq!(items.len(), 2);
        assert_eq!(items, [7, 7]);

        items.reserve(100);
        assert!(items.capacity() >= 100);
        assert_eq!(items, [7, 7]);
    }

    #[test]
    fn new_does_not_allocate() {
        let slots = CountingSlots::new();
        let items = DynArray::<u64, _>::new_in(slots.clone());

        assert!(items.is_empty());
        assert_eq!(items.len(), 0);
        assert_eq!(items.capacity(), 0);
        assert_eq!(slots.allocations(), 0);
    }

    #[test]
    fn from_elem_fills_exact_capacity() {
        let items = DynArray::from_elem(5, String::from("x"));

        assert_eq!(items.len(), 5);
        assert_eq!(items.capacity(), 5);
        assert!(items.iter().all(|item| item == "x"));
    }

    #[test]
    fn from_elem_with_zero_len_does_not_allocate() {
        let slots = CountingSlots::new();
        let tracker = Tracker::new();

        let items = DynArray::try_from_elem_in(0, tracker.item(1), slots.clone()).unwrap();

        assert!(items.is_empty());
        assert_eq!(slots.allocations(), 0);
        assert_eq!(tracker.live(), 0);
    }

    #[test]
    fn from_elem_panicking_clone_leaks_nothing() {
        let slots = CountingSlots::new();
        let tracker = Tracker::new();
        let template = tracker.item(4);

        tracker.panic_after_clones(3);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            DynArray::try_from_elem_in(10, template, slots.clone())
        }));

        assert!(result.is_err());
        assert_eq!(tracker.live(), 0);
        assert_eq!(slots.allocations(), 1);
        assert_eq!(slots.live_regions(), 0);
    }

    #[test]
    fn from_elem_allocation_failure_produces_nothing() {
        let slots = CountingSlots::new();
        let tracker = Tracker::new();
        slots.fail_next_allocation();

        let result = DynArray::try_from_elem_in(3, tracker.item(1), slots.clone());

        assert!(matches!(result, Err(Error::AllocationFailed { .. })));
        assert_eq!(tracker.live(), 0);
        assert_eq!(slots.live_regions(), 0);
    }

    #[test]
    #[should_panic]
    fn from_elem_overflow_panics() {
        let _items = DynArray::from_elem(usize::MAX, 1_u64);
    }

    #[test]
    fn with_len_default_uses_default_values() {
        let items = DynArray::<String>::with_len_default(3);

        assert_eq!(items, ["", "", ""]);
        assert_eq!(items.capacity(), 3);
    }

    #[test]
    fn from_iter_exact_preserves_order_and_allocates_once() {
        let slots = CountingSlots::new();

        let items = DynArray::try_from_iter_exact_in(["ab", "ac", "ad"], slots.clone()).unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(items.capacity(), 3);
        assert_eq!(items.iter().copied().collect::<Vec<_>>(), ["ab", "ac", "ad"]);
        assert_eq!(slots.allocations(), 1);
    }

    /// An iterator that claims a length different from what it actually yields.
    struct MisreportingIter {
        claimed: usize,
        remaining: u32,
    }

    impl Iterator for MisreportingIter {
        type Item = u32;

        fn next(&mut self) -> Option<u32> {
            self.remaining = self.remaining.checked_sub(1)?;
            Some(self.remaining)
        }

        fn size_hint(&self) -> (usize, Option<usize>) {
            (self.claimed, Some(self.claimed))
        }
    }

    impl ExactSizeIterator for MisreportingIter {}

    #[test]
    fn from_iter_exact_tolerates_short_iterator() {
        let items = DynArray::try_from_iter_exact(MisreportingIter {
            claimed: 5,
            remaining: 2,
        })
        .unwrap();

        assert_eq!(items, [1, 0]);
        assert_eq!(items.capacity(), 5);
    }

    #[test]
    fn from_iter_exact_tolerates_long_iterator() {
        let items = DynArray::try_from_iter_exact(MisreportingIter {
            claimed: 1,
            remaining: 3,
        })
        .unwrap();

        assert_eq!(items, [2, 1, 0]);
    }

    #[test]
    fn collect_from_unsized_iterator() {
        let items: DynArray<u32> = (0..20).filter(|x| x % 2 == 0).collect();

        assert_eq!(items.len(), 10);
        assert_eq!(items[9], 18);
    }

    #[test]
    fn reserve_within_capacity_is_noop() {
        let slots = CountingSlots::new();
        let mut items = DynArray::try_from_elem_in(4, 1_u32, slots.clone()).unwrap();
        let before = items.as_ptr();

        items.reserve(2);
        items.reserve(4);

        assert_eq!(items.as_ptr(), before);
        assert_eq!(items.capacity(), 4);
        assert_eq!(slots.allocations(), 1);
    }

    #[test]
    fn reserve_grows_to_exact_capacity() {
        let tracker = Tracker::new();
        let slots = CountingSlots::new();
        let mut items = DynArray::new_in(slots.clone());

        for value in 0..3 {
            items.push(tracker.item(value));
        }

        items.reserve(37);

        assert_eq!(items.capacity(), 37);
        assert_eq!(values(&items), [0, 1, 2]);

        // Relocation neither clones nor drops.
        assert_eq!(tracker.live(), 3);

        // The superseded region was released.
        assert_eq!(slots.live_regions(), 1);
    }

    #[test]
    fn reserve_failure_leaves_array_untouched() {
        let slots = CountingSlots::new();
        let mut items = DynArray::try_from_elem_in(2, 5_u8, slots.clone()).unwrap();
        let before = items.as_ptr();

        slots.fail_next_allocation();

        assert!(items.try_reserve(10).is_err());
        assert_eq!(items, [5, 5]);
        assert_eq!(items.capacity(), 2);
        assert_eq!(items.as_ptr(), before);
    }

    #[test]
    fn resize_failure_leaves_array_untouched() {
        let slots = CountingSlots::new();
        let mut items = DynArray::try_from_elem_in(2, 5_u8, slots.clone()).unwrap();
        let before = items.as_ptr();

        slots.fail_next_allocation();

        assert!(matches!(
            items.try_resize(10, 1),
            Err(Error::AllocationFailed { .. })
        ));
        assert_eq!(items, [5, 5]);
        assert_eq!(items.capacity(), 2);
        assert_eq!(items.as_ptr(), before);
    }

    #[test]
    fn resize_default_failure_leaves_array_untouched() {
        let slots = CountingSlots::new();
        let mut items = DynArray::try_from_elem_in(2, 5_u8, slots.clone()).unwrap();
        let before = items.as_ptr();

        slots.fail_next_allocation();

        assert!(matches!(
            items.try_resize_default(10),
            Err(Error::AllocationFailed { .. })
        ));
        assert_eq!(items, [5, 5]);
        assert_eq!(items.capacity(), 2);
        assert_eq!(items.as_ptr(), before);
        assert_eq!(slots.live_regions(), 1);
    }

    #[test]
    fn push_grows_from_floor_then_doubles() {
        let mut items = DynArray::new();

        items.push(0);
        assert_eq!(items.capacity(), MIN_GROWTH_CAPACITY.get());

        for value in 1..8 {
            items.push(value);
        }
        assert_eq!(items.capacity(), 8);

        items.push(8);
        assert_eq!(items.capacity(), 16);

        for value in 9..17 {
            items.push(value);
        }
        assert_eq!(items.capacity(), 32);
        assert_eq!(items.len(), 17);
        assert!(items.iter().copied().eq(0..17));
    }

    #[test]
    fn push_reallocates_logarithmically() {
        let slots = CountingSlots::new();
        let mut items = DynArray::new_in(slots.clone());

        for value in 0..1000_u32 {
            items.push(value);
        }

        // 8, 16, 32, 64, 128, 256, 512, 1024
        assert_eq!(slots.allocations(), 8);
        assert_eq!(slots.live_regions(), 1);
        assert!(items.iter().copied().eq(0..1000));
    }

    #[test]
    fn push_failure_leaves_array_untouched() {
        let slots = CountingSlots::new();
        let tracker = Tracker::new();
        let mut items = DynArray::new_in(slots.clone());

        for value in 0..8 {
            items.push(tracker.item(value));
        }

        slots.fail_next_allocation();

        assert!(items.try_push(tracker.item(8)).is_err());
        assert_eq!(items.len(), 8);
        assert_eq!(items.capacity(), 8);
        assert_eq!(tracker.live(), 8);
    }

    #[test]
    fn pop_returns_elements_in_reverse() {
        let mut items = DynArray::from([1, 2, 3]);

        assert_eq!(items.pop(), Some(3));
        assert_eq!(items.pop(), Some(2));
        assert_eq!(items.pop(), Some(1));
        assert_eq!(items.pop(), None);
        assert_eq!(items.capacity(), 3);
    }

    #[test]
    fn resize_shrink_keeps_prefix() {
        let tracker = Tracker::new();
        let mut items = DynArray::new();

        for value in 0..6 {
            items.push(tracker.item(value));
        }

        items.resize(2, tracker.item(99));

        assert_eq!(values(&items), [0, 1]);
        assert_eq!(items.capacity(), 8);
        assert_eq!(tracker.live(), 2);
    }

    #[test]
    fn resize_grow_appends_copies() {
        let mut items = DynArray::from([1, 2]);

        items.resize(5, 7);

        assert_eq!(items, [1, 2, 7, 7, 7]);
        assert_eq!(items.capacity(), 5);
    }

    #[test]
    fn resize_to_same_len_changes_nothing() {
        let mut items = DynArray::from([1, 2]);

        items.resize(2, 7);

        assert_eq!(items, [1, 2]);
    }

    #[test]
    fn resize_panicking_clone_keeps_previous_len() {
        let tracker = Tracker::new();
        let mut items = DynArray::new();
        items.push(tracker.item(1));

        let template = tracker.item(2);
        tracker.panic_after_clones(2);

        let result = panic::catch_unwind(AssertUnwindSafe(|| items.resize(10, template)));

        assert!(result.is_err());
        assert_eq!(values(&items), [1]);
        assert_eq!(tracker.live(), 1);
    }

    #[test]
    fn with_len_default_panicking_default_leaks_nothing() {
        let slots = CountingSlots::new();
        let tracker = Tracker::new();
        tracker.provide_defaults();
        tracker.panic_after_defaults(2);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            DynArray::<Tracked, _>::try_with_len_default_in(5, slots.clone())
        }));

        assert!(result.is_err());
        assert_eq!(tracker.live(), 0);
        assert_eq!(slots.allocations(), 1);
        assert_eq!(slots.live_regions(), 0);
    }

    #[test]
    fn resize_default_panicking_default_keeps_previous_len() {
        let slots = CountingSlots::new();
        let tracker = Tracker::new();
        tracker.provide_defaults();

        let mut items = DynArray::new_in(slots.clone());
        items.push(tracker.item(1));

        tracker.panic_after_defaults(2);

        let result = panic::catch_unwind(AssertUnwindSafe(|| items.resize_default(6)));
        tracker.disarm();

        assert!(result.is_err());
        assert_eq!(values(&items), [1]);
        assert_eq!(tracker.live(), 1);

        drop(items);

        assert_eq!(tracker.live(), 0);
        assert_eq!(slots.live_regions(), 0);
    }

    #[test]
    fn resize_default_grows_and_shrinks() {
        let mut items = DynArray::from([3_u8, 4]);

        items.resize_default(4);
        assert_eq!(items, [3, 4, 0, 0]);

        items.resize_default(1);
        assert_eq!(items, [3]);
    }

    #[test]
    fn truncate_drops_tail_only() {
        let tracker = Tracker::new();
        let mut items = DynArray::new();

        for value in 0..5 {
            items.push(tracker.item(value));
        }

        items.truncate(7);
        assert_eq!(items.len(), 5);

        items.truncate(3);
        assert_eq!(values(&items), [0, 1, 2]);
        assert_eq!(tracker.live(), 3);
        assert_eq!(items.capacity(), 8);
    }

    #[test]
    fn clear_keeps_capacity() {
        let tracker = Tracker::new();
        let mut items = DynArray::new();

        for value in 0..5 {
            items.push(tracker.item(value));
        }

        items.clear();

        assert!(items.is_empty());
        assert_eq!(items.capacity(), 8);
        assert_eq!(tracker.live(), 0);
    }

    #[test]
    fn drop_destroys_elements_and_releases_storage() {
        let slots = CountingSlots::new();
        let tracker = Tracker::new();

        {
            let mut items = DynArray::new_in(slots.clone());
            for value in 0..20 {
                items.push(tracker.item(value));
            }
        }

        assert_eq!(tracker.live(), 0);
        assert_eq!(slots.live_regions(), 0);
    }

    #[test]
    fn take_leaves_source_empty() {
        let mut source = DynArray::from_elem(3, 'z');
        source.reserve(10);
        let storage = source.as_ptr();

        let target = source.take();

        assert_eq!(source.len(), 0);
        assert_eq!(source.capacity(), 0);
        assert_eq!(target.len(), 3);
        assert_eq!(target.capacity(), 10);
        assert_eq!(target.as_ptr(), storage);
        assert_eq!(target, ['z', 'z', 'z']);

        // The emptied source remains usable.
        source.push('a');
        assert_eq!(source, ['a']);
    }

    #[test]
    fn move_from_releases_previous_contents() {
        let slots = CountingSlots::new();
        let tracker = Tracker::new();

        let mut target = DynArray::new_in(slots.clone());
        target.push(tracker.item(1));
        target.set_assign_policy(AssignPolicy::AllocateAndSwap);

        let mut source = DynArray::new_in(slots.clone());
        source.push(tracker.item(2));
        source.push(tracker.item(3));

        target.move_from(&mut source);

        assert_eq!(values(&target), [2, 3]);
        assert_eq!(target.assign_policy(), AssignPolicy::AllocateAndSwap);
        assert_eq!(source.len(), 0);
        assert_eq!(source.capacity(), 0);
        assert_eq!(tracker.live(), 2);
        assert_eq!(slots.live_regions(), 1);
    }

    #[test]
    fn ptr_range_covers_live_elements() {
        let mut items = DynArray::from([10, 20, 30]);
        items.reserve(8);

        let range = items.as_mut_ptr_range();
        let mut cursor = range.start;

        while cursor != range.end {
            unsafe {
                *cursor += 1;
                cursor = cursor.add(1);
            }
        }

        assert_eq!(items, [11, 21, 31]);

        let range = items.as_ptr_range();
        assert_eq!(unsafe { range.end.offset_from(range.start) }, 3);
    }

    #[test]
    fn zero_sized_elements_never_allocate() {
        let slots = CountingSlots::new();
        let mut items = DynArray::new_in(slots.clone());

        for _ in 0..100 {
            items.push(());
        }

        assert_eq!(items.len(), 100);
        assert!(items.capacity() >= 100);
        assert_eq!(slots.allocations(), 0);
        assert_eq!(items.pop(), Some(()));
    }

    #[test]
    fn iterates_by_reference() {
        let mut items = DynArray::from([1, 2, 3]);

        for item in &mut items {
            *item *= 10;
        }

        let mut total = 0;
        for item in &items {
            total += item;
        }

        assert_eq!(total, 60);
    }

    #[test]
    fn extend_appends_in_order() {
        let mut items = DynArray::from([1]);

        items.extend([2, 3, 4]);

        assert_eq!(items, [1, 2, 3, 4]);
    }

    #[test]
    fn equality_across_allocators() {
        let left = DynArray::from([1, 2]);
        let right = DynArray::try_from_iter_exact_in([1, 2], CountingSlots::new()).unwrap();

        assert_eq!(left, right);
        assert_ne!(left, DynArray::from([2, 1]));
    }

    #[test]
    fn debug_output_lists_elements() {
        let items = DynArray::from([1, 2]);

        assert_eq!(format!("{items:?}"), "[1, 2]");
    }
}
