/// Determines how a [`DynArray`][crate::DynArray] performs copy assignment, trading speed for
/// the guarantee it gives when an element `Clone` panics partway.
///
/// By default, existing storage is reused whenever it is large enough.
///
/// # Examples
///
/// ```
/// use lease_array::{AssignPolicy, DynArray};
///
/// // The policy is normally chosen at array creation time.
/// let mut target = DynArray::<String>::builder()
///     .assign_policy(AssignPolicy::AllocateAndSwap)
///     .build();
///
/// let source = DynArray::from(["a".to_string(), "b".to_string()]);
/// target.assign_from(&source);
///
/// assert_eq!(target, source);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum AssignPolicy {
    /// Reuses the existing storage if its capacity is sufficient, assigning over the live
    /// elements in place and then constructing or destroying the difference. This is the default.
    ///
    /// If a `Clone` panics partway, the array is left valid but with an unspecified mix of
    /// old and new values (basic guarantee). If the capacity is insufficient, this falls back
    /// to the behavior of [`AllocateAndSwap`][Self::AllocateAndSwap].
    #[default]
    ReuseStorage,

    /// Always builds a complete copy in fresh storage and swaps it in, releasing the old
    /// storage afterwards.
    ///
    /// If a `Clone` panics partway, the array is left exactly as it was (strong guarantee),
    /// at the cost of an allocation on every assignment.
    AllocateAndSwap,
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn default_reuses_storage() {
        assert_eq!(AssignPolicy::default(), AssignPolicy::ReuseStorage);
    }
}
