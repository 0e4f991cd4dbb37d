use std::alloc::Layout;

use thiserror::Error;

/// Errors that can occur when acquiring storage for a [`DynArray`][crate::DynArray].
///
/// Element operations (`Clone`, `Default`) that fail do so by panicking. The array guarantees
/// that such panics never leak memory or leave it with uninitialized slots marked as live.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The requested number of slots cannot be represented, either because the slot count
    /// itself overflows `usize` or because the total byte size exceeds `isize::MAX`.
    #[error("capacity overflow: {requested} slots cannot be represented in memory")]
    CapacityOverflow {
        /// The number of slots that was requested. Saturates at `usize::MAX` if the
        /// count itself overflowed.
        requested: usize,
    },

    /// The slot allocator was unable to satisfy the request.
    #[error(
        "slot allocator failed to allocate {} bytes with alignment {}",
        .layout.size(),
        .layout.align()
    )]
    AllocationFailed {
        /// The memory layout of the region that could not be allocated.
        layout: Layout,
    },
}

/// A specialized `Result` type for storage operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

/// Unwraps the result of a storage operation, panicking with the error message if it failed.
///
/// This backs the panicking convenience methods, which treat running out of memory the same way
/// the standard collections do.
#[track_caller]
pub(crate) fn unwrap_storage<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("{e}"),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn allocation_failed_mentions_layout() {
        let error = Error::AllocationFailed {
            layout: Layout::new::<u64>(),
        };

        let message = error.to_string();
        assert!(message.contains("8 bytes"));
        assert!(message.contains("alignment 8"));
    }

    #[test]
    fn capacity_overflow_mentions_request() {
        let error = Error::CapacityOverflow { requested: 42 };

        assert_eq!(
            error.to_string(),
            "capacity overflow: 42 slots cannot be represented in memory"
        );
    }

    #[test]
    fn unwrap_storage_passes_value_through() {
        assert_eq!(unwrap_storage(Ok(5)), 5);
    }

    #[test]
    #[should_panic]
    fn unwrap_storage_panics_on_error() {
        unwrap_storage::<()>(Err(Error::CapacityOverflow { requested: 1 }));
    }
}
