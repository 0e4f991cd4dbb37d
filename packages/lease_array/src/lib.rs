#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A growable contiguous array whose storage is an explicitly owned memory lease obtained from a
//! pluggable slot allocator.
//!
//! This crate provides [`DynArray`], a `Vec`-like sequence that separates two concerns which a
//! typical growable array keeps intertwined:
//!
//! * **Raw storage** is a [`MemoryLease`]: exclusive, move-only ownership of one contiguous region
//!   of uninitialized slots, obtained from a [`SlotAllocator`] and released back to it exactly once.
//! * **Element lifetime** is managed by the array itself: it constructs values in the leading
//!   slots of its lease, tracks how many are live and destroys them before the lease is released.
//!
//! # Key Features
//!
//! - **Pluggable allocation**: Storage comes from any [`SlotAllocator`], with [`SystemSlots`]
//!   (the global heap) as the default
//! - **Amortized growth**: Pushing into a full array doubles its capacity, starting at 8 slots
//! - **Fallible storage**: Every operation that may allocate has a `try_` variant returning
//!   [`Error`] and leaving the array untouched on failure
//! - **Panic safety**: A panicking element `Clone` or `Default` never leaks, never double-drops and
//!   never exposes uninitialized slots
//! - **Selectable copy-assignment guarantee**: [`AssignPolicy`] chooses between reusing storage
//!   (basic guarantee) and building a fresh copy to swap in (strong guarantee)
//!
//! # Examples
//!
//! ```
//! use lease_array::{DynArray, dyn_array};
//!
//! let mut words = dyn_array!["ab", "ac", "ad"];
//! words.push("ae");
//!
//! let mut seen = String::new();
//! for word in &words {
//!     seen.push_str(word);
//! }
//! assert_eq!(seen, "abacadae");
//!
//! // Copies are independent of the original.
//! let copy = words.clone();
//! words.clear();
//! assert_eq!(copy.len(), 4);
//! assert!(words.is_empty());
//!
//! // Moving out leaves an empty array behind.
//! let mut source = DynArray::from([1, 2, 3]);
//! let moved = source.take();
//! assert_eq!(moved, [1, 2, 3]);
//! assert!(source.is_empty());
//! assert_eq!(source.capacity(), 0);
//! ```
//!
//! ## Custom allocators
//!
//! ```
//! use std::alloc::Layout;
//! use std::ptr::NonNull;
//!
//! use lease_array::{DynArray, Result, SlotAllocator, SystemSlots};
//!
//! /// Forwards to the global heap. A real implementation might draw from an arena.
//! #[derive(Clone)]
//! struct Forwarding;
//!
//! // SAFETY: We forward to SystemSlots, which upholds the trait contract.
//! unsafe impl SlotAllocator for Forwarding {
//!     fn allocate(&self, layout: Layout) -> Result<NonNull<u8>> {
//!         SystemSlots.allocate(layout)
//!     }
//!
//!     unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
//!         // SAFETY: Forwarding the caller's guarantees unchanged.
//!         unsafe { SystemSlots.deallocate(ptr, layout) }
//!     }
//! }
//!
//! let mut items = DynArray::new_in(Forwarding);
//! items.push(42);
//! assert_eq!(items, [42]);
//! ```

mod allocator;
mod array;
mod assign;
mod assign_policy;
mod builder;
mod error;
mod into_iter;
mod lease;
mod macros;
mod slots;

#[cfg(test)]
mod testing;

pub use allocator::*;
pub use array::DynArray;
pub use assign_policy::*;
pub use builder::*;
pub use error::{Error, Result};
pub(crate) use error::unwrap_storage;
pub use into_iter::IntoIter;
pub use lease::MemoryLease;
