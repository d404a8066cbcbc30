//! Unique, shared and weak handles over one control block layout.
//!
//! A [`SharedHandle`] owns its value together with every clone of it; the value is
//! destroyed as soon as the last one goes away. A [`WeakHandle`] observes the value
//! without keeping it alive, and a [`UniqueHandle`] is the degenerate single-owner case.
//! Counting comes in two flavours, [`LocalCounts`] for a single thread and
//! [`AtomicCounts`] for handles that cross threads.
//!
//! Two shared handles that hold each other never reach a count of zero and leak. Nothing
//! here detects such cycles; make one side of them a [`WeakHandle`].
#![no_std]
#![allow(unused_unsafe)]
extern crate alloc;
extern crate maybe_std as base;

#[cfg(test)]
extern crate std;

mod block;
mod count;
mod error;
mod shared;
mod unique;
mod weak;

pub use count::{Counts, MAX_REFCOUNT};
pub use error::HandleError;
pub use shared::SharedHandle;
pub use unique::UniqueHandle;
pub use weak::WeakHandle;

#[cfg(feature = "local")]
pub use count::LocalCounts;
#[cfg(feature = "sync")]
pub use count::AtomicCounts;

/// A smart pointer that keeps track of how many pointers refer to the same allocation and
/// exposes this information in its API.
pub trait ReferenceCounted<T>: Clone {
    /// Get the number of owning pointers referring to the same allocation.
    fn reference_count(this: &Self) -> usize;
}

#[cfg(feature = "local")]
pub type LocalUnique<T> = UniqueHandle<T, LocalCounts>;
#[cfg(feature = "local")]
pub type LocalShared<T> = SharedHandle<T, LocalCounts>;
#[cfg(feature = "local")]
pub type LocalWeak<T> = WeakHandle<T, LocalCounts>;

#[cfg(feature = "sync")]
pub type SyncUnique<T> = UniqueHandle<T, AtomicCounts>;
#[cfg(feature = "sync")]
pub type SyncShared<T> = SharedHandle<T, AtomicCounts>;
#[cfg(feature = "sync")]
pub type SyncWeak<T> = WeakHandle<T, AtomicCounts>;

/// Give `value` a sole owner.
pub fn create_unique<T, C: Counts>(value: T) -> UniqueHandle<T, C> {
    UniqueHandle::new(value)
}

/// Give `value` its first shared owner.
pub fn create_shared<T, C: Counts>(value: T) -> SharedHandle<T, C> {
    SharedHandle::new(value)
}
