use alloc::boxed::Box;
use base::cell::UnsafeCell;
use base::mem::ManuallyDrop;
use base::ptr::NonNull;

use log::trace;

use crate::count::Counts;
use crate::shared::SharedHandle;

/// The allocation behind every handle: the payload next to its counts.
///
/// Blocks are only ever reached through a `NonNull` owned by a handle. The release
/// functions take that pointer rather than `&self`, since they may free the block.
pub(crate) struct ControlBlock<T, C> {
    counts: C,
    payload: UnsafeCell<ManuallyDrop<T>>,
}

impl<T, C: Counts> ControlBlock<T, C> {
    /// Allocates a block holding `value`, with one strong owner and no weak handles.
    pub(crate) fn create(value: T) -> NonNull<Self> {
        let block = Box::new(ControlBlock {
            counts: C::new(),
            payload: UnsafeCell::new(ManuallyDrop::new(value)),
        });
        Box::leak(block).into()
    }

    #[inline]
    pub(crate) fn counts(&self) -> &C {
        &self.counts
    }

    /// Number of weak handles, not counting the reference shared by the strong owners.
    #[inline]
    pub(crate) fn weak_handles(&self) -> usize {
        self.counts.weak_handles()
    }

    // Safety: the payload must not have been destroyed.
    #[inline]
    pub(crate) unsafe fn payload(&self) -> &T {
        unsafe { &*self.payload.get() }
    }

    // Safety: the caller must be the only one able to reach the payload.
    #[inline]
    pub(crate) unsafe fn payload_mut(&self) -> &mut T {
        unsafe { &mut *self.payload.get() }
    }

    // Safety: `this` must come from a handle holding a strong reference.
    #[inline]
    pub(crate) unsafe fn retain_strong(this: NonNull<Self>) {
        unsafe { this.as_ref() }.counts.retain_strong();
    }

    /// Drops one strong reference, destroying the payload if it was the last one.
    ///
    /// Safety: the caller gives up a strong reference it held on `this`.
    pub(crate) unsafe fn release_strong(this: NonNull<Self>) {
        if !unsafe { this.as_ref() }.counts.release_strong() {
            return;
        }

        unsafe {
            Self::destroy_payload(this);
            Self::release_owners_weak(this);
        }
    }

    // Safety: `this` must come from a handle holding a strong or weak reference.
    #[inline]
    pub(crate) unsafe fn retain_weak(this: NonNull<Self>) {
        unsafe { this.as_ref() }.counts.retain_weak();
    }

    /// Drops one weak reference, freeing the block if nothing references it anymore.
    ///
    /// Safety: the caller gives up a weak reference it held on `this`.
    pub(crate) unsafe fn release_weak(this: NonNull<Self>) {
        if unsafe { this.as_ref() }.counts.release_weak() {
            unsafe { Self::reclaim(this) };
        }
    }

    // Safety: the strong count must have reached zero and the payload be gone.
    unsafe fn release_owners_weak(this: NonNull<Self>) {
        if unsafe { this.as_ref() }.counts.release_owners_weak() {
            unsafe { Self::reclaim(this) };
        }
    }

    /// Increment-if-nonzero on the strong count, handing out a new strong handle on success.
    ///
    /// Safety: the caller must hold a weak or strong reference on `this`.
    pub(crate) unsafe fn try_upgrade(this: NonNull<Self>) -> Option<SharedHandle<T, C>> {
        if unsafe { this.as_ref() }.counts.try_retain_strong() {
            Some(unsafe { SharedHandle::from_block(this) })
        } else {
            trace!("upgrade refused, payload at {:p} already destroyed", this);
            None
        }
    }

    /// Moves the payload out of a block whose last strong reference was just claimed.
    ///
    /// Safety: the strong count must have been moved to zero by the caller, who also
    /// hands over the reference the strong owners held on the block.
    pub(crate) unsafe fn take_payload(this: NonNull<Self>) -> T {
        let value = unsafe { ManuallyDrop::take(&mut *(*this.as_ptr()).payload.get()) };
        unsafe { Self::release_owners_weak(this) };
        value
    }

    /// Destroys the payload in place, leaving the block allocated.
    ///
    /// Safety: must be called exactly once, when no live reference to the payload remains.
    pub(crate) unsafe fn destroy_payload(this: NonNull<Self>) {
        trace!("destroying payload at {:p}", this);
        // The raw weak count is still held above zero here, so nothing the payload's
        // destructor drops can free the block under us.
        unsafe { ManuallyDrop::drop(&mut *(*this.as_ptr()).payload.get()) };
    }

    /// Frees the block without touching the payload.
    ///
    /// Safety: the payload must already be destroyed or moved out, and no handle may
    /// reference the block anymore.
    pub(crate) unsafe fn reclaim(this: NonNull<Self>) {
        trace!("reclaiming control block at {:p}", this);
        drop(unsafe { Box::from_raw(this.as_ptr()) });
    }
}
