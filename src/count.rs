//! Reference counting strategies for a control block.
//!
//! Both strategies store the strong count, the weak count and whether the strong owners
//! still hold their weak reference. The strong handles of a block collectively own one
//! extra weak reference, released right after the payload has been destroyed. The raw
//! weak count is therefore never zero while the payload exists, and reaching zero on it is
//! the single point where the block may be freed.
//!
//! The payload is alive exactly while the strong count is non-zero: once it dropped to
//! zero nothing increments it again.

#[cfg(feature = "local")]
use base::cell::Cell;
#[cfg(feature = "sync")]
use base::hint;
#[cfg(feature = "sync")]
use base::sync::atomic::{self, AtomicBool, AtomicUsize, Ordering::{Acquire, Relaxed, Release}};

/// A soft limit on the amount of references that may be made to one control block.
///
/// Going above this limit panics at _exactly_ `MAX_REFCOUNT + 1` references for the local
/// counts, and at some point after that for the atomic ones.
pub const MAX_REFCOUNT: usize = (isize::MAX) as usize;

/// Raw weak count of an atomic block while `is_unique` inspects it.
#[cfg(feature = "sync")]
const WEAK_LOCKED: usize = usize::MAX;

mod sealed {
    pub trait Sealed {}
}

/// Count bookkeeping of a control block.
///
/// # Safety
///
/// Implementors must return `true` from `release_strong` and `release_weak` exactly once
/// per block, and `try_retain_strong` must never succeed once the strong count was zero.
pub unsafe trait Counts: sealed::Sealed {
    /// Counts for a fresh block: one strong owner, no weak handles, alive.
    fn new() -> Self;

    fn strong(&self) -> usize;

    /// The raw weak count, including the reference held by the strong owners.
    fn weak(&self) -> usize;

    /// The number of weak handles, leaving out the reference held by the strong owners.
    fn weak_handles(&self) -> usize;

    /// Whether the payload still exists, read from the strong count.
    #[inline]
    fn is_alive(&self) -> bool {
        self.strong() != 0
    }

    /// Whether the caller's strong reference is the only reference of any kind.
    ///
    /// The caller must hold a strong reference and exclusive access to its handle.
    fn is_unique(&self) -> bool;

    /// Must only be called through a handle that already holds a strong reference.
    fn retain_strong(&self);

    /// Increment the strong count if and only if it is not zero.
    fn try_retain_strong(&self) -> bool;

    /// Returns `true` if this released the last strong reference, in which case the
    /// caller must destroy the payload.
    fn release_strong(&self) -> bool;

    /// Move the strong count from one to zero, provided the caller's reference is the only one.
    fn claim_last_strong(&self) -> bool;

    fn retain_weak(&self);

    /// Returns `true` if this released the last reference of any kind, in which case the
    /// caller must free the block.
    fn release_weak(&self) -> bool;

    /// Release the weak reference held by the strong owners, once the strong count is zero.
    /// Returns `true` if the caller must free the block.
    fn release_owners_weak(&self) -> bool;
}

/// Plain integer counts for handles that stay on one thread.
#[cfg(feature = "local")]
pub struct LocalCounts {
    strong: Cell<usize>,
    weak: Cell<usize>,
    owners_weak: Cell<bool>,
}

#[cfg(feature = "local")]
impl sealed::Sealed for LocalCounts {}

#[cfg(feature = "local")]
unsafe impl Counts for LocalCounts {
    fn new() -> Self {
        LocalCounts {
            strong: Cell::new(1),
            weak: Cell::new(1),
            owners_weak: Cell::new(true),
        }
    }

    #[inline]
    fn strong(&self) -> usize {
        self.strong.get()
    }

    #[inline]
    fn weak(&self) -> usize {
        self.weak.get()
    }

    fn weak_handles(&self) -> usize {
        self.weak.get() - self.owners_weak.get() as usize
    }

    fn is_unique(&self) -> bool {
        self.strong.get() == 1 && self.weak.get() == 1
    }

    #[inline]
    fn retain_strong(&self) {
        let strong = self.strong.get();
        if strong == 0 || strong >= MAX_REFCOUNT {
            panic!("strong reference count overflow");
        }
        self.strong.set(strong + 1);
    }

    #[inline]
    fn try_retain_strong(&self) -> bool {
        if self.strong.get() == 0 {
            return false;
        }
        self.retain_strong();
        true
    }

    #[inline]
    fn release_strong(&self) -> bool {
        let strong = self.strong.get() - 1;
        self.strong.set(strong);
        strong == 0
    }

    fn claim_last_strong(&self) -> bool {
        if self.strong.get() != 1 {
            return false;
        }
        self.strong.set(0);
        true
    }

    #[inline]
    fn retain_weak(&self) {
        let weak = self.weak.get();
        if weak >= MAX_REFCOUNT {
            panic!("weak reference count overflow");
        }
        self.weak.set(weak + 1);
    }

    #[inline]
    fn release_weak(&self) -> bool {
        let weak = self.weak.get() - 1;
        self.weak.set(weak);
        weak == 0
    }

    fn release_owners_weak(&self) -> bool {
        self.owners_weak.set(false);
        self.release_weak()
    }
}

/// Atomic counts for handles shared across threads.
#[cfg(feature = "sync")]
pub struct AtomicCounts {
    strong: AtomicUsize,
    weak: AtomicUsize,
    owners_weak: AtomicBool,
}

#[cfg(feature = "sync")]
impl sealed::Sealed for AtomicCounts {}

#[cfg(feature = "sync")]
unsafe impl Counts for AtomicCounts {
    fn new() -> Self {
        AtomicCounts {
            strong: AtomicUsize::new(1),
            weak: AtomicUsize::new(1),
            owners_weak: AtomicBool::new(true),
        }
    }

    #[inline]
    fn strong(&self) -> usize {
        self.strong.load(Acquire)
    }

    #[inline]
    fn weak(&self) -> usize {
        self.weak.load(Acquire)
    }

    fn weak_handles(&self) -> usize {
        let weak = self.weak.load(Acquire);
        // Only a block without weak handles can be locked.
        if weak == WEAK_LOCKED {
            return 0;
        }
        weak.saturating_sub(self.owners_weak.load(Acquire) as usize)
    }

    fn is_unique(&self) -> bool {
        // Lock the weak count while reading strong, so no weak handle can upgrade and go
        // away in between. Only succeeds if no weak handle exists; new ones can only come
        // from other strong handles, which `retain_weak` makes wait for the unlock.
        if self
            .weak
            .compare_exchange(1, WEAK_LOCKED, Acquire, Relaxed)
            .is_err()
        {
            return false;
        }

        // Acquire pairs with the Release decrements of strong handles that went away.
        let unique = self.strong.load(Acquire) == 1;
        self.weak.store(1, Release);
        unique
    }

    #[inline]
    fn retain_strong(&self) {
        // Relaxed is enough: a new reference can only be formed from an existing one, and
        // handing that one to another thread already synchronizes.
        let old = self.strong.fetch_add(1, Relaxed);

        // Racy saturation; reaching this takes ~isize::MAX leaked handles.
        if old > MAX_REFCOUNT {
            panic!("strong reference count overflow");
        }
    }

    fn try_retain_strong(&self) -> bool {
        let mut current = self.strong.load(Relaxed);

        // Once strong dropped to 0 the payload is gone for good.
        while current > 0 {
            if current > MAX_REFCOUNT {
                panic!("strong reference count overflow");
            }

            // Acquire on success pairs with the Release of the previous owner.
            match self
                .strong
                .compare_exchange_weak(current, current + 1, Acquire, Relaxed)
            {
                Ok(_) => return true,
                Err(new) => current = new,
            }
        }

        false
    }

    #[inline]
    fn release_strong(&self) -> bool {
        // Release so that all uses of the payload happen before the decrement.
        if self.strong.fetch_sub(1, Release) != 1 {
            return false;
        }

        // Pairs with the Release decrements of every other owner, so their uses of the
        // payload happen before its destruction.
        atomic::fence(Acquire);
        true
    }

    fn claim_last_strong(&self) -> bool {
        if self.strong.compare_exchange(1, 0, Relaxed, Relaxed).is_err() {
            return false;
        }

        atomic::fence(Acquire);
        true
    }

    fn retain_weak(&self) {
        let mut current = self.weak.load(Relaxed);
        loop {
            if current == WEAK_LOCKED {
                hint::spin_loop();
                current = self.weak.load(Relaxed);
                continue;
            }

            if current > MAX_REFCOUNT {
                panic!("weak reference count overflow");
            }

            // Acquire pairs with the Release unlock in `is_unique`.
            match self
                .weak
                .compare_exchange_weak(current, current + 1, Acquire, Relaxed)
            {
                Ok(_) => return,
                Err(new) => current = new,
            }
        }
    }

    #[inline]
    fn release_weak(&self) -> bool {
        if self.weak.fetch_sub(1, Release) != 1 {
            return false;
        }

        atomic::fence(Acquire);
        true
    }

    fn release_owners_weak(&self) -> bool {
        // Cleared before the decrement: afterwards the block may already be freed by the
        // last weak handle.
        self.owners_weak.store(false, Release);
        self.release_weak()
    }
}
