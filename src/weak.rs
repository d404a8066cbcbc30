use base::fmt;
use base::marker::PhantomData;
use base::ptr::NonNull;

use crate::block::ControlBlock;
use crate::count::Counts;
use crate::shared::SharedHandle;

/// A non-owning observer of a value held by shared handles.
///
/// A weak handle never keeps the value alive and never hands it out directly; `upgrade`
/// is the only way to reach it. Holding a weak handle keeps only the control block
/// allocated, which is what makes weak handles usable as back-references that break
/// ownership cycles.
pub struct WeakHandle<T, C: Counts> {
    block: Option<NonNull<ControlBlock<T, C>>>,
    phantom: PhantomData<ControlBlock<T, C>>,
}

#[cfg(feature = "sync")]
unsafe impl<T: Send + Sync> Send for WeakHandle<T, crate::AtomicCounts> {}
#[cfg(feature = "sync")]
unsafe impl<T: Send + Sync> Sync for WeakHandle<T, crate::AtomicCounts> {}

impl<T, C: Counts> WeakHandle<T, C> {
    /// A weak handle without an allocation. It never upgrades.
    pub const fn new() -> Self {
        WeakHandle {
            block: None,
            phantom: PhantomData,
        }
    }

    /// Observe the value behind `shared`. An empty shared handle gives an empty weak one.
    pub fn from_shared(shared: &SharedHandle<T, C>) -> Self {
        let block = shared.block();
        if let Some(block) = block {
            unsafe { ControlBlock::retain_weak(block) };
        }

        WeakHandle {
            block,
            phantom: PhantomData,
        }
    }

    #[inline]
    fn inner(&self) -> Option<&ControlBlock<T, C>> {
        // The weak reference keeps the block allocated even after the value is gone.
        self.block.map(|block| unsafe { &*block.as_ptr() })
    }

    /// Obtain a strong handle, or `None` if the value has already been destroyed.
    pub fn upgrade(&self) -> Option<SharedHandle<T, C>> {
        let block = self.block?;
        unsafe { ControlBlock::try_upgrade(block) }
    }

    /// Whether the value is gone. Another thread may release the value right after this
    /// returned `false`.
    pub fn expired(&self) -> bool {
        self.inner().map_or(true, |inner| !inner.counts().is_alive())
    }

    /// The number of strong handles, zero once the value is gone.
    pub fn strong_count(&self) -> usize {
        self.inner().map_or(0, |inner| inner.counts().strong())
    }

    /// The number of weak handles to the allocation, this one included.
    pub fn weak_count(&self) -> usize {
        self.inner().map_or(0, |inner| inner.weak_handles())
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.block == other.block
    }
}

impl<T, C: Counts> Clone for WeakHandle<T, C> {
    fn clone(&self) -> Self {
        if let Some(block) = self.block {
            unsafe { ControlBlock::retain_weak(block) };
        }

        WeakHandle {
            block: self.block,
            phantom: PhantomData,
        }
    }
}

impl<T, C: Counts> Drop for WeakHandle<T, C> {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            unsafe { ControlBlock::release_weak(block) };
        }
    }
}

impl<T, C: Counts> Default for WeakHandle<T, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, C: Counts> fmt::Debug for WeakHandle<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(Weak)")
    }
}

impl<T, C: Counts> Unpin for WeakHandle<T, C> {}
