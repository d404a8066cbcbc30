use base::cmp::Ordering;
use base::fmt;
use base::hash::{Hash, Hasher};
use base::marker::PhantomData;
use base::ptr::{self, NonNull};

use log::{debug, warn};

use crate::block::ControlBlock;
use crate::count::Counts;
use crate::error::HandleError;
use crate::unique::UniqueHandle;
use crate::weak::WeakHandle;
use crate::ReferenceCounted;

/// An owning, reference-counted pointer.
///
/// Cloning creates another handle to the same allocation and increases the strong count.
/// The value is destroyed as soon as the last non-empty `SharedHandle` is dropped or reset.
/// A handle may also be empty, like a null shared pointer.
pub struct SharedHandle<T, C: Counts> {
    block: Option<NonNull<ControlBlock<T, C>>>,
    phantom: PhantomData<ControlBlock<T, C>>,
}

#[cfg(feature = "sync")]
unsafe impl<T: Send + Sync> Send for SharedHandle<T, crate::AtomicCounts> {}
#[cfg(feature = "sync")]
unsafe impl<T: Send + Sync> Sync for SharedHandle<T, crate::AtomicCounts> {}

impl<T, C: Counts> SharedHandle<T, C> {
    /// Moves `value` into a new control block with a strong count of one.
    pub fn new(value: T) -> Self {
        unsafe { Self::from_block(ControlBlock::create(value)) }
    }

    /// A handle that owns nothing.
    pub const fn empty() -> Self {
        SharedHandle {
            block: None,
            phantom: PhantomData,
        }
    }

    // Safety: the caller transfers one strong reference on `block` to the new handle.
    pub(crate) unsafe fn from_block(block: NonNull<ControlBlock<T, C>>) -> Self {
        SharedHandle {
            block: Some(block),
            phantom: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn block(&self) -> Option<NonNull<ControlBlock<T, C>>> {
        self.block
    }

    #[inline]
    fn inner(&self) -> Option<&ControlBlock<T, C>> {
        // While this handle is non-empty it holds a strong reference, which keeps the
        // block allocated.
        self.block.map(|block| unsafe { &*block.as_ptr() })
    }

    pub fn is_empty(&self) -> bool {
        self.block.is_none()
    }

    /// The current strong count, or zero for an empty handle.
    ///
    /// Other threads may change the count right after it was read.
    pub fn count(this: &Self) -> usize {
        this.inner().map_or(0, |inner| inner.counts().strong())
    }

    /// The number of weak handles to this allocation.
    pub fn weak_count(this: &Self) -> usize {
        this.inner().map_or(0, |inner| inner.weak_handles())
    }

    /// Borrow the value.
    pub fn get(&self) -> Result<&T, HandleError> {
        let inner = match self.inner() {
            Some(inner) => inner,
            None => {
                debug!("access through an empty shared handle");
                return Err(HandleError::EmptyHandle);
            }
        };

        if !inner.counts().is_alive() {
            warn!("access through a shared handle whose value was already destroyed");
            return Err(HandleError::DanglingAccess);
        }

        Ok(unsafe { inner.payload() })
    }

    /// Release this handle's strong reference now. The handle is empty afterwards.
    pub fn reset(&mut self) {
        if let Some(block) = self.block.take() {
            unsafe { ControlBlock::release_strong(block) };
        }
    }

    /// Create a weak handle to this allocation.
    pub fn downgrade(this: &Self) -> WeakHandle<T, C> {
        WeakHandle::from_shared(this)
    }

    /// Whether both handles point at the same allocation. Two empty handles are equal.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.block == other.block
    }

    /// Mutable access to the value, if no other strong or weak handle points at it.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if !self.is_unique() {
            return None;
        }

        let inner = self.inner()?;
        // This handle is the only one left, and `&mut self` stops it from being cloned.
        Some(unsafe { inner.payload_mut() })
    }

    fn is_unique(&self) -> bool {
        self.inner().map_or(false, |inner| inner.counts().is_unique())
    }

    /// Take the value out, if this is its last strong handle.
    ///
    /// Weak handles to the value become expired. Otherwise the handle is handed back.
    pub fn try_unwrap(this: Self) -> Result<T, Self> {
        let block = match this.block {
            Some(block) => block,
            None => return Err(this),
        };

        if !unsafe { block.as_ref() }.counts().claim_last_strong() {
            return Err(this);
        }

        let mut this = this;
        this.block = None;
        Ok(unsafe { ControlBlock::take_payload(block) })
    }

    /// Turn this handle into a unique one, if no other strong or weak handle points at the
    /// value. The allocation is kept.
    pub fn try_into_unique(this: Self) -> Result<UniqueHandle<T, C>, Self> {
        if !this.is_unique() {
            return Err(this);
        }

        let mut this = this;
        match this.block.take() {
            Some(block) => Ok(unsafe { UniqueHandle::from_block(block) }),
            None => Err(this),
        }
    }
}

impl<T, C: Counts> Clone for SharedHandle<T, C> {
    /// Makes a clone of the handle.
    ///
    /// This creates another pointer to the same allocation, increasing the strong count.
    /// Cloning an empty handle gives another empty handle.
    #[inline]
    fn clone(&self) -> Self {
        match self.block {
            Some(block) => unsafe {
                ControlBlock::retain_strong(block);
                Self::from_block(block)
            },
            None => Self::empty(),
        }
    }
}

impl<T, C: Counts> Drop for SharedHandle<T, C> {
    /// Drops the handle, destroying the value if this was its last strong handle.
    ///
    /// ```
    /// use counted_handles::LocalShared;
    ///
    /// struct Foo;
    ///
    /// impl Drop for Foo {
    ///     fn drop(&mut self) {
    ///         println!("dropped!");
    ///     }
    /// }
    ///
    /// let foo = LocalShared::new(Foo);
    /// let foo2 = foo.clone();
    ///
    /// drop(foo);    // Doesn't print anything
    /// drop(foo2);   // Prints "dropped!"
    /// ```
    #[inline]
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T, C: Counts> ReferenceCounted<T> for SharedHandle<T, C> {
    fn reference_count(this: &Self) -> usize {
        SharedHandle::count(this)
    }
}

impl<T, C: Counts> Default for SharedHandle<T, C> {
    /// An empty handle.
    fn default() -> Self {
        Self::empty()
    }
}

impl<T, C: Counts> From<T> for SharedHandle<T, C> {
    fn from(value: T) -> Self {
        SharedHandle::new(value)
    }
}

impl<T: fmt::Display, C: Counts> fmt::Display for SharedHandle<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Ok(value) => fmt::Display::fmt(value, f),
            Err(err) => write!(f, "<{}>", err),
        }
    }
}

impl<T: fmt::Debug, C: Counts> fmt::Debug for SharedHandle<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Ok(value) => fmt::Debug::fmt(value, f),
            Err(_) => f.write_str("(Empty)"),
        }
    }
}

impl<T, C: Counts> fmt::Pointer for SharedHandle<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ptr = self.block.map_or(ptr::null(), |block| block.as_ptr() as *const ());
        fmt::Pointer::fmt(&ptr, f)
    }
}

impl<T: PartialEq, C: Counts> PartialEq for SharedHandle<T, C> {
    /// Equality for two handles.
    ///
    /// Two handles are equal if their values are equal, even if they are stored in
    /// different allocations. Empty handles only equal each other.
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.get().ok() == other.get().ok()
    }
}

impl<T: Eq, C: Counts> Eq for SharedHandle<T, C> {}

impl<T: PartialOrd, C: Counts> PartialOrd for SharedHandle<T, C> {
    /// Compares the values; an empty handle sorts before any value.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.get().ok().partial_cmp(&other.get().ok())
    }
}

impl<T: Ord, C: Counts> Ord for SharedHandle<T, C> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.get().ok().cmp(&other.get().ok())
    }
}

impl<T: Hash, C: Counts> Hash for SharedHandle<T, C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.get().ok().hash(state)
    }
}

impl<T, C: Counts> Unpin for SharedHandle<T, C> {}
