use base::cmp::Ordering;
use base::fmt;
use base::hash::{Hash, Hasher};
use base::marker::PhantomData;
use base::ptr::{self, NonNull};

use log::debug;

use crate::block::ControlBlock;
use crate::count::Counts;
use crate::error::HandleError;
use crate::shared::SharedHandle;

/// The sole owner of a value.
///
/// A `UniqueHandle` uses the same allocation as the shared handles but never reads or
/// writes its counts. It cannot be cloned; `transfer` moves the value to a new handle and
/// leaves the old one empty.
pub struct UniqueHandle<T, C: Counts> {
    block: Option<NonNull<ControlBlock<T, C>>>,
    phantom: PhantomData<ControlBlock<T, C>>,
}

unsafe impl<T: Send, C: Counts> Send for UniqueHandle<T, C> {}
unsafe impl<T: Sync, C: Counts> Sync for UniqueHandle<T, C> {}

impl<T, C: Counts> UniqueHandle<T, C> {
    pub fn new(value: T) -> Self {
        unsafe { Self::from_block(ControlBlock::create(value)) }
    }

    pub const fn empty() -> Self {
        UniqueHandle {
            block: None,
            phantom: PhantomData,
        }
    }

    // Safety: `block` must have fresh counts and no other handle may reference it.
    pub(crate) unsafe fn from_block(block: NonNull<ControlBlock<T, C>>) -> Self {
        UniqueHandle {
            block: Some(block),
            phantom: PhantomData,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.block.is_none()
    }

    /// Move the value into a new handle. `self` is empty afterwards.
    pub fn transfer(&mut self) -> Self {
        UniqueHandle {
            block: self.block.take(),
            phantom: PhantomData,
        }
    }

    fn block(&self) -> Result<NonNull<ControlBlock<T, C>>, HandleError> {
        self.block.ok_or_else(|| {
            debug!("access through an empty unique handle");
            HandleError::EmptyHandle
        })
    }

    pub fn get(&self) -> Result<&T, HandleError> {
        let block = self.block()?;
        Ok(unsafe { block.as_ref().payload() })
    }

    pub fn get_mut(&mut self) -> Result<&mut T, HandleError> {
        let block = self.block()?;
        // We know this to be uniquely owned
        Ok(unsafe { block.as_ref().payload_mut() })
    }

    /// Take the value out and free the allocation.
    pub fn into_inner(self) -> Result<T, HandleError> {
        let mut this = self;
        let block = this.block.take().ok_or(HandleError::EmptyHandle)?;

        unsafe {
            let value = ptr::read(block.as_ref().payload());
            ControlBlock::reclaim(block);
            Ok(value)
        }
    }

    /// Share the value. The allocation is kept; an empty handle becomes an empty shared one.
    pub fn into_shared(self) -> SharedHandle<T, C> {
        let mut this = self;
        match this.block.take() {
            // The counts were never touched and still read one strong owner.
            Some(block) => unsafe { SharedHandle::from_block(block) },
            None => SharedHandle::empty(),
        }
    }
}

impl<T, C: Counts> Drop for UniqueHandle<T, C> {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            unsafe {
                ControlBlock::destroy_payload(block);
                ControlBlock::reclaim(block);
            }
        }
    }
}

impl<T, C: Counts> Default for UniqueHandle<T, C> {
    /// An empty handle.
    fn default() -> Self {
        Self::empty()
    }
}

impl<T, C: Counts> From<T> for UniqueHandle<T, C> {
    fn from(value: T) -> Self {
        UniqueHandle::new(value)
    }
}

impl<T, C: Counts> From<UniqueHandle<T, C>> for SharedHandle<T, C> {
    fn from(unique: UniqueHandle<T, C>) -> Self {
        unique.into_shared()
    }
}

impl<T: fmt::Display, C: Counts> fmt::Display for UniqueHandle<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Ok(value) => fmt::Display::fmt(value, f),
            Err(err) => write!(f, "<{}>", err),
        }
    }
}

impl<T: fmt::Debug, C: Counts> fmt::Debug for UniqueHandle<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Ok(value) => fmt::Debug::fmt(value, f),
            Err(_) => f.write_str("(Empty)"),
        }
    }
}

impl<T, C: Counts> fmt::Pointer for UniqueHandle<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ptr = self.block.map_or(ptr::null(), |block| block.as_ptr() as *const ());
        fmt::Pointer::fmt(&ptr, f)
    }
}

impl<T: PartialEq, C: Counts> PartialEq for UniqueHandle<T, C> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.get().ok() == other.get().ok()
    }
}

impl<T: Eq, C: Counts> Eq for UniqueHandle<T, C> {}

impl<T: PartialOrd, C: Counts> PartialOrd for UniqueHandle<T, C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.get().ok().partial_cmp(&other.get().ok())
    }
}

impl<T: Ord, C: Counts> Ord for UniqueHandle<T, C> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.get().ok().cmp(&other.get().ok())
    }
}

impl<T: Hash, C: Counts> Hash for UniqueHandle<T, C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.get().ok().hash(state)
    }
}

impl<T, C: Counts> Unpin for UniqueHandle<T, C> {}
