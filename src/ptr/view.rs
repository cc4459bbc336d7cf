//! Observing handle

use super::block::RefBlock;
use super::managed::Pointee;
use super::strong::Ptr;
use crate::obj::ObjIdentity;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// Weak reference: keeps the block allocated but never the payload.
///
/// Used for back references (a child pointing at its parent) so the
/// pair does not form an owning cycle. [`lock`](Self::lock) upgrades
/// to a [`Ptr`] while the payload is alive.
pub struct PtrView<T: ?Sized + Pointee> {
    block: Option<NonNull<RefBlock>>,
    _marker: PhantomData<*const T>,
}

impl<T: ?Sized + Pointee> PtrView<T> {
    pub fn new(ptr: &Ptr<T>) -> Self {
        Self::from_raw(ptr.raw_block())
    }

    pub fn empty() -> Self {
        Self {
            block: None,
            _marker: PhantomData,
        }
    }

    /// Observe a block directly, taking a handle count
    pub(crate) fn from_raw(block: Option<NonNull<RefBlock>>) -> Self {
        if let Some(raw) = block {
            unsafe { raw.as_ref() }.retain_handle();
        }
        Self {
            block,
            _marker: PhantomData,
        }
    }

    #[inline]
    fn block(&self) -> Option<&RefBlock> {
        self.block.map(|b| unsafe { &*b.as_ptr() })
    }

    /// Block whose payload has not been destroyed (it may still be pending)
    #[inline]
    pub(crate) fn live_block(&self) -> Option<&RefBlock> {
        self.block().filter(|b| b.strong() > 0)
    }

    /// Strong handle to the payload, or an empty one once it is gone
    pub fn lock(&self) -> Ptr<T> {
        match self.block() {
            Some(block) if block.strong() > 0 => {
                block.retain();
                Ptr::adopt(NonNull::from(block))
            }
            _ => Ptr::null(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.block().map_or(false, |b| b.strong() > 0 && b.is_constructed())
    }

    /// Identity of the observed object, even after it died
    pub fn identity(&self) -> ObjIdentity {
        self.block().map_or_else(ObjIdentity::default, RefBlock::identity)
    }

    pub fn reset(&mut self) {
        *self = Self::empty();
    }

    /// Observe `target` if its payload is a `T`
    pub(crate) fn bind(&mut self, target: &Ptr<dyn crate::ptr::Managed>) -> bool {
        let typed = target.cast::<T>();
        if typed.is_null() {
            return false;
        }
        *self = Self::new(&typed);
        true
    }

    pub fn points_to<U: ?Sized + Pointee>(&self, ptr: &Ptr<U>) -> bool {
        match (self.block, ptr.raw_block()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl<T: ?Sized + Pointee> From<&Ptr<T>> for PtrView<T> {
    fn from(ptr: &Ptr<T>) -> Self {
        Self::new(ptr)
    }
}

impl<T: ?Sized + Pointee> Clone for PtrView<T> {
    fn clone(&self) -> Self {
        if let Some(block) = self.block() {
            block.retain_handle();
        }
        Self {
            block: self.block,
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized + Pointee> Drop for PtrView<T> {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            unsafe { RefBlock::release_handle(block) };
        }
    }
}

impl<T: ?Sized + Pointee> Default for PtrView<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized + Pointee> fmt::Debug for PtrView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PtrView")
            .field("id", &self.identity().id)
            .field("alive", &self.is_alive())
            .finish()
    }
}
