//! Owning handle

use super::block::RefBlock;
use super::managed::{Managed, Pointee};
use super::release;
use super::view::PtrView;
use crate::obj::{ObjFlags, ObjId, ObjIdentity};
use crate::visit::{walker, Edge, VisitPolicy};
use std::cell::{Ref, RefMut};
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;

/// Strong reference to a managed payload.
///
/// Cloning shares the block; dropping the last strong handle destroys
/// the payload. Dropping a handle while other strong handles remain
/// runs the cycle analysis in [`release`](super::release): if every
/// other strong reference lives inside the subgraph reachable from
/// the payload, the whole subgraph is released at once.
///
/// An empty handle still carries an identity, which is how unloaded
/// persistent references are represented.
pub struct Ptr<T: ?Sized + Pointee> {
    block: Option<NonNull<RefBlock>>,
    identity: ObjIdentity,
    _marker: PhantomData<*const T>,
}

impl<T: Managed> Ptr<T> {
    /// Wrap a value in a fresh block
    pub fn new(value: T) -> Self {
        Self::from_block(RefBlock::allocate(Some(Box::new(value)), ObjIdentity::default()))
    }
}

impl Ptr<dyn Managed> {
    pub(crate) fn from_box(payload: Box<dyn Managed>, identity: ObjIdentity) -> Self {
        Self::from_block(RefBlock::allocate(Some(payload), identity))
    }

    /// Block without a payload yet; see [`Ptr::place`]
    pub(crate) fn pending(identity: ObjIdentity) -> Self {
        Self::from_block(RefBlock::allocate(None, identity))
    }

    pub(crate) fn place(&self, payload: Box<dyn Managed>) {
        if let Some(block) = self.block() {
            block.place(payload);
        }
    }
}

impl<T: ?Sized + Pointee> Ptr<T> {
    /// Empty handle with the default (invalid, unloaded) identity
    pub fn null() -> Self {
        Self::with_identity(ObjIdentity::default())
    }

    /// Identity-only handle for an object that is not loaded
    pub fn unloaded(id: ObjId) -> Self {
        Self::with_identity(ObjIdentity::new(id, ObjFlags::UNLOADED))
    }

    pub fn with_identity(identity: ObjIdentity) -> Self {
        Self {
            block: None,
            identity,
            _marker: PhantomData,
        }
    }

    fn from_block(block: NonNull<RefBlock>) -> Self {
        Self {
            block: Some(block),
            identity: ObjIdentity::default(),
            _marker: PhantomData,
        }
    }

    /// Adopt a block whose strong and handle counts were already taken
    pub(crate) fn adopt(block: NonNull<RefBlock>) -> Self {
        Self::from_block(block)
    }

    #[inline]
    pub(crate) fn block(&self) -> Option<&RefBlock> {
        // The handle count owned by self keeps the block allocated
        self.block.map(|b| unsafe { &*b.as_ptr() })
    }

    #[inline]
    pub(crate) fn raw_block(&self) -> Option<NonNull<RefBlock>> {
        self.block
    }

    /// Block with a nonzero strong count
    #[inline]
    pub(crate) fn live_block(&self) -> Option<&RefBlock> {
        self.block().filter(|b| b.strong() > 0)
    }

    /// No block at all
    #[inline]
    pub fn is_null(&self) -> bool {
        self.block.is_none()
    }

    /// Points at a constructed payload that has not been destroyed
    pub fn is_alive(&self) -> bool {
        self.live_block().map_or(false, RefBlock::is_constructed)
    }

    /// Shared access to the payload, `None` when empty, dead,
    /// mutably borrowed, or of another type
    pub fn try_borrow(&self) -> Option<Ref<'_, T>> {
        let block = self.live_block()?;
        let slot = block.slot.try_borrow().ok()?;
        Ref::filter_map(slot, |slot| slot.as_deref().and_then(T::cast_ref)).ok()
    }

    pub fn try_borrow_mut(&self) -> Option<RefMut<'_, T>> {
        let block = self.live_block()?;
        let slot = block.slot.try_borrow_mut().ok()?;
        RefMut::filter_map(slot, |slot| slot.as_deref_mut().and_then(T::cast_mut)).ok()
    }

    /// # Panics
    ///
    /// When [`try_borrow`](Self::try_borrow) would return `None`.
    pub fn borrow(&self) -> Ref<'_, T> {
        match self.try_borrow() {
            Some(payload) => payload,
            None => panic!("{}", self.access_failure()),
        }
    }

    /// # Panics
    ///
    /// When [`try_borrow_mut`](Self::try_borrow_mut) would return `None`.
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        match self.try_borrow_mut() {
            Some(payload) => payload,
            None => panic!("{}", self.access_failure()),
        }
    }

    fn access_failure(&self) -> String {
        match self.block() {
            None => format!("empty Ptr<{}> dereferenced", std::any::type_name::<T>()),
            Some(b) if b.strong() == 0 => format!("destroyed {} dereferenced", b.type_name()),
            Some(b) => format!(
                "{} is already borrowed or is not a {}",
                b.type_name(),
                std::any::type_name::<T>()
            ),
        }
    }

    pub fn identity(&self) -> ObjIdentity {
        match self.block() {
            Some(block) => block.identity(),
            None => self.identity,
        }
    }

    /// Writes through to the shared block when there is one
    pub fn set_identity(&mut self, identity: ObjIdentity) {
        match self.block() {
            Some(block) => block.set_identity(identity),
            None => self.identity = identity,
        }
    }

    pub fn id(&self) -> ObjId {
        self.identity().id
    }

    pub fn set_id(&mut self, id: ObjId) {
        let identity = self.identity();
        self.set_identity(ObjIdentity::new(id, identity.flags));
    }

    pub fn flags(&self) -> ObjFlags {
        self.identity().flags
    }

    pub fn set_flags(&mut self, flags: ObjFlags) {
        let identity = self.identity();
        self.set_identity(ObjIdentity::new(identity.id, flags));
    }

    /// Number of strong handles to the payload (0 when empty or dead)
    pub fn strong_count(&self) -> u16 {
        self.block().map_or(0, RefBlock::strong)
    }

    /// Number of handles of any kind sharing the block
    pub fn handle_count(&self) -> u16 {
        self.block().map_or(0, RefBlock::handles)
    }

    /// Address of the payload, used by the by-address index
    pub fn address(&self) -> Option<usize> {
        self.live_block().and_then(RefBlock::payload_address)
    }

    /// Shares the block under another view type. Yields an empty
    /// handle when the payload is not a `U`. A payload still under
    /// construction is accepted as any type.
    pub fn cast<U: ?Sized + Pointee>(&self) -> Ptr<U> {
        let Some(block) = self.live_block() else {
            return Ptr::with_identity(self.identity());
        };

        if !Self::compatible::<U>(block) {
            return Ptr::null();
        }

        block.retain();
        Ptr::from_block(NonNull::from(block))
    }

    /// Like [`cast`](Self::cast) but moves the counts instead of
    /// taking new ones
    pub fn into_cast<U: ?Sized + Pointee>(self) -> Ptr<U> {
        let this = ManuallyDrop::new(self);
        let raw_block = this.block;
        match raw_block {
            Some(raw) => {
                let block = unsafe { raw.as_ref() };
                if block.strong() > 0 && !Self::compatible::<U>(block) {
                    // Give the counts back through the normal path
                    drop(ManuallyDrop::into_inner(this));
                    return Ptr::null();
                }
                Ptr::from_block(raw)
            }
            None => Ptr::with_identity(this.identity),
        }
    }

    fn compatible<U: ?Sized + Pointee>(block: &RefBlock) -> bool {
        match block.slot.try_borrow() {
            Ok(slot) => slot.as_deref().map_or(true, |payload| U::cast_ref(payload).is_some()),
            Err(_) => true,
        }
    }

    pub fn erase(&self) -> Ptr<dyn Managed> {
        self.cast::<dyn Managed>()
    }

    pub fn downgrade(&self) -> PtrView<T> {
        PtrView::new(self)
    }

    /// Type-erased observer of the same block
    pub(crate) fn erased_view(&self) -> PtrView<dyn Managed> {
        PtrView::from_raw(self.block)
    }

    /// Release the payload and become an empty handle
    pub fn reset(&mut self) {
        *self = Ptr::null();
    }

    /// Same live payload, regardless of view type
    pub fn same_object<U: ?Sized + Pointee>(&self, other: &Ptr<U>) -> bool {
        self.live_address() == other.live_address()
    }

    fn live_address(&self) -> Option<usize> {
        self.live_block().map(|b| b as *const RefBlock as usize)
    }

    /// Walk the subgraph below this payload, calling `on_edge` for
    /// every strong reference met. Returns false when the payload
    /// could not be entered (empty, dead or mutably borrowed).
    pub fn walk(&self, policy: VisitPolicy, on_edge: impl FnMut(&Edge<'_>) -> bool) -> bool {
        match self.live_block() {
            Some(block) => walker::walk_block(NonNull::from(block), policy, on_edge),
            None => false,
        }
    }
}

impl<T: ?Sized + Pointee> Clone for Ptr<T> {
    fn clone(&self) -> Self {
        match self.live_block() {
            Some(block) => {
                block.retain();
                Ptr::from_block(NonNull::from(block))
            }
            None => Ptr::with_identity(self.identity()),
        }
    }
}

impl<T: ?Sized + Pointee> Drop for Ptr<T> {
    fn drop(&mut self) {
        let Some(block) = self.block.take() else {
            return;
        };

        unsafe {
            release::release_strong(block);
            RefBlock::release_handle(block);
        }
    }
}

impl<T: ?Sized + Pointee> Default for Ptr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized + Pointee, U: ?Sized + Pointee> PartialEq<Ptr<U>> for Ptr<T> {
    fn eq(&self, other: &Ptr<U>) -> bool {
        self.same_object(other)
    }
}

impl<T: ?Sized + Pointee> fmt::Debug for Ptr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let identity = self.identity();
        match self.block() {
            Some(block) => f
                .debug_struct("Ptr")
                .field("type", &block.type_name())
                .field("id", &identity.id)
                .field("flags", &identity.flags)
                .field("strong", &block.strong())
                .finish(),
            None => f
                .debug_struct("Ptr")
                .field("id", &identity.id)
                .field("flags", &identity.flags)
                .finish(),
        }
    }
}
