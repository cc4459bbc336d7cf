//! Shared control block behind every handle
//!
//! Layout: two counters, the object identity, cached type information
//! and the payload slot. `strong` counts owning handles; `handles`
//! counts every handle (owning or observing) and keeps the block
//! itself allocated. The payload is dropped when `strong` reaches zero,
//! the block is freed when `handles` reaches zero.

use super::layers;
use super::managed::Managed;
use crate::logging::{error, trace};
use crate::obj::ObjIdentity;
use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::ptr::NonNull;

pub(crate) struct RefBlock {
    strong: Cell<u16>,
    handles: Cell<u16>,
    identity: Cell<ObjIdentity>,
    type_id: Cell<Option<TypeId>>,
    type_name: Cell<&'static str>,
    pub(crate) slot: RefCell<Option<Box<dyn Managed>>>,
}

impl RefBlock {
    /// Allocate a block owned by one strong handle.
    /// `payload` may be `None` for an object still under construction.
    pub(crate) fn allocate(
        payload: Option<Box<dyn Managed>>,
        identity: ObjIdentity,
    ) -> NonNull<RefBlock> {
        let block = Box::new(RefBlock {
            strong: Cell::new(1),
            handles: Cell::new(1),
            identity: Cell::new(identity),
            type_id: Cell::new(None),
            type_name: Cell::new("<pending>"),
            slot: RefCell::new(None),
        });

        if let Some(payload) = payload {
            block.place(payload);
        }

        let ptr = NonNull::from(Box::leak(block));
        trace!(event = "block_new", address = ?ptr.as_ptr(), strong = 1);
        ptr
    }

    /// Install the payload of a pending block
    pub(crate) fn place(&self, mut payload: Box<dyn Managed>) {
        layers::discover(&mut *payload);
        let managed: &dyn Managed = &*payload;
        self.type_id.set(Some(managed.as_any().type_id()));
        self.type_name.set(managed.type_name());

        match self.slot.try_borrow_mut() {
            Ok(mut slot) => {
                debug_assert!(slot.is_none(), "payload placed twice");
                *slot = Some(payload);
            }
            Err(_) => error!(
                event = "block_place_failed",
                type_name = self.type_name.get(),
                "payload slot is borrowed"
            ),
        }
    }

    #[inline]
    pub(crate) fn strong(&self) -> u16 {
        self.strong.get()
    }

    #[inline]
    pub(crate) fn handles(&self) -> u16 {
        self.handles.get()
    }

    #[inline]
    pub(crate) fn identity(&self) -> ObjIdentity {
        self.identity.get()
    }

    #[inline]
    pub(crate) fn set_identity(&self, identity: ObjIdentity) {
        self.identity.set(identity);
    }

    #[inline]
    pub(crate) fn type_id(&self) -> Option<TypeId> {
        self.type_id.get()
    }

    #[inline]
    pub(crate) fn type_name(&self) -> &'static str {
        self.type_name.get()
    }

    /// Address of the payload, if one is installed and not mutably borrowed
    pub(crate) fn payload_address(&self) -> Option<usize> {
        let slot = self.slot.try_borrow().ok()?;
        slot.as_deref().map(|payload| payload as *const dyn Managed as *const () as usize)
    }

    /// Payload constructed and not destroyed yet
    pub(crate) fn is_constructed(&self) -> bool {
        match self.slot.try_borrow() {
            Ok(slot) => slot.is_some(),
            // Only a live payload can be borrowed
            Err(_) => true,
        }
    }

    /// Take a strong count together with its handle count.
    ///
    /// # Panics
    ///
    /// When either counter is saturated. Both are checked before either
    /// is written, so the block is left as it was.
    #[inline(always)]
    pub(crate) fn retain(&self) {
        let strong = increment(self.strong.get(), "strong");
        let handles = increment(self.handles.get(), "handle");
        self.strong.set(strong);
        self.handles.set(handles);
    }

    /// # Panics
    ///
    /// When the handle counter is saturated.
    #[inline(always)]
    pub(crate) fn retain_handle(&self) {
        self.handles.set(increment(self.handles.get(), "handle"));
    }

    /// Drop one strong count without destroying
    #[inline]
    pub(crate) fn decrement_strong(&self) {
        let old = self.strong.get();
        debug_assert!(old > 1, "decrement would destroy");
        self.strong.set(old - 1);
    }

    /// Drop the strong count to zero and destroy the payload
    #[cold]
    pub(crate) fn destroy(&self) {
        self.strong.set(0);

        let payload = match self.slot.try_borrow_mut() {
            Ok(mut slot) => slot.take(),
            Err(_) => {
                error!(
                    event = "destroy_while_borrowed",
                    type_name = self.type_name(),
                    "payload is borrowed during destruction and is leaked"
                );
                return;
            }
        };

        trace!(event = "block_destroy", type_name = self.type_name(), id = %self.identity().id);

        // The slot is empty before child handles start releasing
        drop(payload);
    }

    /// Release one handle count, freeing the block at zero.
    ///
    /// # Safety
    ///
    /// `block` must come from [`RefBlock::allocate`] and the caller must
    /// own one handle count, which is consumed.
    pub(crate) unsafe fn release_handle(block: NonNull<RefBlock>) {
        let remaining = {
            let b = block.as_ref();
            let old = b.handles.get();
            debug_assert!(old > 0, "handle count underflow");
            b.handles.set(old - 1);
            old - 1
        };

        if remaining == 0 {
            trace!(event = "block_free", address = ?block.as_ptr());
            drop(Box::from_raw(block.as_ptr()));
        }
    }
}

#[inline(always)]
fn increment(count: u16, counter: &str) -> u16 {
    match count.checked_add(1) {
        Some(next) => next,
        None => overflow(counter),
    }
}

#[cold]
#[inline(never)]
fn overflow(counter: &str) -> ! {
    error!(event = "count_overflow", counter, "reference count overflow");
    panic!("{} count overflow", counter)
}
