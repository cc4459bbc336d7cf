//! Graph visiting
//!
//! One field enumeration per type serves three purposes: walking the
//! live graph (release analysis, diagnostics), saving, and loading.
//! Types describe their fields once through [`Visitable::accept`] /
//! [`Managed::visit`]; the [`Dnv`] they are handed routes every field
//! to whichever node visitor is running.
//!
//! - [`value`]: leaf fields through bincode
//! - [`containers`]: element-wise recursion into collections
//! - [`policy`]: how an object's children are enumerated, plus the
//!   per-traversal cycle guard
//! - [`walker`]: the generic walk with a per-edge callback

mod containers;
pub mod policy;
mod value;
pub mod walker;

#[cfg(test)]
mod tests;

pub use policy::{CycleGuard, VisitPolicy};
pub use value::Value;
pub use walker::{walk, Edge};

use crate::obj::{Class, Object, ObjIdentity};
use crate::ptr::{Managed, Pointee, Ptr, PtrView, RefBlock};

/// What the running traversal does with the fields it is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitMode {
    /// Follow strong references, ignore data
    Walk,
    /// Append fields to a stream
    Save,
    /// Read fields back from a stream
    Load,
}

/// A field that can be enumerated by a visit
pub trait Visitable {
    fn accept(&mut self, dnv: &mut Dnv<'_>);
}

/// Receiver of the fields of one traversal
pub(crate) trait NodeVisitor {
    fn mode(&self) -> VisitMode;
    fn value(&mut self, value: &mut dyn Value);
    /// Length of a collection about to be visited. `None` means no
    /// length is available and the collection must be left alone.
    fn len(&mut self, len: usize) -> Option<usize>;
    fn ptr(&mut self, ptr: &mut dyn ErasedPtr);
    fn view(&mut self, view: &mut dyn ErasedView);
    /// Embedded base-class layer
    fn base(&mut self, base: &mut dyn Object);
    /// Embedded plain value with its own visit
    fn nested(&mut self, nested: &mut dyn Managed);
}

/// Handed to every visit; routes fields to the running traversal.
///
/// Calls chain, so a visit reads like the field list:
///
/// ```ignore
/// fn visit(&mut self, dnv: &mut Dnv<'_>) {
///     dnv.base(&mut self.base).visit(&mut self.name).visit(&mut self.children);
/// }
/// ```
pub struct Dnv<'a> {
    node: &'a mut dyn NodeVisitor,
}

impl<'a> Dnv<'a> {
    pub(crate) fn new(node: &'a mut dyn NodeVisitor) -> Self {
        Self { node }
    }

    #[inline]
    pub fn mode(&self) -> VisitMode {
        self.node.mode()
    }

    #[inline]
    pub fn visit<V: Visitable + ?Sized>(&mut self, field: &mut V) -> &mut Self {
        field.accept(self);
        self
    }

    /// Announce the embedded base-class value; persisted as its own layer
    #[inline]
    pub fn base<B: Class>(&mut self, base: &mut B) -> &mut Self {
        self.node.base(base);
        self
    }

    /// Visit an embedded value through its own `visit`
    #[inline]
    pub fn nested<N: Managed>(&mut self, nested: &mut N) -> &mut Self {
        self.node.nested(nested);
        self
    }

    /// Leaf field
    #[inline]
    pub fn value(&mut self, value: &mut dyn Value) {
        self.node.value(value);
    }

    /// Collection length handshake: saving records `len`, loading
    /// returns the stored length, walking returns `len` unchanged
    #[inline]
    pub fn sequence_len(&mut self, len: usize) -> Option<usize> {
        self.node.len(len)
    }

    #[inline]
    pub(crate) fn ptr(&mut self, ptr: &mut dyn ErasedPtr) {
        self.node.ptr(ptr);
    }

    #[inline]
    pub(crate) fn view(&mut self, view: &mut dyn ErasedView) {
        self.node.view(view);
    }
}

/// A strong handle with its view type erased
pub(crate) trait ErasedPtr {
    fn identity(&self) -> ObjIdentity;
    fn live_block(&self) -> Option<&RefBlock>;
    /// Point at `target`; false when its payload has the wrong type
    fn assign(&mut self, target: &Ptr<dyn Managed>) -> bool;
    /// Become an empty handle carrying `identity`
    fn clear_to(&mut self, identity: ObjIdentity);
}

impl<T: ?Sized + Pointee> ErasedPtr for Ptr<T> {
    fn identity(&self) -> ObjIdentity {
        Ptr::identity(self)
    }

    fn live_block(&self) -> Option<&RefBlock> {
        Ptr::live_block(self)
    }

    fn assign(&mut self, target: &Ptr<dyn Managed>) -> bool {
        let typed = target.cast::<T>();
        if typed.is_null() && !target.is_null() {
            return false;
        }
        *self = typed;
        true
    }

    fn clear_to(&mut self, identity: ObjIdentity) {
        *self = Ptr::with_identity(identity);
    }
}

/// A weak handle with its view type erased
pub(crate) trait ErasedView {
    fn identity(&self) -> ObjIdentity;
    fn bind(&mut self, target: &Ptr<dyn Managed>) -> bool;
    fn clear(&mut self);
}

impl<T: ?Sized + Pointee> ErasedView for PtrView<T> {
    fn identity(&self) -> ObjIdentity {
        PtrView::identity(self)
    }

    fn bind(&mut self, target: &Ptr<dyn Managed>) -> bool {
        PtrView::bind(self, target)
    }

    fn clear(&mut self) {
        self.reset();
    }
}

impl<T: ?Sized + Pointee> Visitable for Ptr<T> {
    #[inline]
    fn accept(&mut self, dnv: &mut Dnv<'_>) {
        dnv.ptr(self);
    }
}

impl<T: ?Sized + Pointee> Visitable for PtrView<T> {
    #[inline]
    fn accept(&mut self, dnv: &mut Dnv<'_>) {
        dnv.view(self);
    }
}
