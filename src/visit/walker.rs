//! Generic graph walk
//!
//! Reports every strong edge met to a callback and, when the callback
//! asks for it, descends into the target using the walk's policy. A
//! target already entered during this walk is reported again but not
//! re-entered, which keeps walks finite on cyclic graphs.
//!
//! A payload that is mutably borrowed elsewhere cannot be entered and
//! is treated as having no children.

use super::{Dnv, ErasedPtr, ErasedView, NodeVisitor, Value, VisitMode, VisitPolicy};
use super::policy::CycleGuard;
use crate::logging::trace;
use crate::obj::{ObjIdentity, Object};
use crate::ptr::{Managed, RefBlock};
use std::any::TypeId;
use std::ptr::NonNull;

/// A strong reference met during a walk
pub struct Edge<'a> {
    target: &'a RefBlock,
    parent: Option<&'a RefBlock>,
}

impl<'a> Edge<'a> {
    pub fn type_id(&self) -> Option<TypeId> {
        self.target.type_id()
    }

    pub fn type_name(&self) -> &'static str {
        self.target.type_name()
    }

    pub fn is<T: Managed>(&self) -> bool {
        self.type_id() == Some(TypeId::of::<T>())
    }

    pub fn identity(&self) -> ObjIdentity {
        self.target.identity()
    }

    pub fn strong_count(&self) -> u16 {
        self.target.strong()
    }

    /// Stable for as long as the target's block lives
    pub fn target_key(&self) -> usize {
        self.target as *const RefBlock as usize
    }

    /// `None` for edges leaving the walk's root when the root is not
    /// held by a block
    pub fn parent_key(&self) -> Option<usize> {
        self.parent.map(|p| p as *const RefBlock as usize)
    }

    pub(crate) fn target_block(&self) -> &'a RefBlock {
        self.target
    }

    pub(crate) fn parent_block(&self) -> Option<&'a RefBlock> {
        self.parent
    }
}

struct Walker<'f> {
    policy: VisitPolicy,
    on_edge: &'f mut dyn FnMut(&Edge<'_>) -> bool,
    guard: CycleGuard,
    parents: Vec<NonNull<RefBlock>>,
}

impl<'f> Walker<'f> {
    fn new(policy: VisitPolicy, on_edge: &'f mut dyn FnMut(&Edge<'_>) -> bool) -> Self {
        Self {
            policy,
            on_edge,
            guard: CycleGuard::new(),
            parents: Vec::new(),
        }
    }

    /// Enter a block's payload. False when it could not be borrowed.
    fn enter_block(&mut self, block: NonNull<RefBlock>) -> bool {
        let b = unsafe { &*block.as_ptr() };

        let Ok(mut slot) = b.slot.try_borrow_mut() else {
            trace!(event = "walk_skip_borrowed", type_name = b.type_name());
            return false;
        };
        let Some(payload) = slot.as_deref_mut() else {
            return true;
        };

        if self.guard.enter(payload) {
            let policy = self.policy;
            self.parents.push(block);
            policy.apply(payload, &mut Dnv::new(self));
            self.parents.pop();
        }
        true
    }

    fn enter_embedded(&mut self, target: &mut dyn Managed) {
        if self.guard.enter(target) {
            let policy = self.policy;
            policy.apply(target, &mut Dnv::new(self));
        }
    }
}

impl NodeVisitor for Walker<'_> {
    fn mode(&self) -> VisitMode {
        VisitMode::Walk
    }

    fn value(&mut self, _value: &mut dyn Value) {}

    fn len(&mut self, len: usize) -> Option<usize> {
        Some(len)
    }

    fn ptr(&mut self, ptr: &mut dyn ErasedPtr) {
        let Some(target) = ptr.live_block() else {
            return;
        };
        let target = NonNull::from(target);

        let descend = {
            let edge = Edge {
                target: unsafe { &*target.as_ptr() },
                parent: self.parents.last().map(|p| unsafe { &*p.as_ptr() }),
            };
            (self.on_edge)(&edge)
        };

        if descend {
            self.enter_block(target);
        }
    }

    fn view(&mut self, _view: &mut dyn ErasedView) {}

    fn base(&mut self, base: &mut dyn Object) {
        self.enter_embedded(base.as_managed_mut());
    }

    fn nested(&mut self, nested: &mut dyn Managed) {
        self.enter_embedded(nested);
    }
}

/// Walk everything reachable from `root` through strong references.
///
/// `on_edge` is called once per edge; returning false stops the walk
/// from descending into that edge's target.
pub fn walk(
    root: &mut dyn Managed,
    policy: VisitPolicy,
    mut on_edge: impl FnMut(&Edge<'_>) -> bool,
) {
    let mut walker = Walker::new(policy, &mut on_edge);
    walker.enter_embedded(root);
}

/// Walk from a payload held in a block; the block is the parent of
/// the first level of edges
pub(crate) fn walk_block(
    root: NonNull<RefBlock>,
    policy: VisitPolicy,
    mut on_edge: impl FnMut(&Edge<'_>) -> bool,
) -> bool {
    let mut walker = Walker::new(policy, &mut on_edge);
    walker.enter_block(root)
}
