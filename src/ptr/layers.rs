//! Base-class layers embedded in a payload
//!
//! A derived class embeds its base by value and announces it through
//! `Dnv::base`. The first time a payload type is placed in a block its
//! layers are found with a data-free visit and recorded as byte offsets
//! from the start of the payload. [`Pointee`](super::Pointee) uses the
//! offsets to view a payload as any of its bases, so a `Ptr<Base>` can
//! share the block of a derived object.

use super::managed::Managed;
use crate::logging::trace;
use crate::obj::Object;
use crate::visit::{Dnv, ErasedPtr, ErasedView, NodeVisitor, Value, VisitMode, VisitPolicy};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use smallvec::SmallVec;
use std::any::TypeId;
use std::mem;

type Layers = SmallVec<[(TypeId, usize); 4]>;

/// Payload type -> every inline base layer with its offset
static LAYERS: Lazy<DashMap<TypeId, Layers>> = Lazy::new(DashMap::new);

/// Record the base layers of `payload`'s type, once per type.
///
/// Runs the payload's visit (or its save handlers) with a visitor that
/// ignores every field but bases, so no data is read or written.
pub(crate) fn discover(payload: &mut dyn Managed) {
    let type_id = (*payload).as_any().type_id();
    if LAYERS.contains_key(&type_id) {
        return;
    }

    let mut finder = LayerFinder {
        start: address_of(&*payload),
        size: mem::size_of_val(&*payload),
        found: Layers::new(),
    };
    VisitPolicy::RELEASE.apply(payload, &mut Dnv::new(&mut finder));

    if !finder.found.is_empty() {
        trace!(
            event = "layers_found",
            type_name = (*payload).type_name(),
            layers = finder.found.len()
        );
    }
    LAYERS.insert(type_id, finder.found);
}

/// Offset of the `layer` base inside `payload`, if it embeds one
pub(crate) fn offset_of(payload: &dyn Managed, layer: TypeId) -> Option<usize> {
    let layers = LAYERS.get(&payload.as_any().type_id())?;
    layers.iter().find(|(t, _)| *t == layer).map(|(_, offset)| *offset)
}

fn address_of<T: ?Sized>(value: &T) -> usize {
    (value as *const T).cast::<u8>() as usize
}

struct LayerFinder {
    start: usize,
    size: usize,
    found: Layers,
}

impl NodeVisitor for LayerFinder {
    fn mode(&self) -> VisitMode {
        VisitMode::Walk
    }

    fn value(&mut self, _value: &mut dyn Value) {}

    fn len(&mut self, _len: usize) -> Option<usize> {
        None
    }

    fn ptr(&mut self, _ptr: &mut dyn ErasedPtr) {}

    fn view(&mut self, _view: &mut dyn ErasedView) {}

    fn base(&mut self, base: &mut dyn Object) {
        let address = address_of(&*base);
        let size = mem::size_of_val(&*base);

        // Only bases stored inline keep a fixed offset
        if address < self.start || address + size > self.start + self.size {
            return;
        }

        let layer = (*base).as_any().type_id();
        if !self.found.iter().any(|(t, _)| *t == layer) {
            self.found.push((layer, address - self.start));
        }

        VisitPolicy::RELEASE.apply(base.as_managed_mut(), &mut Dnv::new(self));
    }

    fn nested(&mut self, _nested: &mut dyn Managed) {}
}
