//! Storage-backed node visitors
//!
//! A class layer is one byte stream: its fields in visit order, each
//! strong or weak reference written as the target's identity. Saving a
//! strong reference also saves the target; loading one materializes the
//! target unless its flags say it is lazy.

use super::Domain;
use crate::logging::{trace, warn};
use crate::obj::{ObjFlags, ObjId, ObjIdentity, Object};
use crate::ptr::Managed;
use crate::visit::{Dnv, ErasedPtr, ErasedView, NodeVisitor, Value, VisitMode};

/// Appends one layer's fields to a buffer
pub(crate) struct SaveVisitor<'d> {
    domain: &'d Domain,
    id: ObjId,
    out: Vec<u8>,
}

impl<'d> SaveVisitor<'d> {
    pub(crate) fn new(domain: &'d Domain, id: ObjId) -> Self {
        Self {
            domain,
            id,
            out: Vec::with_capacity(64),
        }
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.out
    }

    fn write(&mut self, value: &dyn Value) {
        if let Err(e) = value.encode(&mut self.out) {
            warn!(event = "field_encode_failed", id = %self.id, error = %e);
        }
    }
}

impl NodeVisitor for SaveVisitor<'_> {
    fn mode(&self) -> VisitMode {
        VisitMode::Save
    }

    fn value(&mut self, value: &mut dyn Value) {
        self.write(value);
    }

    fn len(&mut self, len: usize) -> Option<usize> {
        self.write(&(len as u64));
        Some(len)
    }

    fn ptr(&mut self, ptr: &mut dyn ErasedPtr) {
        self.write(&ptr.identity());
        self.domain.save_root_impl(ptr);
    }

    fn view(&mut self, view: &mut dyn ErasedView) {
        self.write(&view.identity());
    }

    fn base(&mut self, base: &mut dyn Object) {
        base.save_layers(self.domain, self.id);
    }

    fn nested(&mut self, nested: &mut dyn Managed) {
        nested.visit(&mut Dnv::new(self));
    }
}

/// Reads one layer's fields back in visit order
pub(crate) struct LoadVisitor<'d, 'b> {
    domain: &'d Domain,
    id: ObjId,
    input: &'b [u8],
}

impl<'d, 'b> LoadVisitor<'d, 'b> {
    pub(crate) fn new(domain: &'d Domain, id: ObjId, input: &'b [u8]) -> Self {
        Self { domain, id, input }
    }

    /// Decode into `value`; false (value unchanged) past the end
    fn read(&mut self, value: &mut dyn Value) -> bool {
        if self.input.is_empty() {
            return false;
        }
        match value.decode(&mut self.input) {
            Ok(()) => true,
            Err(e) => {
                trace!(event = "field_decode_failed", id = %self.id, error = %e);
                self.input = &[];
                false
            }
        }
    }

    fn read_identity(&mut self) -> Option<ObjIdentity> {
        let mut identity = ObjIdentity::default();
        self.read(&mut identity).then_some(identity)
    }
}

impl NodeVisitor for LoadVisitor<'_, '_> {
    fn mode(&self) -> VisitMode {
        VisitMode::Load
    }

    fn value(&mut self, value: &mut dyn Value) {
        self.read(value);
    }

    fn len(&mut self, _len: usize) -> Option<usize> {
        let mut stored = 0u64;
        if !self.read(&mut stored) {
            return None;
        }
        // Every element takes at least one byte
        Some((stored as usize).min(self.input.len()))
    }

    fn ptr(&mut self, ptr: &mut dyn ErasedPtr) {
        let Some(identity) = self.read_identity() else {
            return;
        };

        ptr.clear_to(ObjIdentity::new(identity.id, identity.flags | ObjFlags::UNLOADED));
        if identity.flags.skips_load() {
            return;
        }
        self.domain.load_root_impl(ptr);
    }

    fn view(&mut self, view: &mut dyn ErasedView) {
        let Some(identity) = self.read_identity() else {
            return;
        };

        match self.domain.find_resident(identity.id) {
            Some(target) if view.bind(&target) => {}
            _ => view.clear(),
        }
    }

    fn base(&mut self, base: &mut dyn Object) {
        base.load_layers(self.domain, self.id);
    }

    fn nested(&mut self, nested: &mut dyn Managed) {
        nested.visit(&mut Dnv::new(self));
    }
}
