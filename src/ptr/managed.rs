//! Payload traits for managed blocks
//!
//! A block stores its payload as `Box<dyn Managed>`. Typed handles
//! recover the concrete view through [`Pointee`], which is implemented
//! for every sized payload plus the two erased views the runtime hands
//! out: `dyn Managed` (anything) and `dyn Object` (anything persistent).
//! A sized view also matches the base classes a payload embeds.

use super::layers;
use crate::obj::Object;
use crate::version::Direction;
use crate::visit::Dnv;
use std::any::{Any, TypeId};

/// Dynamic type access for payloads
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any> AsAny for T {
    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Anything that can live behind a [`Ptr`](crate::Ptr).
///
/// `visit` enumerates the payload's fields in declaration order. The
/// same enumeration drives graph walks, saving and loading, so it must
/// name every `Ptr` the payload owns. A payload that keeps the default
/// empty visit is opaque: walks never look inside it, and a cycle that
/// passes through it is never collected.
pub trait Managed: AsAny + 'static {
    fn visit(&mut self, _dnv: &mut Dnv<'_>) {}

    /// Whether `visit` is the way to enumerate this payload
    fn has_explicit_visit(&self) -> bool {
        true
    }

    /// Whether versioned handlers exist for `direction`
    fn has_versions(&self, _direction: Direction) -> bool {
        false
    }

    /// Runs every versioned handler for `direction` in order.
    /// Returns false when there are none.
    fn visit_versions(&mut self, _direction: Direction, _dnv: &mut Dnv<'_>) -> bool {
        false
    }

    fn as_object(&self) -> Option<&(dyn Object + 'static)> {
        None
    }

    fn as_object_mut(&mut self) -> Option<&mut (dyn Object + 'static)> {
        None
    }
}

/// Cast seam between an erased payload and a handle's view type
pub trait Pointee: 'static {
    fn cast_ref<'a>(payload: &'a (dyn Managed + 'static)) -> Option<&'a Self>;
    fn cast_mut<'a>(payload: &'a mut (dyn Managed + 'static)) -> Option<&'a mut Self>;
}

/// A payload can be viewed as its own type or as any base class it
/// embeds inline.
impl<T: Managed> Pointee for T {
    #[inline]
    fn cast_ref<'a>(payload: &'a (dyn Managed + 'static)) -> Option<&'a Self> {
        if let Some(this) = payload.as_any().downcast_ref::<T>() {
            return Some(this);
        }
        let offset = layers::offset_of(payload, TypeId::of::<T>())?;
        // The offset was recorded for this payload type from an inline `T`
        // field, so it stays inside the payload and is aligned for `T`
        Some(unsafe { &*(payload as *const dyn Managed).cast::<u8>().add(offset).cast::<T>() })
    }

    #[inline]
    fn cast_mut<'a>(payload: &'a mut (dyn Managed + 'static)) -> Option<&'a mut Self> {
        if (*payload).as_any().is::<T>() {
            return payload.as_any_mut().downcast_mut::<T>();
        }
        let offset = layers::offset_of(payload, TypeId::of::<T>())?;
        Some(unsafe { &mut *(payload as *mut dyn Managed).cast::<u8>().add(offset).cast::<T>() })
    }
}

impl Pointee for dyn Managed {
    #[inline]
    fn cast_ref<'a>(payload: &'a (dyn Managed + 'static)) -> Option<&'a Self> {
        Some(payload)
    }

    #[inline]
    fn cast_mut<'a>(payload: &'a mut (dyn Managed + 'static)) -> Option<&'a mut Self> {
        Some(payload)
    }
}

impl Pointee for dyn Object {
    #[inline]
    fn cast_ref<'a>(payload: &'a (dyn Managed + 'static)) -> Option<&'a Self> {
        payload.as_object()
    }

    #[inline]
    fn cast_mut<'a>(payload: &'a mut (dyn Managed + 'static)) -> Option<&'a mut Self> {
        payload.as_object_mut()
    }
}
