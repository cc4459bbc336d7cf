//! Persistent object model
//!
//! A persistent type implements [`Class`]: a name (hashed into its
//! [`ClassId`]), the name of its base class, and how its fields are
//! visited. Inheritance is composition: the derived type embeds its
//! base and announces it with [`Dnv::base`], and each class layer is
//! persisted on its own. [`Obj`] is the layer every chain ends in.
//!
//! Every `Class` is automatically [`Managed`] (it can live in a `Ptr`)
//! and [`Object`] (the object-safe face the domain works with).

mod class;
mod identity;
mod time;

pub use class::{ClassId, ROOT_CLASS_NAME};
pub use identity::{ObjFlags, ObjId, ObjIdentity};
pub use time::TimePoint;

use crate::domain::Domain;
use crate::ptr::Managed;
use crate::version::{Direction, MigrationTable};
use crate::visit::Dnv;

/// Static description of a persistent type
pub trait Class: Default + 'static {
    /// Stable name; hashed into the class id
    const NAME: &'static str;
    /// Name of the base class
    const BASE: &'static str = ROOT_CLASS_NAME;
    /// Version stored by the plain `visit` when there is no migration table
    const VERSION: u8 = 0;
    const MIGRATIONS: MigrationTable<Self> = MigrationTable::NONE;

    fn visit(&mut self, _dnv: &mut Dnv<'_>) {}

    /// Called by [`Domain::update`]; returns when the object next wants
    /// to be updated
    fn update(&mut self, _now: TimePoint) -> Option<TimePoint> {
        None
    }

    fn class_id() -> ClassId {
        ClassId::of(Self::NAME)
    }

    fn base_id() -> ClassId {
        ClassId::of(Self::BASE)
    }
}

/// Object-safe view of a persistent payload
pub trait Object: Managed {
    fn object_class(&self) -> ClassId;
    fn class_name(&self) -> &'static str;
    /// Read every layer of this class (its base layers follow through
    /// `Dnv::base`) for the object stored under `id`
    fn load_layers(&mut self, domain: &Domain, id: ObjId);
    fn save_layers(&mut self, domain: &Domain, id: ObjId);
    /// Dispatches to [`Class::update`]
    fn update_at(&mut self, now: TimePoint) -> Option<TimePoint>;
    fn as_managed_mut(&mut self) -> &mut dyn Managed;
}

impl<T: Class> Managed for T {
    fn visit(&mut self, dnv: &mut Dnv<'_>) {
        Class::visit(self, dnv);
    }

    fn has_explicit_visit(&self) -> bool {
        T::MIGRATIONS.is_empty()
    }

    fn has_versions(&self, direction: Direction) -> bool {
        T::MIGRATIONS.has(direction)
    }

    fn visit_versions(&mut self, direction: Direction, dnv: &mut Dnv<'_>) -> bool {
        T::MIGRATIONS.run(self, direction, dnv)
    }

    fn as_object(&self) -> Option<&(dyn Object + 'static)> {
        Some(self)
    }

    fn as_object_mut(&mut self) -> Option<&mut (dyn Object + 'static)> {
        Some(self)
    }
}

impl<T: Class> Object for T {
    fn object_class(&self) -> ClassId {
        <T as Class>::class_id()
    }

    fn class_name(&self) -> &'static str {
        T::NAME
    }

    fn load_layers(&mut self, domain: &Domain, id: ObjId) {
        domain.load_object(self, id);
    }

    fn save_layers(&mut self, domain: &Domain, id: ObjId) {
        domain.save_object(self, id);
    }

    fn update_at(&mut self, now: TimePoint) -> Option<TimePoint> {
        Class::update(self, now)
    }

    fn as_managed_mut(&mut self) -> &mut dyn Managed {
        self
    }
}

/// Root layer shared by every persistent class
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Obj {
    pub update_time: TimePoint,
}

impl Class for Obj {
    const NAME: &'static str = ROOT_CLASS_NAME;
    const BASE: &'static str = ROOT_CLASS_NAME;

    fn visit(&mut self, dnv: &mut Dnv<'_>) {
        dnv.visit(&mut self.update_time);
    }
}
