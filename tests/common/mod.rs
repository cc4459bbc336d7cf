//! Persistent classes and fixtures shared by the integration tests
#![allow(dead_code)]

use domain_runtime::{Class, Dnv, Domain, MapStorage, Obj, ObjFlags, ObjId, Pointee, Ptr, Registry};
use std::sync::Arc;

pub struct Bar {
    pub base: Obj,
    pub x: i32,
    pub y: f32,
}

impl Default for Bar {
    fn default() -> Self {
        Self {
            base: Obj::default(),
            x: 1,
            y: 3.2,
        }
    }
}

impl Class for Bar {
    const NAME: &'static str = "test::Bar";

    fn visit(&mut self, dnv: &mut Dnv<'_>) {
        dnv.base(&mut self.base).visit(&mut self.x).visit(&mut self.y);
    }
}

#[derive(Default)]
pub struct Foo {
    pub base: Obj,
    pub bar: Ptr<Bar>,
}

impl Foo {
    pub fn create(domain: &Domain, id: ObjId) -> Ptr<Foo> {
        domain.create_with_id(id, |d| Foo {
            bar: d.create(|_| Bar::default()),
            ..Foo::default()
        })
    }
}

impl Class for Foo {
    const NAME: &'static str = "test::Foo";

    fn visit(&mut self, dnv: &mut Dnv<'_>) {
        dnv.base(&mut self.base).visit(&mut self.bar);
    }
}

/// Mark a handle's target as loaded only on request
pub fn lazy<T: ?Sized + Pointee>(mut ptr: Ptr<T>) -> Ptr<T> {
    ptr.set_flags(ObjFlags::UNLOADED_BY_DEFAULT);
    ptr
}

pub fn registry(register: impl FnOnce(&mut Registry)) -> Arc<Registry> {
    let mut registry = Registry::new();
    registry.register::<Bar>().register::<Foo>();
    register(&mut registry);
    Arc::new(registry)
}

pub fn domain(registry: &Arc<Registry>, storage: &Arc<MapStorage>) -> Domain {
    Domain::new(registry.clone(), storage.clone())
}
