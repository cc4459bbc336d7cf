//! Loading data written by older and newer schema versions of a class

mod common;

use domain_runtime::{Class, ClassId, Dnv, Domain, MapStorage, MigrationTable, Obj, ObjId, Ptr};
use std::sync::Arc;

/// First version: nothing beyond the root layer
#[derive(Default)]
struct Friday0 {
    base: Obj,
}

impl Class for Friday0 {
    const NAME: &'static str = "test::Friday0";

    fn visit(&mut self, dnv: &mut Dnv<'_>) {
        dnv.base(&mut self.base);
    }
}

/// Adds two fields
#[derive(Default)]
struct Friday1 {
    base: Obj,
    a: i32,
    b: i32,
}

impl Friday1 {
    fn load_v0(&mut self, dnv: &mut Dnv<'_>) {
        dnv.base(&mut self.base);
        self.a = 22;
        self.b = 23;
    }

    fn load_v1(&mut self, dnv: &mut Dnv<'_>) {
        dnv.visit(&mut self.a).visit(&mut self.b);
    }

    fn save_v0(&mut self, dnv: &mut Dnv<'_>) {
        dnv.base(&mut self.base);
    }

    fn save_v1(&mut self, dnv: &mut Dnv<'_>) {
        dnv.visit(&mut self.a).visit(&mut self.b);
    }
}

impl Class for Friday1 {
    const NAME: &'static str = "test::Friday1";
    const VERSION: u8 = 1;
    const MIGRATIONS: MigrationTable<Self> = MigrationTable::new(
        &[(0, Self::load_v0), (1, Self::load_v1)],
        &[(0, Self::save_v0), (1, Self::save_v1)],
    );
}

/// `a` becomes a float, `b` is dropped
#[derive(Default)]
struct Friday2 {
    base: Obj,
    a: f32,
}

/// Version 1 layout of `a` and `b`, shared by the float-carrying versions
fn load_legacy_pair(a: &mut f32, dnv: &mut Dnv<'_>) {
    let mut old_a = 0i32;
    let mut old_b = 0i32;
    dnv.visit(&mut old_a).visit(&mut old_b);
    *a = old_a as f32;
}

fn save_legacy_pair(a: f32, dnv: &mut Dnv<'_>) {
    let mut old_a = a as i32;
    let mut old_b = 0i32;
    dnv.visit(&mut old_a).visit(&mut old_b);
}

/// Zero means nothing was stored; keep what the older layer produced
fn load_float(a: &mut f32, dnv: &mut Dnv<'_>) {
    let mut stored = 0f32;
    dnv.visit(&mut stored);
    if stored != 0.0 {
        *a = stored;
    }
}

impl Friday2 {
    fn load_v0(&mut self, dnv: &mut Dnv<'_>) {
        dnv.base(&mut self.base);
    }

    fn load_v1(&mut self, dnv: &mut Dnv<'_>) {
        load_legacy_pair(&mut self.a, dnv);
    }

    fn load_v2(&mut self, dnv: &mut Dnv<'_>) {
        load_float(&mut self.a, dnv);
    }

    fn save_v0(&mut self, dnv: &mut Dnv<'_>) {
        dnv.base(&mut self.base);
    }

    fn save_v1(&mut self, dnv: &mut Dnv<'_>) {
        save_legacy_pair(self.a, dnv);
    }

    fn save_v2(&mut self, dnv: &mut Dnv<'_>) {
        dnv.visit(&mut self.a);
    }
}

impl Class for Friday2 {
    const NAME: &'static str = "test::Friday2";
    const VERSION: u8 = 2;
    const MIGRATIONS: MigrationTable<Self> = MigrationTable::new(
        &[(0, Self::load_v0), (1, Self::load_v1), (2, Self::load_v2)],
        &[(0, Self::save_v0), (1, Self::save_v1), (2, Self::save_v2)],
    );
}

#[derive(Default)]
struct Hoopa {
    base: Obj,
    x: String,
}

impl Class for Hoopa {
    const NAME: &'static str = "test::Hoopa";

    fn visit(&mut self, dnv: &mut Dnv<'_>) {
        dnv.base(&mut self.base).visit(&mut self.x);
    }
}

/// Moves under a new base class; version 3 stores nothing of its own
#[derive(Default)]
struct Friday3 {
    hoopa: Hoopa,
    a: f32,
}

impl Friday3 {
    fn load_v0(&mut self, dnv: &mut Dnv<'_>) {
        dnv.base(&mut self.hoopa);
    }

    fn load_v1(&mut self, dnv: &mut Dnv<'_>) {
        load_legacy_pair(&mut self.a, dnv);
    }

    fn load_v2(&mut self, dnv: &mut Dnv<'_>) {
        load_float(&mut self.a, dnv);
    }

    fn load_v3(&mut self, _dnv: &mut Dnv<'_>) {}

    fn save_v0(&mut self, dnv: &mut Dnv<'_>) {
        dnv.base(&mut self.hoopa);
    }

    fn save_v1(&mut self, dnv: &mut Dnv<'_>) {
        save_legacy_pair(self.a, dnv);
    }

    fn save_v2(&mut self, dnv: &mut Dnv<'_>) {
        dnv.visit(&mut self.a);
    }

    fn save_v3(&mut self, _dnv: &mut Dnv<'_>) {}
}

impl Class for Friday3 {
    const NAME: &'static str = "test::Friday3";
    const BASE: &'static str = Hoopa::NAME;
    const VERSION: u8 = 3;
    const MIGRATIONS: MigrationTable<Self> = MigrationTable::new(
        &[(0, Self::load_v0), (1, Self::load_v1), (2, Self::load_v2), (3, Self::load_v3)],
        &[(0, Self::save_v0), (1, Self::save_v1), (2, Self::save_v2), (3, Self::save_v3)],
    );
}

const FRIDAY: ObjId = ObjId::new(1);

fn setup() -> (Arc<MapStorage>, Domain) {
    let registry = common::registry(|r| {
        r.register::<Friday0>()
            .register::<Friday1>()
            .register::<Friday2>()
            .register::<Hoopa>()
            .register::<Friday3>();
    });
    let storage = Arc::new(MapStorage::new());
    let domain = common::domain(&registry, &storage);
    (storage, domain)
}

/// Pretend the stored object was written by another class
fn rename(storage: &MapStorage, from: ClassId, to: ClassId) {
    assert!(storage.replace_class(FRIDAY, from, to));
}

fn load<T: Class>(domain: &Domain) -> Ptr<T> {
    let mut ptr: Ptr<T> = Ptr::unloaded(FRIDAY);
    domain.load_root(&mut ptr);
    assert!(ptr.is_alive(), "{} did not load", T::NAME);
    ptr
}

#[test]
fn test_increase_version() {
    let (storage, domain) = setup();
    {
        let friday = domain.create_with_id(FRIDAY, |_| Friday0::default());
        domain.save_root(&friday);
    }

    rename(&storage, Friday0::class_id(), Friday1::class_id());
    {
        let friday = load::<Friday1>(&domain);
        assert_eq!(friday.borrow().a, 22);
        assert_eq!(friday.borrow().b, 23);
        friday.borrow_mut().a = 123;
        friday.borrow_mut().b = 431;
        domain.save_root(&friday);
    }
    assert_eq!(storage.versions(FRIDAY, Friday1::class_id()), vec![0, 1]);

    rename(&storage, Friday1::class_id(), Friday2::class_id());
    {
        let friday = load::<Friday2>(&domain);
        assert_eq!(friday.borrow().a, 123.0);
        friday.borrow_mut().a = 42.42;
        domain.save_root(&friday);
    }

    rename(&storage, Friday2::class_id(), Friday3::class_id());
    {
        let friday = load::<Friday3>(&domain);
        assert_eq!(friday.borrow().a, 42.42);
        assert_eq!(friday.borrow().hoopa.x, "");
    }
}

#[test]
fn test_decrease_version() {
    let (storage, domain) = setup();
    {
        let friday = domain.create_with_id(FRIDAY, |_| Friday3::default());
        friday.borrow_mut().hoopa.x = "hello".to_string();
        friday.borrow_mut().a = 123.123;
        domain.save_root(&friday);
    }
    assert!(storage.classes(FRIDAY).contains(&Hoopa::class_id()));

    // A class removed from the chain leaves no layer behind
    rename(&storage, Friday3::class_id(), Friday2::class_id());
    assert!(storage.remove_class(FRIDAY, Hoopa::class_id()));
    {
        let friday = load::<Friday2>(&domain);
        assert_eq!(friday.borrow().a, 123.123);
        domain.save_root(&friday);
    }

    rename(&storage, Friday2::class_id(), Friday1::class_id());
    {
        let friday = load::<Friday1>(&domain);
        assert_eq!(friday.borrow().a, 123);
        assert_eq!(friday.borrow().b, 0);
        friday.borrow_mut().b = 23;
        domain.save_root(&friday);
    }

    rename(&storage, Friday1::class_id(), Friday0::class_id());
    load::<Friday0>(&domain);
}

#[test]
fn test_save_writes_every_version() {
    let (storage, domain) = setup();
    let friday = domain.create_with_id(FRIDAY, |_| Friday3 {
        a: 7.5,
        ..Friday3::default()
    });
    domain.save_root(&friday);

    assert_eq!(storage.versions(FRIDAY, Friday3::class_id()), vec![0, 1, 2, 3]);
    assert_eq!(storage.versions(FRIDAY, Hoopa::class_id()), vec![0]);
    assert_eq!(storage.versions(FRIDAY, ClassId::root()), vec![0]);
}
