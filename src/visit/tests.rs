use super::*;
use crate::obj::{Class, ClassId, ObjId};
use crate::ptr::Managed;
use crate::version::{Direction, MigrationTable};
use std::collections::{BTreeMap, VecDeque};

/// Records what a visit hands to the node visitor
struct Recorder {
    mode: VisitMode,
    log: Vec<String>,
    /// Length answered in load mode
    stored_len: Option<usize>,
}

impl Recorder {
    fn new(mode: VisitMode) -> Self {
        Self {
            mode,
            log: Vec::new(),
            stored_len: None,
        }
    }

    fn run(mode: VisitMode, target: &mut dyn Managed) -> Vec<String> {
        let mut recorder = Self::new(mode);
        target.visit(&mut Dnv::new(&mut recorder));
        recorder.log
    }
}

impl NodeVisitor for Recorder {
    fn mode(&self) -> VisitMode {
        self.mode
    }

    fn value(&mut self, value: &mut dyn Value) {
        let mut bytes = Vec::new();
        value.encode(&mut bytes).unwrap();
        self.log.push(format!("value:{}", bytes.len()));
    }

    fn len(&mut self, len: usize) -> Option<usize> {
        self.log.push(format!("len:{}", len));
        match self.mode {
            VisitMode::Load => self.stored_len,
            _ => Some(len),
        }
    }

    fn ptr(&mut self, ptr: &mut dyn ErasedPtr) {
        self.log.push(format!("ptr:{}", ptr.identity().id));
    }

    fn view(&mut self, view: &mut dyn ErasedView) {
        self.log.push(format!("view:{}", view.identity().id));
    }

    fn base(&mut self, base: &mut dyn Object) {
        self.log.push(format!("base:{}", base.class_name()));
        base.as_managed_mut().visit(&mut Dnv::new(self));
    }

    fn nested(&mut self, nested: &mut dyn Managed) {
        self.log.push("nested".to_string());
        nested.visit(&mut Dnv::new(self));
    }
}

#[derive(Default)]
struct Point {
    x: i32,
    y: i32,
}

impl Managed for Point {
    fn visit(&mut self, dnv: &mut Dnv<'_>) {
        dnv.visit(&mut self.x).visit(&mut self.y);
    }
}

#[derive(Default)]
struct Shape {
    name: String,
    origin: Point,
    corners: Vec<u16>,
    tags: BTreeMap<u8, u64>,
    queue: VecDeque<bool>,
    label: Option<u8>,
    link: Ptr<Shape>,
}

impl Managed for Shape {
    fn visit(&mut self, dnv: &mut Dnv<'_>) {
        dnv.visit(&mut self.name)
            .nested(&mut self.origin)
            .visit(&mut self.corners)
            .visit(&mut self.tags)
            .visit(&mut self.queue)
            .visit(&mut self.label)
            .visit(&mut self.link);
    }
}

fn shape() -> Shape {
    Shape {
        name: "tri".to_string(),
        corners: vec![1, 2, 3],
        tags: BTreeMap::from([(1, 10), (2, 20)]),
        queue: VecDeque::from([true]),
        label: Some(4),
        link: Ptr::unloaded(ObjId::new(9)),
        ..Shape::default()
    }
}

#[test]
fn test_save_order() {
    let log = Recorder::run(VisitMode::Save, &mut shape());
    let expected = [
        "value:11", // String: u64 length + 3 bytes
        "nested",
        "value:4",
        "value:4",
        "len:3",
        "value:2",
        "value:2",
        "value:2",
        "len:2",
        "value:1",
        "value:8",
        "value:1",
        "value:8",
        "len:1",
        "value:1",
        "len:1",
        "value:1",
        "ptr:00000009",
    ];
    assert_eq!(log, expected);
}

#[test]
fn test_walk_skips_map_keys() {
    let log = Recorder::run(VisitMode::Walk, &mut shape());
    let tags: Vec<_> = log.iter().skip_while(|e| *e != "len:3").skip(4).take(2).collect();
    assert_eq!(tags, ["value:8", "value:8"]);
    assert!(!log.contains(&"len:2".to_string()));
}

#[test]
fn test_load_without_length_leaves_containers() {
    let mut target = shape();
    let mut recorder = Recorder::new(VisitMode::Load);
    target.visit(&mut Dnv::new(&mut recorder));

    assert_eq!(target.corners, vec![1, 2, 3]);
    assert_eq!(target.tags.len(), 2);
    assert_eq!(target.label, Some(4));
}

#[test]
fn test_load_resizes_containers() {
    let mut target = shape();
    let mut recorder = Recorder::new(VisitMode::Load);
    recorder.stored_len = Some(0);
    target.visit(&mut Dnv::new(&mut recorder));

    assert!(target.corners.is_empty());
    assert!(target.tags.is_empty());
    assert!(target.queue.is_empty());
    assert_eq!(target.label, None);
}

#[derive(Default)]
struct Base {
    level: u8,
}

impl Class for Base {
    const NAME: &'static str = "visit::Base";

    fn visit(&mut self, dnv: &mut Dnv<'_>) {
        dnv.visit(&mut self.level);
    }
}

#[derive(Default)]
struct Derived {
    base: Base,
    extra: u32,
}

impl Class for Derived {
    const NAME: &'static str = "visit::Derived";
    const BASE: &'static str = "visit::Base";

    fn visit(&mut self, dnv: &mut Dnv<'_>) {
        dnv.base(&mut self.base).visit(&mut self.extra);
    }
}

#[test]
fn test_base_layer_is_announced() {
    let log = Recorder::run(VisitMode::Save, &mut Derived::default());
    assert_eq!(log, ["base:visit::Base", "value:1", "value:4"]);
    assert_eq!(Derived::base_id(), ClassId::of("visit::Base"));
}

#[derive(Default)]
struct Versioned {
    seen: Vec<u8>,
}

impl Versioned {
    fn load_v0(&mut self, _: &mut Dnv<'_>) {
        self.seen.push(0);
    }

    fn load_v1(&mut self, _: &mut Dnv<'_>) {
        self.seen.push(1);
    }

    fn save_v0(&mut self, _: &mut Dnv<'_>) {
        self.seen.push(10);
    }

    fn save_v1(&mut self, _: &mut Dnv<'_>) {
        self.seen.push(11);
    }
}

impl Class for Versioned {
    const NAME: &'static str = "visit::Versioned";
    const MIGRATIONS: MigrationTable<Self> = MigrationTable::new(
        &[(0, Self::load_v0), (1, Self::load_v1)],
        &[(0, Self::save_v0), (1, Self::save_v1)],
    );
}

#[test]
fn test_policy_applicability() {
    let mut plain = Point::default();
    let mut versioned = Versioned::default();

    assert!(VisitPolicy::Explicit.applies(&plain));
    assert!(!VisitPolicy::VersionedSave.applies(&plain));
    assert!(!VisitPolicy::Explicit.applies(&versioned));
    assert!(VisitPolicy::VersionedLoad.applies(&versioned));
    assert!(VisitPolicy::RELEASE.applies(&plain));
    assert!(VisitPolicy::RELEASE.applies(&versioned));

    let mut recorder = Recorder::new(VisitMode::Walk);
    assert!(VisitPolicy::RELEASE.apply(&mut versioned, &mut Dnv::new(&mut recorder)));
    assert_eq!(versioned.seen, vec![11, 10]);

    assert!(VisitPolicy::VersionedLoad.apply(&mut versioned, &mut Dnv::new(&mut recorder)));
    assert_eq!(versioned.seen, vec![11, 10, 0, 1]);

    assert!(!VisitPolicy::VersionedLoad.apply(&mut plain, &mut Dnv::new(&mut recorder)));
    assert!(versioned.has_versions(Direction::Save));
}

#[test]
fn test_cycle_guard_keys_on_type_and_address() {
    let mut derived = Derived::default();
    let mut guard = CycleGuard::new();

    assert!(guard.enter(&derived));
    assert!(!guard.enter(&derived));
    // Embedded layers are tracked on their own
    assert!(guard.enter(&derived.base));
    assert!(guard.contains(&derived.base));
    assert_eq!(guard.len(), 2);

    guard.clear();
    assert!(guard.is_empty());
    derived.extra = 1;
    assert!(guard.enter(&derived));
}

#[derive(Default)]
struct Holder {
    base: Base,
    child: Ptr<Point>,
}

#[derive(Default)]
struct Parent {
    holder: Holder,
    children: Vec<Ptr<Point>>,
}

impl Class for Holder {
    const NAME: &'static str = "visit::Holder";

    fn visit(&mut self, dnv: &mut Dnv<'_>) {
        dnv.base(&mut self.base).visit(&mut self.child);
    }
}

impl Class for Parent {
    const NAME: &'static str = "visit::Parent";
    const BASE: &'static str = "visit::Holder";

    fn visit(&mut self, dnv: &mut Dnv<'_>) {
        dnv.base(&mut self.holder).visit(&mut self.children);
    }
}

#[test]
fn test_walk_enters_base_layers() {
    let mut parent = Parent {
        holder: Holder {
            child: Ptr::new(Point::default()),
            ..Holder::default()
        },
        children: vec![Ptr::new(Point::default()), Ptr::null()],
    };

    let mut edges = 0;
    walk(&mut parent, VisitPolicy::Explicit, |edge| {
        assert!(edge.is::<Point>());
        assert!(edge.parent_key().is_none());
        edges += 1;
        true
    });
    // Null handles are not edges
    assert_eq!(edges, 2);
}
