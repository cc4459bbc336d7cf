//! Graph walks over strong references

use domain_runtime::visit::walk;
use domain_runtime::{Class, Dnv, Managed, MigrationTable, Ptr, VisitPolicy};

#[derive(Default)]
struct F1 {
    f2: Ptr<F2>,
}

impl Managed for F1 {
    fn visit(&mut self, dnv: &mut Dnv<'_>) {
        dnv.visit(&mut self.f2);
    }
}

#[derive(Default)]
struct F2 {
    f1: Ptr<F1>,
}

impl Managed for F2 {
    fn visit(&mut self, dnv: &mut Dnv<'_>) {
        dnv.visit(&mut self.f1);
    }
}

#[derive(Default)]
struct F3 {
    f1s: Vec<Ptr<F1>>,
}

impl Managed for F3 {
    fn visit(&mut self, dnv: &mut Dnv<'_>) {
        dnv.visit(&mut self.f1s);
    }
}

/// Children are only reachable through versioned save handlers
#[derive(Default)]
struct F4 {
    f1: Ptr<F1>,
    f2: Ptr<F2>,
    f3: Ptr<F3>,
}

impl F4 {
    fn save_v1(&mut self, dnv: &mut Dnv<'_>) {
        dnv.visit(&mut self.f1);
    }

    fn save_v2(&mut self, dnv: &mut Dnv<'_>) {
        dnv.visit(&mut self.f2);
    }

    fn save_v3(&mut self, dnv: &mut Dnv<'_>) {
        dnv.visit(&mut self.f3);
    }
}

impl Class for F4 {
    const NAME: &'static str = "tree::F4";
    const VERSION: u8 = 3;
    const MIGRATIONS: MigrationTable<Self> =
        MigrationTable::new(&[], &[(1, Self::save_v1), (2, Self::save_v2), (3, Self::save_v3)]);
}

fn pair() -> (Ptr<F1>, Ptr<F2>) {
    let f1 = Ptr::new(F1::default());
    let f2 = Ptr::new(F2 { f1: f1.clone() });
    f1.borrow_mut().f2 = f2.clone();
    (f1, f2)
}

#[derive(Debug, Default, PartialEq)]
struct Counts {
    f1: u32,
    f2: u32,
    f3: u32,
    f4: u32,
}

fn count(root: &mut dyn Managed, policy: VisitPolicy) -> Counts {
    let mut counts = Counts::default();
    walk(root, policy, |edge| {
        if edge.is::<F1>() {
            counts.f1 += 1;
        } else if edge.is::<F2>() {
            counts.f2 += 1;
        } else if edge.is::<F3>() {
            counts.f3 += 1;
        } else if edge.is::<F4>() {
            counts.f4 += 1;
        }
        true
    });
    counts
}

#[test]
fn test_cycle_is_entered_once() {
    let (f1, _f2) = pair();
    let mut met = 0;
    let entered = f1.walk(VisitPolicy::Explicit, |_| {
        met += 1;
        true
    });
    assert!(entered);
    // f1 -> f2 -> f1, where f1 is not entered again
    assert_eq!(met, 2);
}

#[test]
fn test_cycles_in_container() {
    let pairs: Vec<_> = (0..3).map(|_| pair()).collect();
    let mut f3 = F3 {
        f1s: pairs.iter().map(|(f1, _)| f1.clone()).collect(),
    };

    let counts = count(&mut f3, VisitPolicy::Explicit);
    assert_eq!(counts, Counts { f1: 6, f2: 3, ..Counts::default() });
}

#[test]
fn test_multiplex_reaches_versioned_children() {
    let f21 = Ptr::new(F1::default());
    let f12 = Ptr::new(F2 { f1: f21.clone() });
    let f1 = Ptr::new(F1 { f2: f12.clone() });
    let f2 = Ptr::new(F2 { f1: f21.clone() });
    let f01 = Ptr::new(F1 { f2: f12.clone() });
    let f3 = Ptr::new(F3 { f1s: vec![f01] });

    let mut f4 = F4 { f1, f2, f3 };

    // Explicit alone cannot enter a payload that only has versions
    assert_eq!(count(&mut f4, VisitPolicy::Explicit), Counts::default());

    let counts = count(&mut f4, VisitPolicy::RELEASE);
    assert_eq!(counts, Counts { f1: 4, f2: 3, f3: 1, f4: 0 });
}

#[test]
fn test_pruned_edges_are_not_entered() {
    let pairs: Vec<_> = (0..3).map(|_| pair()).collect();
    let mut f3 = F3 {
        f1s: pairs.iter().map(|(f1, _)| f1.clone()).collect(),
    };

    let mut met = 0;
    walk(&mut f3, VisitPolicy::Explicit, |edge| {
        met += 1;
        !edge.is::<F1>()
    });
    assert_eq!(met, 3);
}
