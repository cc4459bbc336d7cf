//! Release path benchmarks
//!
//! Measures dropping handles with and without the cycle analysis.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use domain_runtime::{Dnv, Managed, Ptr};

#[derive(Default)]
struct Node {
    children: Vec<Ptr<Node>>,
}

impl Managed for Node {
    fn visit(&mut self, dnv: &mut Dnv<'_>) {
        dnv.visit(&mut self.children);
    }
}

fn ring(len: usize) -> Ptr<Node> {
    let nodes: Vec<Ptr<Node>> = (0..len).map(|_| Ptr::new(Node::default())).collect();
    for i in 0..len {
        let next = nodes[(i + 1) % len].clone();
        nodes[i].borrow_mut().children.push(next);
    }
    nodes[0].clone()
}

fn tree(depth: usize, fanout: usize) -> Ptr<Node> {
    let root = Ptr::new(Node::default());
    if depth > 0 {
        for _ in 0..fanout {
            let child = tree(depth - 1, fanout);
            root.borrow_mut().children.push(child);
        }
    }
    root
}

fn bench_sole_owner(c: &mut Criterion) {
    c.bench_function("drop_sole_owner", |b| {
        b.iter(|| {
            let ptr = Ptr::new(Node::default());
            black_box(ptr.strong_count());
        });
    });
}

fn bench_shared_drop(c: &mut Criterion) {
    let mut group = c.benchmark_group("drop_shared");

    // Every drop walks the subgraph and finds the extra holder
    for depth in [1, 3, 5].iter() {
        group.bench_with_input(BenchmarkId::new("tree", depth), depth, |b, &depth| {
            let root = tree(depth, 3);
            b.iter(|| {
                let extra = root.clone();
                drop(black_box(extra));
            });
        });
    }

    group.finish();
}

fn bench_cycle_collection(c: &mut Criterion) {
    let mut group = c.benchmark_group("collect_ring");

    for len in [2, 16, 128].iter() {
        group.bench_with_input(BenchmarkId::new("ring", len), len, |b, &len| {
            b.iter_with_setup(|| ring(len), drop);
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sole_owner, bench_shared_drop, bench_cycle_collection);
criterion_main!(benches);
