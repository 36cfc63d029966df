use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use driftgc::{allocate, gc, register_root, unregister_root, Collectable, Finalize, Gc, Trace, Walker};

struct Tree {
    first: Option<Gc<Tree>>,
    second: Option<Gc<Tree>>,
}

unsafe impl Trace for Tree {
    fn trace(&mut self, walker: &mut dyn Walker) {
        self.first.trace(walker);
        self.second.trace(walker);
    }
}
unsafe impl Finalize for Tree {}
impl Collectable for Tree {}

impl Tree {
    fn item_check(&self) -> i32 {
        match (&self.first, &self.second) {
            (Some(first), Some(second)) => 1 + first.item_check() + second.item_check(),
            _ => 1,
        }
    }
}

fn bottom_up_tree(depth: i32) -> Gc<Tree> {
    if depth > 0 {
        let first = bottom_up_tree(depth - 1);
        let second = bottom_up_tree(depth - 1);
        allocate(Tree {
            first: Some(first),
            second: Some(second),
        })
    } else {
        allocate(Tree { first: None, second: None })
    }
}

pub fn bench_binary_trees(c: &mut Criterion) {
    let mut group = c.benchmark_group("binary trees");
    group.sample_size(10);
    let min_depth = 4;

    for max_depth in 12..16 {
        group.bench_function(BenchmarkId::new("driftgc", max_depth), |b| {
            b.iter(|| {
                let mut depth = min_depth;
                while depth < max_depth {
                    let iterations = 1 << (max_depth - depth + min_depth);
                    for _ in 0..iterations {
                        let mut tree = bottom_up_tree(depth);
                        register_root("tree", &mut tree);
                        tree.item_check();
                        unregister_root(&mut tree);
                    }
                    gc().expect("collection found a dangling root");
                    depth += 2;
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_binary_trees);
criterion_main!(benches);
