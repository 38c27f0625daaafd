//! Traversal throughput benchmark.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use scene_graph::{Scene, VisitResult, Visitor};
use scene_types::NodeId;

struct CountingVisitor {
    count: usize,
}

impl Visitor for CountingVisitor {
    fn top_down(&mut self, _scene: &mut Scene, _node: NodeId) -> VisitResult {
        self.count += 1;
        VisitResult::Continue
    }
}

fn build_tree(depth: usize, fanout: usize) -> Scene {
    let mut scene = Scene::new();
    let mut frontier = vec![scene.root()];
    for level in 0..depth {
        let mut next = Vec::new();
        for &parent in &frontier {
            for i in 0..fanout {
                if let Ok(child) = scene.add_child(parent, format!("n{level}_{i}")) {
                    next.push(child);
                }
            }
        }
        frontier = next;
    }
    scene
}

fn bench_traversal(c: &mut Criterion) {
    let mut group = c.benchmark_group("traversal");
    for &(depth, fanout) in &[(6, 2), (3, 8)] {
        let mut scene = build_tree(depth, fanout);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("depth{depth}_fanout{fanout}")),
            &(),
            |b, ()| {
                b.iter(|| {
                    let mut visitor = CountingVisitor { count: 0 };
                    let report = scene.execute(&mut visitor);
                    criterion::black_box(report.top_down_visits)
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_traversal);
criterion_main!(benches);
