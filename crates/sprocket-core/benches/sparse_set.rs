//! Benchmarks for the generational SparseSet

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use sprocket_core::alloc::{
    HashMap,
    sparse_set::{IndexSlot, SparseSet},
};

#[derive(Clone, Copy, Debug, Default)]
struct GraphicState {
    position: [f32; 2],
    size: [f32; 2],
    color: [f32; 3],
    z_index: i32,
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("sparse_set_insert");

    for size in [100, 1000, 10000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let mut set = SparseSet::new();
                for _ in 0..size {
                    set.push(black_box(GraphicState::default()));
                }
                set
            });
        });
    }

    group.finish();
}

fn bench_access_vs_hashmap(c: &mut Criterion) {
    let mut group = c.benchmark_group("sparse_set_vs_hashmap");
    let size = 10000;

    let mut set = SparseSet::new();
    let slots: Vec<IndexSlot> = (0..size).map(|_| set.push(GraphicState::default())).collect();
    group.bench_function("sparse_set", |b| {
        b.iter(|| {
            let mut sum = 0;
            for &slot in &slots {
                sum += set.get(black_box(slot)).z_index;
            }
            black_box(sum)
        });
    });

    let map: HashMap<u32, GraphicState> = (0..size).map(|i| (i, GraphicState::default())).collect();
    group.bench_function("hashmap", |b| {
        b.iter(|| {
            let mut sum = 0;
            for key in 0..size {
                sum += map[&black_box(key)].z_index;
            }
            black_box(sum)
        });
    });

    group.finish();
}

fn bench_reuse_slots(c: &mut Criterion) {
    c.bench_function("sparse_set_reuse_slots", |b| {
        b.iter(|| {
            let mut set = SparseSet::new();
            let slots: Vec<IndexSlot> = (0..1000).map(|_| set.push(GraphicState::default())).collect();
            for &slot in slots.iter().step_by(2) {
                set.remove(slot);
            }
            for _ in 0..500 {
                set.push(black_box(GraphicState::default()));
            }
            set
        });
    });
}

criterion_group!(benches, bench_insert, bench_access_vs_hashmap, bench_reuse_slots);
criterion_main!(benches);
