use criterion::{criterion_group, criterion_main, Criterion};
use tpc_core::types::{MemoryDimensions, SpaceTag};
use tpc_mem::{MemoryObjectAllocator, MemorySpace};

/// Layer-shaped churn: every step allocates a few odd-sized tiles, retires
/// the previous step's tiles, and sweeps. Sizes are chosen so the free pool
/// fragments and the non-contiguous path is exercised.
fn churn(layers: usize, capacity: usize) -> usize {
    let mut local = MemorySpace::heap(SpaceTag::Local, capacity);
    let mut objs = MemoryObjectAllocator::new();
    let mut freed = 0;
    for layer in 0..layers {
        let next = format!("l{}", layer + 1);
        for tile in 0..4 {
            let vectors = 1 + (layer * 7 + tile * 3) % 13;
            objs.allocate_object(
                &mut local,
                &format!("t{layer}.{tile}"),
                MemoryDimensions::full(vectors, 8),
                &[next.as_str()],
            )
            .unwrap();
        }
        objs.consume_all_objects(&[format!("l{layer}").as_str()]);
        freed += objs.free_consumed_objects(&mut [&mut local]).unwrap();
    }
    freed
}

fn bench_allocation_churn(c: &mut Criterion) {
    c.bench_function("local_churn_1k_layers", |b| {
        b.iter(|| churn(1_000, 128));
    });
}

criterion_group!(allocation, bench_allocation_churn);
criterion_main!(allocation);
