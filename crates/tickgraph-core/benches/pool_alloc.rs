use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tickgraph_core::pool::ArenaPool;

fn bench_pool_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("ArenaPool");

    // 1k for a small per-cycle object population, 64k for a busy ROB-sized
    // model component.
    let sizes = [1_000usize, 64_000];

    for n in sizes.iter() {
        // --- 1. ALLOCATE FROM EMPTY ---
        // The steady-state cost of constructing a fresh instruction record.
        group.bench_with_input(BenchmarkId::new("Allocate/Fresh", n), n, |b, &n| {
            b.iter_batched(
                || ArenaPool::<u64>::construct(n, n).unwrap(),
                |pool| {
                    for i in 0..n {
                        black_box(pool.allocate(i as u64).unwrap());
                    }
                },
                BatchSize::SmallInput,
            )
        });

        // --- 2. RECYCLE ---
        // Allocate, drop, and reallocate repeatedly: the common per-cycle
        // pattern for short-lived simulation objects.
        group.bench_with_input(BenchmarkId::new("Allocate/Recycle", n), n, |b, &n| {
            let pool: ArenaPool<u64> = ArenaPool::construct(n, n).unwrap();
            b.iter(|| {
                for i in 0..n {
                    let handle = pool.allocate(black_box(i as u64)).unwrap();
                    drop(handle);
                }
            });
        });

        // --- 3. WEAK UPGRADE ---
        // `lock()` is on the hot path of any model that holds weak handles
        // into the pool across phase boundaries.
        group.bench_with_input(BenchmarkId::new("WeakLock", n), n, |b, &n| {
            let pool: ArenaPool<u64> = ArenaPool::construct(n, n).unwrap();
            let handles: Vec<_> = (0..n).map(|i| pool.allocate(i as u64).unwrap()).collect();
            let weaks: Vec<_> = handles.iter().map(|h| h.downgrade()).collect();
            b.iter(|| {
                for w in &weaks {
                    black_box(w.lock());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pool_operations);
criterion_main!(benches);
