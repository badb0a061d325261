use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tickgraph_core::config::SchedulerConfig;
use tickgraph_core::event::OneShotEvent;
use tickgraph_core::scheduler::Scheduler;
use tickgraph_common::Phase;

/// Build a scheduler with `n` independent Tick-phase Scheduleables, each
/// scheduled once per tick, and return it finalized alongside the events
/// (which must stay alive for the whole run).
fn build_fanout(n: usize) -> (Scheduler, Vec<OneShotEvent>) {
    let mut scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
    let clock = scheduler.root_clock().clone();
    let vertices: Vec<_> = (0..n).map(|i| scheduler.new_vertex(format!("v{i}")).unwrap()).collect();
    scheduler.finalize().unwrap();

    let events: Vec<_> = vertices
        .into_iter()
        .map(|v| OneShotEvent::new("fanout", clock.clone(), Phase::Tick, 0, v, || Ok(())))
        .collect();
    (scheduler, events)
}

fn bench_tick_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("TickDrain");

    // 100 Scheduleables approximates a small pipeline stage, 10k a
    // whole-core-sized model.
    let sizes = [100usize, 10_000];

    for n in sizes.iter() {
        group.bench_with_input(BenchmarkId::new("FanoutPerTick", n), n, |b, &n| {
            b.iter_batched(
                || build_fanout(n),
                |(mut scheduler, events)| {
                    for ev in &events {
                        ev.schedule(&mut scheduler, Some(0)).unwrap();
                    }
                    black_box(scheduler.run(1).unwrap());
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_tick_drain);
criterion_main!(benches);
