use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use sequenced::{
    MemoryStore, Registry, RowId, SequenceSpec, Sequencer, SequencerConfig, StrategyKind,
    define_entity,
};
use std::{
    sync::{Arc, Barrier},
    thread::scope,
    time::Instant,
};

#[derive(Default)]
struct Ticket {
    id: Option<RowId>,
    project_id: Option<i64>,
    sequential_id: Option<i64>,
}

define_entity! {
    Ticket {
        table: "tickets",
        id: id,
        attributes: [project_id],
        sequences: [sequential_id],
    }
}

// Number of records created per benchmark iteration (split across threads for
// contended runs).
const TOTAL_RECORDS: usize = 256;

fn sequencer(kind: StrategyKind) -> Sequencer<MemoryStore> {
    let mut registry = Registry::builder();
    registry
        .register(SequenceSpec::<Ticket>::new().scope(["project_id"]))
        .expect("valid spec");
    Sequencer::new(
        MemoryStore::new(),
        registry.build(),
        SequencerConfig::default().with_strategy(kind),
    )
}

fn ticket(project_id: i64) -> Ticket {
    Ticket {
        project_id: Some(project_id),
        ..Ticket::default()
    }
}

/// Benchmarks back-to-back creates in a single scope.
fn bench_sequential(c: &mut Criterion, group_name: &str, kind: StrategyKind) {
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_RECORDS as u64));

    group.bench_function(format!("elems/{}", TOTAL_RECORDS), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                let sequencer = sequencer(kind);
                for _ in 0..TOTAL_RECORDS {
                    black_box(sequencer.create(&mut ticket(1)).expect("create"));
                }
            }

            start.elapsed()
        });
    });

    group.finish();
}

/// Benchmarks threads creating records concurrently, either all in one scope
/// or each in its own.
fn bench_contended(c: &mut Criterion, group_name: &str, kind: StrategyKind, shared_scope: bool) {
    let mut group = c.benchmark_group(group_name);

    for thread_count in [1, 2, 4, 8] {
        let records_per_thread = TOTAL_RECORDS / thread_count;

        group.throughput(Throughput::Elements(TOTAL_RECORDS as u64));
        group.bench_function(
            format!("elems/{}/threads/{}", TOTAL_RECORDS, thread_count),
            |b| {
                b.iter_custom(|iters| {
                    let start = Instant::now();

                    for _ in 0..iters {
                        let sequencer = Arc::new(sequencer(kind));
                        let barrier = Arc::new(Barrier::new(thread_count + 1));
                        scope(|s| {
                            for thread in 0..thread_count {
                                let sequencer = Arc::clone(&sequencer);
                                let barrier = Arc::clone(&barrier);
                                let project_id = if shared_scope { 0 } else { thread as i64 };
                                s.spawn(move || {
                                    barrier.wait();
                                    for _ in 0..records_per_thread {
                                        black_box(
                                            sequencer
                                                .create(&mut ticket(project_id))
                                                .expect("create"),
                                        );
                                    }
                                });
                            }
                            barrier.wait();
                        });
                    }

                    start.elapsed()
                });
            },
        );
    }

    group.finish();
}

fn benchmark_sequential_scan(c: &mut Criterion) {
    bench_sequential(c, "sequential/scan", StrategyKind::Scan);
}

fn benchmark_sequential_counter(c: &mut Criterion) {
    bench_sequential(c, "sequential/counter", StrategyKind::Counter);
}

fn benchmark_contended_scan(c: &mut Criterion) {
    bench_contended(c, "contended/shared-scope/scan", StrategyKind::Scan, true);
}

fn benchmark_contended_counter(c: &mut Criterion) {
    bench_contended(c, "contended/shared-scope/counter", StrategyKind::Counter, true);
}

fn benchmark_disjoint_scan(c: &mut Criterion) {
    bench_contended(c, "contended/scope-per-thread/scan", StrategyKind::Scan, false);
}

fn benchmark_disjoint_counter(c: &mut Criterion) {
    bench_contended(c, "contended/scope-per-thread/counter", StrategyKind::Counter, false);
}

criterion_group!(
    benches,
    benchmark_sequential_scan,
    benchmark_sequential_counter,
    // One scope: every create serializes on the same lock
    benchmark_contended_scan,
    benchmark_contended_counter,
    // Disjoint scopes never contend
    benchmark_disjoint_scan,
    benchmark_disjoint_counter,
);
criterion_main!(benches);
