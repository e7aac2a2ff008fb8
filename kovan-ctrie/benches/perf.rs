//! Benchmark: kovan-ctrie performance
//!
//! Point operations, concurrent workloads and the cost of snapshots.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use kovan_ctrie::TrieMap;
use rand::seq::SliceRandom;
use rand::{SeedableRng, rngs::StdRng};
use std::sync::Arc;
use std::thread;

// Number of operations per benchmark
const SMALL_OPS: usize = 1_000;
const MEDIUM_OPS: usize = 10_000;
const LARGE_OPS: usize = 100_000;

// Thread counts to test
const THREAD_COUNTS: &[usize] = &[1, 2, 4, 8];

fn filled(size: usize) -> TrieMap<usize, usize> {
    let map = TrieMap::new();
    for i in 0..size {
        map.insert(i, i * 2);
    }
    map
}

/// Benchmark: Single-threaded insert operations
fn bench_single_thread_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread_insert");

    for &size in &[SMALL_OPS, MEDIUM_OPS, LARGE_OPS] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("kovan-ctrie", size), &size, |b, &size| {
            b.iter(|| {
                let map = TrieMap::new();
                for i in 0..size {
                    map.insert(black_box(i), black_box(i * 2));
                }
                map
            });
        });
    }

    group.finish();
}

/// Benchmark: Single-threaded lookups in random order
fn bench_single_thread_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread_lookup");

    for &size in &[SMALL_OPS, MEDIUM_OPS, LARGE_OPS] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("kovan-ctrie", size), &size, |b, &size| {
            let map = filled(size);
            let mut order: Vec<usize> = (0..size).collect();
            order.shuffle(&mut StdRng::seed_from_u64(0x5eed));
            b.iter(|| {
                let mut sum = 0;
                for &i in &order {
                    if let Some(v) = map.lookup(&black_box(i)) {
                        sum += v;
                    }
                }
                sum
            });
        });
    }

    group.finish();
}

/// Benchmark: Insert then remove every key
fn bench_single_thread_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread_remove");

    for &size in &[SMALL_OPS, MEDIUM_OPS] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("kovan-ctrie", size), &size, |b, &size| {
            b.iter(|| {
                let map = filled(size);
                for i in 0..size {
                    map.remove(&black_box(i));
                }
                map
            });
        });
    }

    group.finish();
}

/// Benchmark: Concurrent insert operations
fn bench_concurrent_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_insert");
    group.sample_size(20);

    for &threads in THREAD_COUNTS {
        let ops_per_thread = MEDIUM_OPS / threads;
        let total_ops = ops_per_thread * threads;
        group.throughput(Throughput::Elements(total_ops as u64));

        group.bench_with_input(
            BenchmarkId::new("kovan-ctrie", threads),
            &(threads, ops_per_thread),
            |b, &(threads, ops)| {
                b.iter(|| {
                    let map = Arc::new(TrieMap::new());
                    let handles: Vec<_> = (0..threads)
                        .map(|tid| {
                            let map = Arc::clone(&map);
                            thread::spawn(move || {
                                for i in 0..ops {
                                    let key = tid * ops + i;
                                    map.insert(black_box(key), black_box(key * 2));
                                }
                            })
                        })
                        .collect();
                    for h in handles {
                        h.join().unwrap();
                    }
                    map
                });
            },
        );
    }

    group.finish();
}

/// Benchmark: Mixed read-write workload (90% reads, 10% writes)
fn bench_mixed_workload(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_90read_10write");
    group.sample_size(20);

    for &threads in THREAD_COUNTS {
        let ops_per_thread = MEDIUM_OPS / threads;
        let total_ops = ops_per_thread * threads;
        group.throughput(Throughput::Elements(total_ops as u64));

        group.bench_with_input(
            BenchmarkId::new("kovan-ctrie", threads),
            &(threads, ops_per_thread),
            |b, &(threads, ops)| {
                let map = Arc::new(filled(total_ops));
                b.iter(|| {
                    let handles: Vec<_> = (0..threads)
                        .map(|tid| {
                            let map = Arc::clone(&map);
                            thread::spawn(move || {
                                let mut sum: usize = 0;
                                for i in 0..ops {
                                    if i % 10 == 0 {
                                        let key = tid * ops + i;
                                        map.insert(black_box(key), black_box(key));
                                    } else if let Some(v) = map.lookup(&black_box(i)) {
                                        sum += v;
                                    }
                                }
                                sum
                            })
                        })
                        .collect();
                    let sum: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
                    sum
                });
            },
        );
    }

    group.finish();
}

/// Benchmark: Snapshot creation, and the first writes that pay for it
fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for &size in &[SMALL_OPS, MEDIUM_OPS, LARGE_OPS] {
        let map = filled(size);

        group.bench_with_input(BenchmarkId::new("read_only", size), &size, |b, _| {
            b.iter(|| black_box(map.read_only_snapshot()));
        });

        group.bench_with_input(BenchmarkId::new("write_after", size), &size, |b, &size| {
            b.iter(|| {
                let snap = map.snapshot();
                for i in (0..size).step_by(size / 100) {
                    snap.insert(black_box(i), black_box(0));
                }
                snap
            });
        });
    }

    group.finish();
}

/// Benchmark: Full iteration over a snapshot
fn bench_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("iteration");

    for &size in &[MEDIUM_OPS, LARGE_OPS] {
        group.throughput(Throughput::Elements(size as u64));
        let map = filled(size);

        group.bench_with_input(BenchmarkId::new("kovan-ctrie", size), &size, |b, _| {
            b.iter(|| map.iter().map(|(_, v)| v).sum::<usize>());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_single_thread_insert,
    bench_single_thread_lookup,
    bench_single_thread_remove,
    bench_concurrent_insert,
    bench_mixed_workload,
    bench_snapshot,
    bench_iteration,
);

criterion_main!(benches);
