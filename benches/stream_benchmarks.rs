use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use parastream::prelude::*;
use parastream::sort::parallel_merge_sort;
use std::hint::black_box;

fn random_vec(len: usize) -> Vec<u64> {
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        })
        .collect()
}

fn bench_sorted(c: &mut Criterion) {
    let mut group = c.benchmark_group("sorted");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    for size in [1_000, 100_000].iter() {
        let items = random_vec(*size);
        group.throughput(Throughput::Elements(*size as u64));

        for parallelism in [1, 4] {
            group.bench_with_input(
                BenchmarkId::new(format!("degree_{parallelism}"), size),
                &items,
                |b, items| {
                    b.iter(|| {
                        runtime.block_on(async {
                            of(items.clone())
                                .parallel(parallelism)
                                .sorted()
                                .to_vec()
                                .await
                                .unwrap()
                        })
                    });
                },
            );
        }

        group.bench_with_input(BenchmarkId::new("merge_sort_only", size), &items, |b, items| {
            b.iter(|| {
                let mut items = items.clone();
                parallel_merge_sort(&mut items, &|a: &u64, b: &u64| a.cmp(b), 4, 4096);
                black_box(items)
            });
        });
    }

    group.finish();
}

fn bench_reduce(c: &mut Criterion) {
    let mut group = c.benchmark_group("reduce");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    for size in [10_000i64, 1_000_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));

        for parallelism in [1, 4] {
            group.bench_with_input(
                BenchmarkId::new(format!("degree_{parallelism}"), size),
                size,
                |b, &size| {
                    b.iter(|| {
                        runtime.block_on(async {
                            range(0, size)
                                .parallel(parallelism)
                                .map(|x| black_box(x * 2))
                                .reduce(0, |a, b| a + b)
                                .await
                                .unwrap()
                        })
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_match(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("any_match_late_hit", |b| {
        b.iter(|| {
            runtime.block_on(async {
                range(0, 100_000)
                    .parallel(4)
                    .any_match(|x| *x == black_box(99_999))
                    .await
                    .unwrap()
            })
        });
    });
}

criterion_group!(benches, bench_sorted, bench_reduce, bench_match);
criterion_main!(benches);
