//! Basic benchmarks for the `lease_array` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::iter;
use std::time::Instant;

use alloc_tracker::Allocator;
use criterion::{Criterion, criterion_group, criterion_main};
use lease_array::{AssignPolicy, DynArray};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

type TestItem = usize;
const TEST_VALUE: TestItem = 1024;
const BATCH_LEN: usize = 1000;

fn entrypoint(c: &mut Criterion) {
    let allocs = alloc_tracker::Session::new();

    let mut group = c.benchmark_group("la_basic");

    let allocs_op = allocs.operation("new_empty");
    group.bench_function("new_empty", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                drop(black_box(DynArray::<TestItem>::new()));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("push_one");
    group.bench_function("push_one", |b| {
        b.iter_custom(|iters| {
            let mut arrays = iter::repeat_with(DynArray::<TestItem>::new)
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for array in &mut arrays {
                array.push(black_box(TEST_VALUE));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("push_1000");
    group.bench_function("push_1000", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let mut array = DynArray::<TestItem>::new();

                for _ in 0..BATCH_LEN {
                    array.push(black_box(TEST_VALUE));
                }

                drop(black_box(array));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("push_1000_reserved");
    group.bench_function("push_1000_reserved", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let mut array = DynArray::<TestItem>::builder().capacity(BATCH_LEN).build();

                for _ in 0..BATCH_LEN {
                    array.push(black_box(TEST_VALUE));
                }

                drop(black_box(array));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("iterate_1000");
    group.bench_function("iterate_1000", |b| {
        b.iter_custom(|iters| {
            let array = DynArray::from_elem(BATCH_LEN, TEST_VALUE);

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                _ = black_box(array.iter().sum::<TestItem>());
            }

            start.elapsed()
        });
    });

    for (name, policy) in [
        ("assign_reuse_storage", AssignPolicy::ReuseStorage),
        ("assign_allocate_and_swap", AssignPolicy::AllocateAndSwap),
    ] {
        let allocs_op = allocs.operation(name);
        group.bench_function(name, |b| {
            b.iter_custom(|iters| {
                let source = DynArray::from_elem(BATCH_LEN, "source".to_string());

                let mut target = DynArray::<String>::builder().assign_policy(policy).build();
                target.resize(BATCH_LEN, "target".to_string());

                let _span = allocs_op.measure_thread().iterations(iters);

                let start = Instant::now();

                for _ in 0..iters {
                    target.assign_from(black_box(&source));
                }

                start.elapsed()
            });
        });
    }

    group.finish();

    allocs.print_to_stdout();
}
