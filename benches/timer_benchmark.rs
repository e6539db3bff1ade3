/*!
 * Timer Benchmarks
 *
 * Measures the bookkeeping cost of entering and exiting scopes.
 */

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use timerutil::{clock, scoped, TimerError, Waiter};

/// Benchmark: Raw clock reads
fn bench_get_time(c: &mut Criterion) {
    c.bench_function("clock/get_time", |b| b.iter(|| black_box(clock::get_time())));
}

/// Benchmark: Zero-floor waiter scopes (no padding)
fn bench_waiter_scope(c: &mut Criterion) {
    let mut group = c.benchmark_group("waiter/scope");

    let mut plain = Waiter::new(0.0);
    group.bench_function("plain", |b| b.iter(|| plain.time(|| black_box(42))));

    let mut stopwatch = Waiter::stopwatch();
    group.bench_function("stopwatch", |b| b.iter(|| stopwatch.time(|| black_box(42))));

    let mut observed = Waiter::observable(0.0);
    group.bench_function("scoped_run", |b| {
        b.iter(|| {
            let result: Result<Option<i32>, TimerError> =
                scoped::run(&mut observed, |_| Ok(black_box(42)));
            black_box(result)
        })
    });

    group.finish();
}

/// Benchmark: Arm and disarm a deadline around a trivial block
#[cfg(unix)]
fn bench_deadline_scope(c: &mut Criterion) {
    let mut manager = timerutil::TimeoutManager::new(30);

    c.bench_function("deadline/scope", |b| {
        b.iter(|| {
            let result: Result<Option<i32>, TimerError> = manager.run(|_| Ok(black_box(42)));
            black_box(result)
        })
    });
}

#[cfg(not(unix))]
fn bench_deadline_scope(_c: &mut Criterion) {}

criterion_group!(benches, bench_get_time, bench_waiter_scope, bench_deadline_scope);
criterion_main!(benches);
