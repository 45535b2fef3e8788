use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use bwlimit_limiter::BandwidthLimiter;
use bwlimit_types::LimiterKind;

fn bench_charge_non_blocking(c: &mut Criterion) {
    let mut group = c.benchmark_group("charge_non_blocking");

    // Rates high enough that the bucket is rarely empty, plus one that is
    // almost always empty to measure the partial-grant path.
    for rate in [1_000i64, 1_000_000, 1_000_000_000] {
        let limiter = BandwidthLimiter::new(rate, 0, LimiterKind::Sent);
        group.bench_with_input(BenchmarkId::new("rate", rate), &limiter, |b, limiter| {
            b.iter(|| black_box(limiter.charge_non_blocking(black_box(1_500))));
        });
    }

    group.finish();
}

fn bench_unlimited(c: &mut Criterion) {
    let limiter = BandwidthLimiter::new(0, 0, LimiterKind::Both);
    c.bench_function("charge_unlimited", |b| {
        b.iter(|| limiter.charge(black_box(1_500)));
    });
}

criterion_group!(benches, bench_charge_non_blocking, bench_unlimited);
criterion_main!(benches);
