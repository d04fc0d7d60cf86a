// Governor hot path benchmarks
//
// Key metrics measured:
// - Quota increment on a seeded tenant
// - Sliding window admission and rejection
// - Idempotency lookup (hit and miss)
// - Parallel increments on one counter vs. spread across tenants
//
// Usage:
//   cargo bench --bench hot_path

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use quota_governor::governor::{
    BroadcastPublisher, CounterStore, GovernorConfig, IdempotencyCache, Limit, QuotaTracker,
    RateKey, RateScope, Resource, SlidingWindowLimiter, StaticTenantDirectory, TenantEntry,
};
use std::hint::black_box;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::runtime::Runtime;

fn enterprise_tracker() -> QuotaTracker {
    let directory = StaticTenantDirectory::new();
    directory.insert(
        "bench",
        TenantEntry {
            plan: "enterprise".to_string(),
            fleets: vec![],
        },
    );
    QuotaTracker::new(
        CounterStore::new(),
        Arc::new(directory),
        Arc::new(BroadcastPublisher::default()),
        GovernorConfig::default().thresholds(),
    )
}

fn bench_quota_increment(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let tracker = enterprise_tracker();
    rt.block_on(tracker.increment("bench", Resource::MessagesToday))
        .unwrap();

    c.bench_function("quota_increment_seeded", |b| {
        b.iter(|| {
            rt.block_on(tracker.increment(black_box("bench"), Resource::MessagesToday))
                .unwrap()
        })
    });
}

fn bench_sliding_window(c: &mut Criterion) {
    let key = RateKey::for_caller(Some("ak_bench"), IpAddr::V4(Ipv4Addr::LOCALHOST));

    c.bench_function("sliding_window_rejecting", |b| {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(60), 10, 10);
        b.iter(|| black_box(limiter.check(RateScope::Auth, &key).is_ok()))
    });

    c.bench_function("sliding_window_admit_fresh_keys", |b| {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(60), 10, 10);
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            let key = RateKey::for_caller(Some(&i.to_string()), IpAddr::V4(Ipv4Addr::LOCALHOST));
            black_box(limiter.check(RateScope::Api, &key).is_ok())
        })
    });
}

fn bench_idempotency(c: &mut Criterion) {
    let cache = IdempotencyCache::new(Duration::from_secs(300));
    cache.store("hit", vec![0u8; 512]);

    c.bench_function("idempotency_hit", |b| {
        b.iter(|| black_box(cache.check(black_box("hit")).is_hit()))
    });
    c.bench_function("idempotency_miss", |b| {
        b.iter(|| black_box(cache.check(black_box("miss")).is_hit()))
    });
}

fn bench_store_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_contention");

    for threads in [1usize, 4, 8] {
        group.bench_with_input(BenchmarkId::new("same_key", threads), &threads, |b, &threads| {
            let store = CounterStore::new();
            store.seed("t", Resource::MessagesToday, Limit::Unlimited);
            b.iter(|| {
                thread::scope(|s| {
                    for _ in 0..threads {
                        s.spawn(|| {
                            for _ in 0..100 {
                                let _ = store.compare_and_increment("t", Resource::MessagesToday);
                            }
                        });
                    }
                });
            })
        });

        group.bench_with_input(BenchmarkId::new("spread_keys", threads), &threads, |b, &threads| {
            let store = CounterStore::new();
            for t in 0..threads {
                store.seed(&format!("t{}", t), Resource::MessagesToday, Limit::Unlimited);
            }
            b.iter(|| {
                thread::scope(|s| {
                    for t in 0..threads {
                        let store = &store;
                        s.spawn(move || {
                            let tenant = format!("t{}", t);
                            for _ in 0..100 {
                                let _ = store.compare_and_increment(&tenant, Resource::MessagesToday);
                            }
                        });
                    }
                });
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_quota_increment,
    bench_sliding_window,
    bench_idempotency,
    bench_store_contention
);
criterion_main!(benches);
