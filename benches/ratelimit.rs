//! Benchmarks for rate limiter operations.
//!
//! Run with: cargo bench --bench ratelimit

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tokio::runtime::Runtime;

use msggate::ratelimit::{MessageType, RateLimitTable, RateLimiter, TenantTier};
use msggate::store::MemoryCounterStore;

fn paid_limiter() -> RateLimiter {
    RateLimiter::new(Arc::new(MemoryCounterStore::new()), RateLimitTable::default())
        .with_default_tier(TenantTier::Paid)
}

fn bench_check_and_increment(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let limiter = paid_limiter();

    c.bench_function("ratelimit/check_and_increment", |b| {
        let mut tenant = 0u64;
        b.iter(|| {
            // Rotate tenants so no counter ever trips its limit.
            tenant += 1;
            let id = format!("tenant_{}", tenant % 512);
            rt.block_on(async {
                black_box(limiter.check_and_increment(&id, MessageType::Sms).await)
            })
        })
    });
}

fn bench_check_only(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let limiter = paid_limiter();

    rt.block_on(async {
        for _ in 0..100 {
            limiter.check_and_increment("tenant_0", MessageType::Sms).await;
        }
    });

    c.bench_function("ratelimit/check_only", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(limiter.check_only("tenant_0", MessageType::Sms).await)
            })
        })
    });
}

fn bench_current_usage(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let limiter = paid_limiter();

    rt.block_on(async {
        limiter.check_and_increment("tenant_0", MessageType::Sms).await;
    });

    c.bench_function("ratelimit/current_usage", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(limiter.current_usage("tenant_0", MessageType::Sms).await)
            })
        })
    });
}

criterion_group!(
    benches,
    bench_check_and_increment,
    bench_check_only,
    bench_current_usage
);
criterion_main!(benches);
