//! Benchmarks for the in-process fallback store
//!
//! This benchmark suite measures the performance of:
//! - String writes with and without TTL
//! - Reads of live and expired keys
//! - Glob key scans over a populated store
//! - Concurrent mixed access through the backend

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use std::time::Duration;
use storefront_tenancy::backends::MockStore;
use storefront_tenancy::{CacheBackend, CacheCommands, CacheConfig};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    Runtime::new().unwrap_or_else(|_| panic!("Failed to create runtime"))
}

/// Store pre-populated with `n` OTP-style keys
fn populated(rt: &Runtime, n: usize) -> MockStore {
    let store = MockStore::new();
    rt.block_on(async {
        for i in 0..n {
            let _ = store.setex(&format!("otp:{i}"), 300, "123456").await;
        }
    });
    store
}

fn bench_writes(c: &mut Criterion) {
    let rt = runtime();
    let store = MockStore::new();

    let mut group = c.benchmark_group("mock_write");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("set", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            rt.block_on(async {
                let _ = store.set(&format!("session:{i}"), black_box("user")).await;
            });
        });
    });

    group.bench_function("setex", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            rt.block_on(async {
                let _ = store.setex(&format!("otp:{i}"), 300, black_box("123456")).await;
            });
        });
    });

    group.finish();
}

fn bench_reads(c: &mut Criterion) {
    let rt = runtime();
    let store = populated(&rt, 10_000);

    let mut group = c.benchmark_group("mock_read");
    group.bench_function("hit", |b| {
        b.iter(|| {
            rt.block_on(async {
                let _ = black_box(store.get("otp:4242").await);
            });
        });
    });
    group.bench_function("miss", |b| {
        b.iter(|| {
            rt.block_on(async {
                let _ = black_box(store.get("otp:missing").await);
            });
        });
    });
    group.finish();
}

fn bench_keys(c: &mut Criterion) {
    let rt = runtime();

    let mut group = c.benchmark_group("mock_keys");
    for size in &[100, 1_000, 10_000] {
        let store = populated(&rt, *size);
        group.bench_with_input(BenchmarkId::new("otp_prefix", size), size, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    let _ = black_box(store.keys("otp:1*").await);
                });
            });
        });
    }
    group.finish();
}

fn bench_backend_concurrent(c: &mut Criterion) {
    let rt = runtime();
    let backend = Arc::new(CacheBackend::mock_only(&CacheConfig::disabled()));

    c.bench_function("backend_concurrent_mixed_64", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut tasks = tokio::task::JoinSet::new();
                for i in 0..64 {
                    let backend = Arc::clone(&backend);
                    tasks.spawn(async move {
                        let key = format!("session:{}", i % 16);
                        let _ = backend.set(&key, "user").await;
                        let _ = backend.get(&key).await;
                    });
                }
                while tasks.join_next().await.is_some() {}
            });
        });
    });
}

criterion_group!(
    benches,
    bench_writes,
    bench_reads,
    bench_keys,
    bench_backend_concurrent
);
criterion_main!(benches);
