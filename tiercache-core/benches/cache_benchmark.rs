use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tiercache_core::{
    system_clock, Cache, CacheValue, Expiry, InMemoryRemoteStore, KeyCodec, LocalCache,
    LocalCacheConfig, MultiLevelCache, RemoteCache, RemoteStore,
};

fn local(max_entries: usize) -> LocalCache {
    LocalCache::new(
        "bench",
        LocalCacheConfig {
            max_entries,
            default_ttl: Some(Duration::from_secs(600)),
            access_ttl: None,
        },
        system_clock(),
    )
}

fn multi_level(max_entries: usize) -> MultiLevelCache {
    let store: Arc<dyn RemoteStore> = Arc::new(InMemoryRemoteStore::new());
    let remote = RemoteCache::new(
        "bench",
        store,
        KeyCodec::default(),
        Some(Duration::from_secs(600)),
    );
    MultiLevelCache::new(local(max_entries), remote, Some(Duration::from_secs(60))).unwrap()
}

fn value(i: usize) -> CacheValue {
    CacheValue::Present(i.to_le_bytes().to_vec())
}

fn bench_put_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("put_sequential");

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("Local", size), size, |b, &size| {
            b.iter(|| {
                let cache = local(size);
                for i in 0..size {
                    cache
                        .put(&format!("key{}", i), black_box(value(i)), Expiry::Default)
                        .unwrap();
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("MultiLevel", size), size, |b, &size| {
            b.iter(|| {
                let cache = multi_level(size);
                for i in 0..size {
                    cache
                        .put(&format!("key{}", i), black_box(value(i)), Expiry::Default)
                        .unwrap();
                }
            });
        });
    }

    group.finish();
}

fn bench_get_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_sequential");

    for size in [10, 100, 1000].iter() {
        let cache = local(*size);
        for i in 0..*size {
            cache.put(&format!("key{}", i), value(i), Expiry::Default).unwrap();
        }

        group.bench_with_input(BenchmarkId::new("Local", size), size, |b, &size| {
            b.iter(|| {
                for i in 0..size {
                    black_box(cache.get(&format!("key{}", i)).unwrap());
                }
            });
        });

        let ml = multi_level(*size);
        for i in 0..*size {
            ml.put(&format!("key{}", i), value(i), Expiry::Default).unwrap();
        }

        group.bench_with_input(BenchmarkId::new("MultiLevel_l1_hit", size), size, |b, &size| {
            b.iter(|| {
                for i in 0..size {
                    black_box(ml.get(&format!("key{}", i)).unwrap());
                }
            });
        });
    }

    group.finish();
}

fn bench_remote_promotion(c: &mut Criterion) {
    let mut group = c.benchmark_group("remote_promotion");

    // Every read misses L1 and is promoted from L2
    group.bench_function("MultiLevel_l2_hit", |b| {
        let ml = multi_level(1000);
        for i in 0..100 {
            ml.put(&format!("key{}", i), value(i), Expiry::Default).unwrap();
        }
        b.iter(|| {
            ml.local().evict_all().unwrap();
            for i in 0..100 {
                black_box(ml.get(&format!("key{}", i)).unwrap());
            }
        });
    });

    group.finish();
}

fn bench_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("eviction");

    group.bench_function("LRU_eviction", |b| {
        b.iter(|| {
            let cache = local(50);
            // Insert 100 items in a cache with limit 50
            for i in 0..100 {
                cache
                    .put(&format!("key{}", i), black_box(value(i)), Expiry::Default)
                    .unwrap();
            }
        });
    });

    group.finish();
}

fn bench_read_heavy_workload(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_heavy_workload");

    // 90% reads, 10% writes
    for num_threads in [2, 4, 8].iter() {
        let cache = Arc::new(local(1000));
        for i in 0..100 {
            cache.put(&format!("key{}", i), value(i), Expiry::Default).unwrap();
        }

        group.bench_with_input(
            BenchmarkId::new("90_read_10_write", num_threads),
            num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let handles: Vec<_> = (0..num_threads)
                        .map(|thread_id| {
                            let cache = cache.clone();
                            thread::spawn(move || {
                                for i in 0..100 {
                                    if i % 10 == 0 {
                                        cache
                                            .put(
                                                &format!("key{}", thread_id * 100 + i),
                                                black_box(value(i)),
                                                Expiry::Default,
                                            )
                                            .unwrap();
                                    } else {
                                        black_box(cache.get(&format!("key{}", i % 50)).unwrap());
                                    }
                                }
                            })
                        })
                        .collect();

                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_put_sequential,
    bench_get_sequential,
    bench_remote_promotion,
    bench_eviction,
    bench_read_heavy_workload
);
criterion_main!(benches);
