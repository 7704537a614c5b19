use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use spooltag::{keys, KeyDerivationCache, MemoryTag, NoopObserver, ScanConfig, ScanPipeline};
use std::sync::Arc;

fn uid(n: u32) -> [u8; 4] {
    n.to_be_bytes()
}

fn bench_derive(c: &mut Criterion) {
    let mut group = c.benchmark_group("derive");
    for len in [4usize, 7] {
        let uid = vec![0x5au8; len];
        group.bench_with_input(BenchmarkId::new("uncached", len), &uid, |b, uid| {
            b.iter(|| keys::derive(black_box(uid)))
        });
    }

    let cache = KeyDerivationCache::new(64);
    cache.get_or_derive(&uid(1));
    group.bench_function("cache_hit", |b| {
        b.iter(|| cache.get_or_derive(black_box(&uid(1))))
    });

    // working set larger than the cache, every lookup misses
    let small = KeyDerivationCache::new(8);
    let mut n = 0u32;
    group.bench_function("cache_thrash", |b| {
        b.iter(|| {
            n = n.wrapping_add(1);
            small.get_or_derive(black_box(&uid(n % 16)))
        })
    });
    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let pipeline = ScanPipeline::new(Arc::new(KeyDerivationCache::new(8)), ScanConfig::default());
    let tag = MemoryTag::new(uid(42).to_vec());
    c.bench_function("scan_memory_tag", |b| {
        b.iter(|| {
            let mut tag = tag.clone();
            pipeline.run(&mut tag, &mut NoopObserver)
        })
    });
}

criterion_group!(benches, bench_derive, bench_scan);
criterion_main!(benches);
