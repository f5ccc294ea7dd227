use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use htserve::cache::HandlerCache;
use htserve::handler::{HandlerOutput, HandlerRegistry, HandlerUnit};
use htserve::memory::{MemoryControl, MemoryProbe};
use htserve::properties::Properties;

struct Fixed(u64);

impl MemoryProbe for Fixed {
    fn available(&self) -> u64 {
        self.0
    }
}

fn registry(size: usize) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    for i in 0..size {
        registry.register(HandlerUnit::respond(&format!("unit{}", i), |_, _, _| {
            HandlerOutput::Properties(Properties::new())
        }));
    }
    registry
}

fn cache_hit_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_hit");

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let registry = registry(size);
            let memory = MemoryControl::new(Box::new(Fixed(u64::MAX)), 0);
            let cache = HandlerCache::new();
            for i in 0..size {
                let _ = cache.resolve(&format!("unit{}", i), &registry, &memory);
            }

            b.iter(|| {
                for i in 0..size {
                    let name = format!("unit{}", i);
                    let _ = cache.resolve(black_box(&name), &registry, &memory);
                }
            });
        });
    }

    group.finish();
}

fn cache_miss_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_miss");

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let registry = registry(size);
            let memory = MemoryControl::new(Box::new(Fixed(u64::MAX)), 0);

            b.iter(|| {
                let cache = HandlerCache::new();
                for i in 0..size {
                    let name = format!("unit{}", i);
                    let _ = cache.resolve(black_box(&name), &registry, &memory);
                }
            });
        });
    }

    group.finish();
}

/// 内存吃紧时每次解析都会清空缓存
fn cache_short_memory_benchmark(c: &mut Criterion) {
    let registry = registry(100);
    let memory = MemoryControl::new(Box::new(Fixed(0)), 1);
    let cache = HandlerCache::new();

    c.bench_function("cache_short_memory", |b| {
        b.iter(|| {
            for i in 0..100 {
                let name = format!("unit{}", i);
                let _ = cache.resolve(black_box(&name), &registry, &memory);
            }
        });
    });
}

criterion_group!(
    benches,
    cache_hit_benchmark,
    cache_miss_benchmark,
    cache_short_memory_benchmark
);
criterion_main!(benches);
