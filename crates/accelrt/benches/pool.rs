//! Pool Benchmarks
//!
//! Measures the simulated stream-ordered allocator:
//! - Cached reuse after free + synchronize
//! - Cold allocation after trim
//! - Copy and fill throughput through the op log

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use accelrt::prelude::*;

fn runtime() -> Runtime {
    Runtime::sim(SimConfig::default())
}

fn alloc(rt: &Runtime, bytes: u64) -> DevicePtr {
    match rt.alloc_async(bytes) {
        Ok(AllocOutcome::Allocated(ptr)) => ptr,
        other => panic!("allocation of {} bytes failed: {:?}", bytes, other),
    }
}

/// Benchmark alloc/free cycles with and without cached reuse
fn bench_alloc_free(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool/alloc_free");

    for size in [256u64, 64 * 1024, 4 * 1024 * 1024] {
        group.bench_with_input(BenchmarkId::new("reuse", size), &size, |b, &size| {
            let rt = runtime();
            b.iter(|| {
                let ptr = alloc(&rt, size);
                rt.free_async(black_box(ptr)).unwrap();
                rt.synchronize_device().unwrap();
            });
        });

        group.bench_with_input(BenchmarkId::new("cold", size), &size, |b, &size| {
            let rt = runtime();
            b.iter(|| {
                let ptr = alloc(&rt, size);
                rt.free_async(black_box(ptr)).unwrap();
                rt.synchronize_device().unwrap();
                rt.trim_pool(0).unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark many live allocations followed by a batch release
fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool/batch");

    for count in [16usize, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let rt = runtime();
            b.iter(|| {
                let ptrs: Vec<DevicePtr> = (0..count).map(|i| alloc(&rt, 512 + i as u64)).collect();
                for ptr in ptrs {
                    rt.free_async(ptr).unwrap();
                }
                rt.synchronize_device().unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark copy and fill throughput
fn bench_transfer(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool/transfer");

    for size in [4 * 1024u64, 1024 * 1024] {
        group.throughput(Throughput::Bytes(size));

        group.bench_with_input(BenchmarkId::new("memset", size), &size, |b, &size| {
            let rt = runtime();
            let d = alloc(&rt, size);
            b.iter(|| {
                rt.memset_async(d, size, 0x11).unwrap();
                rt.synchronize_device().unwrap();
            });
        });

        group.bench_with_input(BenchmarkId::new("htod_dtoh", size), &size, |b, &size| {
            let rt = runtime();
            let d = alloc(&rt, size);
            let host = rt.alloc_pinned_host(size).unwrap();
            b.iter(|| {
                rt.memcpy_async(host.as_raw(), d.as_raw(), size, MemcpyKind::HostToDevice)
                    .unwrap();
                rt.memcpy_async(d.as_raw(), host.as_raw(), size, MemcpyKind::DeviceToHost)
                    .unwrap();
                rt.synchronize_device().unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark device-side random fills
fn bench_random(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool/random");
    let count = 64 * 1024u64;
    group.throughput(Throughput::Elements(count));

    let rt = runtime();
    let d = alloc(&rt, count * 4);

    group.bench_function("uniform", |b| {
        b.iter(|| {
            rt.generate_uniform(d, count).unwrap();
            rt.synchronize_device().unwrap();
        });
    });

    group.bench_function("normal", |b| {
        b.iter(|| {
            rt.generate_normal(d, count, 0.0, 1.0).unwrap();
            rt.synchronize_device().unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_alloc_free, bench_batch, bench_transfer, bench_random);
criterion_main!(benches);
