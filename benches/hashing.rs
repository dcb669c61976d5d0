//! Benchmarks for digest computation
//!
//! Measures streaming SHA-256 throughput across data sizes and patterns to
//! characterize what a record refresh pays per file.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::io::Write;
use tempfile::NamedTempFile;
use twinsync::hash::{hash_bytes, Hasher};

/// Benchmark hashing of in-memory data of various sizes
fn bench_hash_bytes(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_bytes");

    let sizes = vec![
        ("4KB", 4 * 1024),
        ("64KB", 64 * 1024),
        ("1MB", 1024 * 1024),
        ("10MB", 10 * 1024 * 1024),
    ];

    for (name, size) in sizes {
        let data = vec![0x42u8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(name), &data, |b, data| {
            b.iter(|| {
                let digest = hash_bytes(black_box(data));
                black_box(digest);
            });
        });
    }

    group.finish();
}

/// Benchmark streaming file hashing
fn bench_hash_file(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_file");

    let sizes = vec![
        ("4KB", 4 * 1024),
        ("64KB", 64 * 1024),
        ("1MB", 1024 * 1024),
        ("10MB", 10 * 1024 * 1024),
    ];

    for (name, size) in sizes {
        let mut temp_file = NamedTempFile::new().unwrap();
        let data = vec![0x42u8; size];
        temp_file.write_all(&data).unwrap();
        temp_file.flush().unwrap();

        let path = temp_file.path().to_path_buf();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(name), &path, |b, path| {
            b.iter(|| {
                let mut hasher = Hasher::new();
                hasher.hash_file(black_box(path)).unwrap();
                let digest = hasher.finalize();
                black_box(digest);
            });
        });
    }

    group.finish();
}

/// Benchmark hashing many small files (simulating a record refresh)
fn bench_many_small_files(c: &mut Criterion) {
    let mut group = c.benchmark_group("many_small_files");

    let file_size = 4 * 1024;
    let file_count = 100;

    let temp_files: Vec<_> = (0..file_count)
        .map(|i| {
            let mut temp = NamedTempFile::new().unwrap();
            let data = vec![i as u8; file_size];
            temp.write_all(&data).unwrap();
            temp.flush().unwrap();
            temp
        })
        .collect();

    let paths: Vec<_> = temp_files.iter().map(|t| t.path().to_path_buf()).collect();
    group.throughput(Throughput::Bytes((file_size * file_count) as u64));

    group.bench_function("sequential", |b| {
        b.iter(|| {
            for path in &paths {
                let mut hasher = Hasher::new();
                hasher.hash_file(black_box(path)).unwrap();
                let digest = hasher.finalize();
                black_box(digest);
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_hash_bytes, bench_hash_file, bench_many_small_files);
criterion_main!(benches);
