use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use tempfile::tempdir;

use sow::{SowReader, SowRecord, SowWriter};

const N_RECORDS: u64 = 10_000;
const DATA_SIZE: usize = 100;

fn write_store(path: &std::path::Path) {
    let mut w = SowWriter::create(path, 512, 10_000).unwrap();
    let data = vec![b'x'; DATA_SIZE];
    for i in 1..=N_RECORDS {
        w.write(&SowRecord {
            key: i,
            seq: i,
            data: data.clone(),
            data_size: DATA_SIZE as u32,
            ..SowRecord::default()
        })
        .unwrap();
    }
    w.close().unwrap();
}

fn sow_write_benchmark(c: &mut Criterion) {
    c.bench_function("sow_write_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let path = dir.path().join("bench.sow");
                (dir, path)
            },
            |(_dir, path)| {
                write_store(&path);
            },
            BatchSize::SmallInput,
        );
    });
}

fn sow_read_benchmark(c: &mut Criterion) {
    c.bench_function("sow_read_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let path = dir.path().join("bench.sow");
                write_store(&path);
                (dir, path)
            },
            |(_dir, path)| {
                let mut r = SowReader::open(&path).unwrap();
                assert_eq!(r.records().count() as u64, N_RECORDS);
            },
            BatchSize::SmallInput,
        );
    });
}

fn crc_benchmark(c: &mut Criterion) {
    let block = vec![0xA5u8; 1024 * 1024];
    c.bench_function("crc32_1mib", |b| {
        b.iter(|| common::crc::crc32(&block, 0));
    });
}

criterion_group!(benches, sow_write_benchmark, sow_read_benchmark, crc_benchmark);
criterion_main!(benches);
