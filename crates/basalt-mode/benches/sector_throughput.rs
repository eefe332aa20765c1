//! Per-sector encrypt throughput for each mode, the hot path every volume
//! read/write runs through on the worker pool.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use basalt_mode::{CbcMode, LrwMode, Mode, XtsMode};
use basalt_primitives::CascadeKind;

const SECTOR_SIZE: u32 = 512;
const SECTORS_PER_BUFFER: usize = 32;

fn buffer() -> Vec<u8> {
    vec![0u8; SECTOR_SIZE as usize * SECTORS_PER_BUFFER]
}

fn bench_mode(c: &mut Criterion, name: &str, mode: &dyn Mode) {
    let mut group = c.benchmark_group(name);
    group.throughput(criterion::Throughput::Bytes((SECTOR_SIZE as usize * SECTORS_PER_BUFFER) as u64));
    group.bench_with_input(BenchmarkId::new("encrypt_sectors", SECTORS_PER_BUFFER), &(), |b, _| {
        let mut buf = buffer();
        b.iter(|| mode.encrypt_sectors(black_box(&mut buf), 0, SECTOR_SIZE).unwrap());
    });
    group.finish();
}

fn xts_throughput(c: &mut Criterion) {
    let key = vec![0x11u8; XtsMode::key_len(CascadeKind::Aes)];
    let mode = XtsMode::new(CascadeKind::Aes, &key).unwrap();
    bench_mode(c, "xts-aes", &mode);
}

fn lrw_throughput(c: &mut Criterion) {
    let key = vec![0x22u8; LrwMode::key_len(CascadeKind::Aes)];
    let mode = LrwMode::new(CascadeKind::Aes, &key, SECTOR_SIZE).unwrap();
    bench_mode(c, "lrw-aes", &mode);
}

fn cbc_throughput(c: &mut Criterion) {
    let key = vec![0x33u8; CbcMode::key_len(CascadeKind::Aes)];
    let mode = CbcMode::new(CascadeKind::Aes, &key).unwrap();
    bench_mode(c, "cbc-aes", &mode);
}

criterion_group!(benches, xts_throughput, lrw_throughput, cbc_throughput);
criterion_main!(benches);
