//! Benchmarks for chunk encoding, decoding and merging.
//!
//! Run with: cargo bench --package alopex-chunk
//!
//! ## Benchmark Categories
//!
//! - **Sample Codecs**: Double-delta compress/iterate
//! - **Wire Format**: Encode, decode with a reused context
//! - **Merge**: Matrix assembly from overlapping chunks

use alopex_chunk::{
    chunks_to_matrix, parse_external_key, Chunk, ChunkData, DecodeContext, Encoding, LabelSet,
    Sample,
};
use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// Generate typical time series data (regular intervals, slowly varying values).
fn generate_typical_timeseries(start_ts: i64, count: usize) -> Vec<Sample> {
    let interval = 15_000_i64;

    let mut value = 50.0;
    (0..count)
        .map(|i| {
            value += (i as f64 * 0.1).sin() * 0.1;
            Sample::new(start_ts + (i as i64) * interval, value)
        })
        .collect()
}

fn build_chunk(fingerprint: u64, samples: &[Sample]) -> Chunk {
    let labels = LabelSet::from([
        ("__name__".to_string(), "cpu.usage".to_string()),
        ("host".to_string(), format!("server{}", fingerprint)),
    ]);
    let data = ChunkData::from_samples(Encoding::DoubleDelta, samples).unwrap();
    Chunk::new(
        "bench",
        fingerprint,
        labels,
        data,
        samples[0].timestamp,
        samples[samples.len() - 1].timestamp,
    )
    .unwrap()
}

// ============================================================================
// Sample Codec Benchmarks
// ============================================================================

fn bench_double_delta_compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("double_delta_compress");

    for size in [120, 1_000, 10_000].iter() {
        let samples = generate_typical_timeseries(0, *size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &samples, |b, samples| {
            b.iter(|| ChunkData::from_samples(Encoding::DoubleDelta, black_box(samples)))
        });
    }

    group.finish();
}

fn bench_double_delta_iterate(c: &mut Criterion) {
    let mut group = c.benchmark_group("double_delta_iterate");

    for size in [120, 1_000, 10_000].iter() {
        let samples = generate_typical_timeseries(0, *size);
        let data = ChunkData::from_samples(Encoding::DoubleDelta, &samples).unwrap();
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| data.iter().filter(Result::is_ok).count())
        });
    }

    group.finish();
}

// ============================================================================
// Wire Format Benchmarks
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let samples = generate_typical_timeseries(1_700_000_000_000, 1_000);
    let chunk = build_chunk(1, &samples);

    c.bench_function("encode_1k", |b| {
        b.iter(|| {
            // Clone to bypass the encode cache.
            let mut chunk = chunk.clone();
            chunk.encode().unwrap()
        })
    });
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for size in [120, 1_000, 10_000].iter() {
        let samples = generate_typical_timeseries(1_700_000_000_000, *size);
        let mut chunk = build_chunk(1, &samples);
        let blob = chunk.encode().unwrap();
        let key = chunk.external_key();
        let mut ctx = DecodeContext::new();

        group.throughput(Throughput::Bytes(blob.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &blob, |b, blob| {
            b.iter(|| {
                let mut target = parse_external_key("bench", &key).unwrap();
                target.decode(&mut ctx, Bytes::clone(blob)).unwrap();
                target
            })
        });
    }

    group.finish();
}

// ============================================================================
// Merge Benchmarks
// ============================================================================

fn bench_chunks_to_matrix(c: &mut Criterion) {
    // 10 series, 4 chunks each, every chunk overlapping the next by a quarter.
    let mut chunks = Vec::new();
    for fingerprint in 0..10u64 {
        for part in 0..4i64 {
            let start = 1_700_000_000_000 + part * 90 * 15_000;
            let samples = generate_typical_timeseries(start, 120);
            chunks.push(build_chunk(fingerprint, &samples));
        }
    }

    c.bench_function("chunks_to_matrix_10x4", |b| {
        b.iter(|| chunks_to_matrix(black_box(&chunks), i64::MIN, i64::MAX).unwrap())
    });
}

criterion_group!(
    benches,
    // Sample codecs
    bench_double_delta_compress,
    bench_double_delta_iterate,
    // Wire format
    bench_encode,
    bench_decode,
    // Merge
    bench_chunks_to_matrix,
);
criterion_main!(benches);
