//! Criterion benchmarks for adjacency compression
//!
//! Compares both codecs on adjacency lists shaped like real graphs:
//! - Encoding: sorted, delta-friendly targets
//! - Decoding: streaming cursor over one encoded list
//! - Pre-aggregation: collapsing parallel relationships

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use trueno_csr::compress::{preaggregate, retain_survivors};
use trueno_csr::{Aggregation, Codec, CompressionFlags};

/// Targets of one node with `degree` neighbours in a graph of `node_count`
fn generate_adjacency(degree: usize, node_count: u64, seed: u64) -> Vec<u64> {
    let mut rng_state = seed; // Simple LCG for reproducibility
    (0..degree)
        .map(|_| {
            rng_state = rng_state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            (rng_state >> 33) % node_count
        })
        .collect()
}

/// Benchmark: encoding into a reused byte buffer
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for degree in [16, 256, 4096] {
        let targets = generate_adjacency(degree, 10_000_000, 42);
        group.throughput(Throughput::Elements(degree as u64));

        for codec in Codec::ALL {
            group.bench_with_input(BenchmarkId::new(codec.to_string(), degree), &targets, |b, targets| {
                let mut values = targets.clone();
                let mut out = Vec::with_capacity(degree * 8);
                b.iter(|| {
                    values.copy_from_slice(targets);
                    out.clear();
                    black_box(codec.encode_into(&mut values, CompressionFlags::SORT_AND_DELTA, &mut out));
                });
            });
        }
    }

    group.finish();
}

/// Benchmark: decoding with the streaming cursor
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for degree in [16, 256, 4096] {
        group.throughput(Throughput::Elements(degree as u64));

        for codec in Codec::ALL {
            let mut values = generate_adjacency(degree, 10_000_000, 7);
            let mut bytes = Vec::new();
            codec.encode_into(&mut values, CompressionFlags::SORT_AND_DELTA, &mut bytes);

            group.bench_with_input(BenchmarkId::new(codec.to_string(), degree), &bytes, |b, bytes| {
                b.iter(|| {
                    let sum: u64 = codec
                        .cursor(black_box(bytes), degree, CompressionFlags::SORT_AND_DELTA)
                        .sum();
                    black_box(sum);
                });
            });
        }
    }

    group.finish();
}

/// Benchmark: collapsing duplicates with a summed weight channel
fn bench_preaggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("preaggregate");

    for (name, sorted) in [("sorted", true), ("unsorted", false)] {
        let mut targets = generate_adjacency(1024, 64, 3);
        if sorted {
            targets.sort_unstable();
        }
        let weights: Vec<u64> = (0..1024_u32).map(|w| f64::from(w).to_bits()).collect();

        group.bench_function(name, |b| {
            b.iter(|| {
                let mut run = targets.clone();
                let mut properties = vec![weights.clone()];
                let length = run.len();
                preaggregate(&mut run, &mut properties, 0..length, &[Aggregation::Sum]);
                black_box(retain_survivors(&mut run, &mut properties, 0..length));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_preaggregate);
criterion_main!(benches);
