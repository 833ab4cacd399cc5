//! Criterion benchmarks for the import pipeline
//!
//! - End-to-end import of scale-free graphs per codec
//! - Import with a collapsing, weighted projection
//! - Pre-flight memory estimation

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use trueno_csr::{
    Aggregation, Codec, CompressionFlags, GraphDimensions, GraphImporter, ImportConfig,
    InMemoryProperties, InMemorySource, MemoryEstimation, NoProperties, NodeRecord,
    PropertyMapping, PropertyValue, RelationshipProjection, RelationshipRecord,
};

/// Generate scale-free graph (Barabási-Albert model approximation)
fn generate_scale_free_graph(num_nodes: u64, edges_per_node: u64) -> Vec<RelationshipRecord> {
    let mut relationships = Vec::new();
    let mut rng_state = 12345_u64; // Simple LCG for reproducibility

    for node in 0..num_nodes {
        for _ in 0..edges_per_node {
            rng_state = rng_state.wrapping_mul(1_103_515_245).wrapping_add(12345);
            let target = rng_state % num_nodes;
            if target != node {
                relationships.push(RelationshipRecord::new(node, target, 0));
            }
        }
    }

    relationships
}

fn nodes(num_nodes: u64) -> InMemorySource<NodeRecord> {
    InMemorySource::new((0..num_nodes).map(|id| NodeRecord::new(id, vec![])).collect())
}

/// Benchmark: import per codec
fn bench_import(c: &mut Criterion) {
    let mut group = c.benchmark_group("import");
    group.sample_size(10);

    for size in [10_000_u64, 100_000] {
        let nodes = nodes(size);
        let relationships = InMemorySource::new(generate_scale_free_graph(size, 8));
        group.throughput(Throughput::Elements(relationships.records().len() as u64));

        for codec in Codec::ALL {
            group.bench_with_input(BenchmarkId::new(codec.to_string(), size), &size, |b, _| {
                b.iter(|| {
                    let config = ImportConfig::new(RelationshipProjection::new("R"))
                        .with_codec(codec, CompressionFlags::SORT_AND_DELTA);
                    let store = GraphImporter::new(config)
                        .unwrap()
                        .import(&nodes, &relationships, &NoProperties)
                        .unwrap();
                    black_box(store.size_in_bytes());
                });
            });
        }
    }

    group.finish();
}

/// Benchmark: import that collapses parallel relationships with a weight
fn bench_aggregated_import(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregated_import");
    group.sample_size(10);

    let size = 50_000_u64;
    let nodes = nodes(size);
    let mut properties = InMemoryProperties::new();
    let records: Vec<RelationshipRecord> = generate_scale_free_graph(size, 8)
        .into_iter()
        .map(|r| {
            // fold targets so that parallel relationships appear
            let record = RelationshipRecord::new(r.source, r.target % 64, 0);
            record.with_properties(properties.push([(1, PropertyValue::Double(1.0))]))
        })
        .collect();
    let relationships = InMemorySource::new(records);

    group.bench_function("sum_weight", |b| {
        b.iter(|| {
            let config = ImportConfig::new(
                RelationshipProjection::new("R")
                    .with_property(PropertyMapping::new("weight", 1).with_aggregation(Aggregation::Sum)),
            );
            let store = GraphImporter::new(config)
                .unwrap()
                .import(&nodes, &relationships, &properties)
                .unwrap();
            black_box(store.stats().relationship_count());
        });
    });

    group.finish();
}

/// Benchmark: memory estimation is cheap enough to run before every import
fn bench_estimate(c: &mut Criterion) {
    let config = ImportConfig::new(RelationshipProjection::new("R"));
    let model = MemoryEstimation::for_config(&config);

    c.bench_function("estimate", |b| {
        b.iter(|| {
            let dimensions = GraphDimensions::for_config(&config, black_box(1_000_000_000), 10_000_000_000);
            black_box(model.estimate(&dimensions, 8).memory_usage());
        });
    });
}

criterion_group!(benches, bench_import, bench_aggregated_import, bench_estimate);
criterion_main!(benches);
