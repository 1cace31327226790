// Performance benchmarks for the recommendation pipeline
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use diplomarec_core::{FeatureEncoder, ProgramRecord, QueryFeatures, SimilarityGraphBuilder};
use diplomarec_engine::{EngineConfig, MemorySource, RecommendationEngine};
use rand::prelude::*;
use std::sync::Arc;

const SUBJECTS: [&str; 12] = [
    "Maths", "Physique", "Chimie", "SVT", "Économie", "Informatique",
    "Français", "Anglais", "Philosophie", "Histoire", "Gestion", "Droit",
];
const CAREERS: [&str; 8] = [
    "Ingénieur", "Médecin", "Analyste", "Développeur", "Chercheur", "Avocat", "Enseignant", "Comptable",
];
const FIELDS: [&str; 5] = ["SM", "SP", "SVT", "ECO", "LETTRES"];

fn generate_catalog(size: usize, seed: u64) -> Vec<ProgramRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..size)
        .map(|i| {
            let subjects: Vec<&str> = (0..rng.random_range(1..4))
                .map(|_| SUBJECTS[rng.random_range(0..SUBJECTS.len())])
                .collect();
            ProgramRecord::new(format!("Programme {}", i), format!("École {}", i % 40))
                .with_duration(rng.random_range(2..6))
                .with_subjects(subjects)
                .with_careers([CAREERS[rng.random_range(0..CAREERS.len())]])
                .with_fields([FIELDS[rng.random_range(0..FIELDS.len())]])
        })
        .collect()
}

fn benchmark_graph_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_build");

    for size in [100, 500, 1000].iter() {
        let records = generate_catalog(*size, 7);
        let encoder = FeatureEncoder::fit(&records).unwrap();
        let ids: Vec<_> = records.iter().map(ProgramRecord::unique_id).collect();
        let vectors = encoder.transform_all(&records);

        group.bench_with_input(BenchmarkId::new("pairwise", size), size, |b, _| {
            b.iter(|| {
                SimilarityGraphBuilder::default()
                    .build(black_box(ids.clone()), black_box(vectors.clone()))
                    .unwrap()
            });
        });
    }

    group.finish();
}

fn benchmark_predict(c: &mut Criterion) {
    let mut group = c.benchmark_group("predict");

    for size in [100, 1000].iter() {
        let source = Arc::new(MemorySource::new(generate_catalog(*size, 11)));
        let engine = RecommendationEngine::new(source, EngineConfig::default()).unwrap();
        let query = QueryFeatures::new()
            .with_subjects(["Maths", "Physique"])
            .with_fields(["SM", "SP"]);

        group.bench_with_input(BenchmarkId::new("top10", size), size, |b, _| {
            b.iter(|| engine.predict(black_box(&query), Some(3), 10).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_graph_build, benchmark_predict);
criterion_main!(benches);
