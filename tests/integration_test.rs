// Integration tests for diplomarec
use diplomarec_core::{
    cosine_similarity, DatasetHash, Error, ProgramRecord, QueryFeatures, SimilarityGraphBuilder,
};
use diplomarec_engine::{
    CsvSource, EngineConfig, EngineState, MemorySource, ProgramSource, RecommendationEngine,
    RetrainOutcome,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use tempfile::TempDir;

const SUBJECTS: [&str; 6] = ["Maths", "Physique", "Chimie", "SVT", "Économie", "Informatique"];
const CAREERS: [&str; 5] = ["Ingénieur", "Médecin", "Analyste", "Développeur", "Chercheur"];
const FIELDS: [&str; 4] = ["SM", "SP", "SVT", "ECO"];

fn small_config(dir: &TempDir) -> EngineConfig {
    let mut config = EngineConfig::default().with_model_path(dir.path().join("model.bin"));
    config.training.hidden_dim = 16;
    config.training.embedding_dim = 8;
    config
}

fn catalog() -> Vec<ProgramRecord> {
    let mut records = Vec::new();
    for i in 0..24 {
        let subjects = [SUBJECTS[i % 6], SUBJECTS[(i + 1) % 6]];
        records.push(
            ProgramRecord::new(format!("Programme {}", i), format!("École {}", i % 5))
                .with_duration(2 + (i % 4) as u32)
                .with_mention(["Passable", "Assez Bien", "Bien", "Mention Très Bien"][i % 4])
                .with_city("Rabat")
                .with_subjects(subjects)
                .with_careers([CAREERS[i % 5]])
                .with_fields([FIELDS[i % 4]]),
        );
    }
    records
}

#[test]
fn test_identical_programs_embed_together() {
    let dir = TempDir::new().unwrap();
    let program = ProgramRecord::new("Licence Physique", "FS Rabat")
        .with_duration(3)
        .with_subjects(["Physique", "Chimie"])
        .with_careers(["Physicien"])
        .with_fields(["SP"]);
    let records: Vec<_> = (0..3)
        .map(|i| {
            let mut p = program.clone();
            p.school = format!("FS {}", i);
            p
        })
        .collect();

    let engine = RecommendationEngine::new(Arc::new(MemorySource::new(records)), small_config(&dir)).unwrap();
    let snapshot = engine.snapshot().unwrap();

    assert_eq!(snapshot.graph().edge_count(), 3);
    for edge in snapshot.graph().edges() {
        assert!((edge.weight - 1.0).abs() < 1e-5);
    }

    let embeddings = snapshot.embeddings();
    for i in 0..3 {
        for j in (i + 1)..3 {
            let a = embeddings.row(i).to_vec();
            let b = embeddings.row(j).to_vec();
            assert!(cosine_similarity(&a, &b) > 0.99);
        }
    }
}

#[test]
fn test_physics_profile_matches_physics_program() {
    let dir = TempDir::new().unwrap();
    let mut records = catalog();
    records.push(
        ProgramRecord::new("Licence Sciences Physiques", "FS Rabat")
            .with_duration(3)
            .with_subjects(["Physique", "Chimie"])
            .with_careers(["Chercheur"])
            .with_fields(["SP"]),
    );
    let engine = RecommendationEngine::new(Arc::new(MemorySource::new(records)), small_config(&dir)).unwrap();

    let query = QueryFeatures::new()
        .with_subjects(["Physique"])
        .with_fields(["SP"])
        .with_duration(3);
    let results = engine.predict(&query, Some(3), 50).unwrap();

    let hit = results
        .iter()
        .find(|r| r.name == "Licence Sciences Physiques")
        .expect("physics program should be recommended");
    assert_eq!(hit.subject_overlap, 1.0);
    assert_eq!(hit.field_overlap, 1.0);
    for r in &results {
        assert!(r.fields.contains(&"SP".to_string()));
        assert_eq!(r.duration, 3);
    }
}

#[test]
fn test_unchanged_retrain_trains_once() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::new(catalog()));
    let engine = RecommendationEngine::new(source, small_config(&dir)).unwrap();
    let artifact = dir.path().join("model.bin");

    let hash = engine.snapshot().unwrap().hash().clone();
    let mtime = std::fs::metadata(&artifact).unwrap().modified().unwrap();

    for _ in 0..2 {
        let outcome = engine.retrain().unwrap();
        assert_eq!(outcome, RetrainOutcome::Unchanged { hash: hash.clone() });
    }

    assert_eq!(engine.training_runs(), 1);
    assert_eq!(engine.snapshot().unwrap().hash(), &hash);
    assert_eq!(std::fs::metadata(&artifact).unwrap().modified().unwrap(), mtime);
}

#[test]
fn test_changed_data_retrains_and_overwrites_artifact() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::new(catalog()));
    let engine = RecommendationEngine::new(source.clone(), small_config(&dir)).unwrap();

    let mut changed = catalog();
    changed[0].subjects = vec!["Philosophie".to_string()];
    source.replace(changed);

    assert!(matches!(engine.retrain().unwrap(), RetrainOutcome::Retrained { .. }));
    assert_eq!(engine.training_runs(), 2);
    assert!(engine.snapshot().unwrap().encoder().subjects().contains("Philosophie"));

    // A restart picks up the overwritten artifact instead of training
    let restarted = RecommendationEngine::new(source, small_config(&dir)).unwrap();
    assert_eq!(restarted.training_runs(), 0);
}

#[test]
fn test_field_filter_excludes_non_intersecting() {
    let dir = TempDir::new().unwrap();
    let engine = RecommendationEngine::new(Arc::new(MemorySource::new(catalog())), small_config(&dir)).unwrap();

    let query = QueryFeatures::new().with_fields(["ECO"]);
    let results = engine.predict(&query, None, 100).unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.fields.contains(&"ECO".to_string())));

    let everything = engine.predict(&QueryFeatures::new(), None, 100).unwrap();
    assert_eq!(everything.len(), 24);
}

#[test]
fn test_random_profiles_rank_consistently() {
    let dir = TempDir::new().unwrap();
    let engine = RecommendationEngine::new(Arc::new(MemorySource::new(catalog())), small_config(&dir)).unwrap();
    let mut rng = StdRng::seed_from_u64(2024);

    for _ in 0..50 {
        let pick = |rng: &mut StdRng, pool: &[&str]| -> Vec<String> {
            let n = rng.random_range(0..3);
            (0..n)
                .map(|_| pool[rng.random_range(0..pool.len())].to_string())
                .collect()
        };
        let mut query = QueryFeatures::new();
        query.subjects = pick(&mut rng, &SUBJECTS);
        query.careers = pick(&mut rng, &CAREERS);
        query.fields = pick(&mut rng, &FIELDS);
        // unknown labels must not make prediction fail
        if rng.random_range(0..4) == 0 {
            query.subjects.push("Astronomie".to_string());
        }
        let duration = match rng.random_range(0..3) {
            0 => None,
            _ => Some(rng.random_range(0..6)),
        };
        let top_k = rng.random_range(0..8);

        let results = engine.predict(&query, duration, top_k).unwrap();
        assert!(results.len() <= top_k);

        let keys: HashSet<_> = results.iter().map(|r| (r.name.clone(), r.school.clone())).collect();
        assert_eq!(keys.len(), results.len());

        for pair in results.windows(2) {
            assert!(pair[0].match_percentage >= pair[1].match_percentage);
        }
        for r in &results {
            assert!(r.match_percentage.is_finite());
            if let Some(d) = duration.filter(|&d| d > 0) {
                assert_eq!(r.duration, d);
            }
        }
    }
}

#[test]
fn test_failed_retrain_keeps_serving_old_model() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::new(catalog()));
    let mut config = small_config(&dir);
    config.training.timeout = Some(std::time::Duration::from_secs(3600));
    let engine = RecommendationEngine::new(source.clone(), config).unwrap();
    let before = engine.snapshot().unwrap();

    source.replace(Vec::new());
    assert!(matches!(engine.retrain(), Err(Error::DataShape(_))));

    assert!(Arc::ptr_eq(&before, &engine.snapshot().unwrap()));
    assert_eq!(engine.predict(&QueryFeatures::new(), None, 5).unwrap().len(), 5);
}

#[test]
fn test_retrain_timeout_keeps_serving_old_model() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::new(catalog()));
    drop(RecommendationEngine::new(source.clone(), small_config(&dir)).unwrap());

    // the artifact from the first run is reused, so startup never trains
    let config = small_config(&dir).with_train_timeout(std::time::Duration::ZERO);
    let engine = RecommendationEngine::new(source.clone(), config).unwrap();
    assert_eq!(engine.training_runs(), 0);
    let before = engine.snapshot().unwrap();

    let mut changed = catalog();
    changed[3].careers.push("Architecte".to_string());
    source.replace(changed);

    assert!(matches!(engine.retrain(), Err(Error::TrainingTimeout { .. })));
    assert!(Arc::ptr_eq(&before, &engine.snapshot().unwrap()));
    assert_eq!(engine.state(), EngineState::Ready);
    assert_eq!(engine.predict(&QueryFeatures::new(), None, 3).unwrap().len(), 3);
}

#[test]
fn test_training_timeout_is_fatal_at_startup() {
    let source = Arc::new(MemorySource::new(catalog()));
    let config = EngineConfig::default().with_train_timeout(std::time::Duration::ZERO);
    let result = RecommendationEngine::new(source, config);
    assert!(matches!(result, Err(Error::TrainingTimeout { .. })));
}

#[test]
fn test_csv_catalog_end_to_end() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("programs.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "Nom_Diplôme,Ecole,Career,Employement_Opportunities,Ancienne_Diplome,Filiere,Durée,Mention_Bac,Ville,Matieres_Diplome,Matieres_Etudiant").unwrap();
    writeln!(file, "Licence Physique,FS Rabat,\"['Physicien']\",\"['Laboratoire']\",[],\"['SP']\",3,Bien,Rabat,\"['Optique']\",\"['Physique', 'Chimie']\"").unwrap();
    writeln!(file, "Licence Chimie,FS Fès,\"['Chimiste']\",[],[],\"['SP']\",3,Passable,Fès,[],\"['Chimie']\"").unwrap();
    writeln!(file, "Master Finance,ENCG Settat,\"['Analyste']\",[],\"['Licence Économie']\",\"['ECO']\",5,Assez Bien,Settat,[],\"['Économie', 'Maths']\"").unwrap();
    drop(file);

    let source = Arc::new(CsvSource::new(&path));
    assert_eq!(source.fetch().unwrap().len(), 3);

    let engine = RecommendationEngine::new(source, small_config(&dir)).unwrap();
    let query = QueryFeatures::new().with_subjects(["Chimie"]).with_fields(["SP"]);
    let results = engine.recommend(&query).unwrap();
    assert_eq!(results.len(), 2);
    let physique = results.iter().find(|r| r.name == "Licence Physique").unwrap();
    assert_eq!(physique.taught_subjects, vec!["Optique".to_string()]);
}

#[test]
fn test_csv_missing_column_is_data_shape() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("programs.csv");
    std::fs::write(&path, "Nom_Diplôme,Ecole,Filiere\nA,B,SM\n").unwrap();

    let result = RecommendationEngine::new(Arc::new(CsvSource::new(&path)), small_config(&dir));
    assert!(matches!(result, Err(Error::DataShape(_))));
}

#[test]
fn test_graph_build_is_deterministic_on_catalog() {
    let records = catalog();
    let encoder = diplomarec_core::FeatureEncoder::fit(&records).unwrap();
    let ids: Vec<_> = records.iter().map(ProgramRecord::unique_id).collect();
    let a = SimilarityGraphBuilder::default()
        .build(ids.clone(), encoder.transform_all(&records))
        .unwrap();
    let b = SimilarityGraphBuilder::default()
        .build(ids, encoder.transform_all(&records))
        .unwrap();
    assert_eq!(a.edges(), b.edges());
    assert_eq!(
        DatasetHash::of(&records).unwrap(),
        DatasetHash::of(&catalog()).unwrap()
    );
}
