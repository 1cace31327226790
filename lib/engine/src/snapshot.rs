//! Immutable trained state
//!
//! A [`Snapshot`] bundles everything derived from one dataset version:
//! records, fitted encoder, similarity graph, model and embedding table.
//! It is built completely before it is published and never mutated
//! afterwards, so readers holding an `Arc<Snapshot>` always see a
//! consistent set.

use crate::config::EngineConfig;
use ahash::AHashSet;
use diplomarec_core::{
    DatasetHash, Error, FeatureEncoder, ProgramRecord, Result, SimilarityGraph,
    SimilarityGraphBuilder, Vector,
};
use diplomarec_model::{Adjacency, EmbeddingModel, ModelArtifact, Trainer, TrainingReport};
use ndarray::Array2;
use serde::Serialize;
use std::time::SystemTime;
use tracing::{info, warn};

/// How the model of a snapshot was obtained
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOrigin {
    /// Weights restored from the persisted artifact
    Loaded,
    Trained(TrainingReport),
}

impl ModelOrigin {
    pub fn is_trained(&self) -> bool {
        matches!(self, ModelOrigin::Trained(_))
    }
}

/// Whether a persisted artifact may be reused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactPolicy {
    /// Load the artifact when it matches the feature space, else train
    Reuse,
    /// Always train and overwrite the artifact
    Overwrite,
}

pub struct Snapshot {
    records: Vec<ProgramRecord>,
    encoder: FeatureEncoder,
    graph: SimilarityGraph,
    adjacency: Adjacency,
    model: EmbeddingModel,
    features: Array2<f32>,
    embeddings: Array2<f32>,
    hash: DatasetHash,
    origin: ModelOrigin,
    created_at: SystemTime,
}

/// Summary of a snapshot for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub programs: usize,
    pub edges: usize,
    pub feature_dim: usize,
    pub embedding_dim: usize,
    pub dataset_hash: String,
    pub trained: bool,
    pub created_at: SystemTime,
}

impl Snapshot {
    /// Run the full pipeline: fit, graph, model, embeddings.
    pub fn build(
        records: Vec<ProgramRecord>,
        hash: DatasetHash,
        config: &EngineConfig,
        policy: ArtifactPolicy,
    ) -> Result<Self> {
        let encoder = FeatureEncoder::fit(&records)?;
        warn_duplicate_ids(&records);

        let vectors = encoder.transform_all(&records);
        let features = to_matrix(&vectors, encoder.dim())?;
        let ids = records.iter().map(ProgramRecord::unique_id).collect();
        let graph = SimilarityGraphBuilder::new(config.similarity_threshold).build(ids, vectors)?;
        let adjacency = Adjacency::from_graph(&graph);

        let reused = match policy {
            ArtifactPolicy::Reuse => load_compatible(&encoder, config),
            ArtifactPolicy::Overwrite => None,
        };

        let (model, origin) = match reused {
            Some(model) => (model, ModelOrigin::Loaded),
            None => {
                let (model, report) = Trainer::new(config.training.clone()).train(&graph, &features)?;
                if let Some(path) = &config.model_path {
                    ModelArtifact::from_model(&model, encoder.fingerprint()).save(path)?;
                }
                (model, ModelOrigin::Trained(report))
            }
        };

        let embeddings = model.forward(&adjacency, features.view())?;

        info!(
            "Snapshot ready: {} programs, {} edges, dataset {}",
            records.len(),
            graph.edge_count(),
            hash.short()
        );

        Ok(Self {
            records,
            encoder,
            graph,
            adjacency,
            model,
            features,
            embeddings,
            hash,
            origin,
            created_at: SystemTime::now(),
        })
    }

    pub fn records(&self) -> &[ProgramRecord] {
        &self.records
    }

    pub fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    pub fn graph(&self) -> &SimilarityGraph {
        &self.graph
    }

    pub fn adjacency(&self) -> &Adjacency {
        &self.adjacency
    }

    pub fn model(&self) -> &EmbeddingModel {
        &self.model
    }

    /// Encoded feature rows, one per record
    pub fn features(&self) -> &Array2<f32> {
        &self.features
    }

    /// Embedding table, row-aligned with [`Snapshot::records`]
    pub fn embeddings(&self) -> &Array2<f32> {
        &self.embeddings
    }

    pub fn hash(&self) -> &DatasetHash {
        &self.hash
    }

    pub fn origin(&self) -> &ModelOrigin {
        &self.origin
    }

    pub fn info(&self) -> SnapshotInfo {
        SnapshotInfo {
            programs: self.records.len(),
            edges: self.graph.edge_count(),
            feature_dim: self.encoder.dim(),
            embedding_dim: self.embeddings.ncols(),
            dataset_hash: self.hash.to_string(),
            trained: self.origin.is_trained(),
            created_at: self.created_at,
        }
    }
}

/// Persisted model if it exists and fits the current configuration.
///
/// Any failure to reuse is logged and answered with `None`, which makes the
/// caller train from scratch.
fn load_compatible(encoder: &FeatureEncoder, config: &EngineConfig) -> Option<EmbeddingModel> {
    let path = config.model_path.as_ref()?;
    let artifact = match ModelArtifact::load(path) {
        Ok(Some(artifact)) => artifact,
        Ok(None) => {
            info!("No model at {}, training", path.display());
            return None;
        }
        Err(e) => {
            warn!("Ignoring unreadable model {}: {}", path.display(), e);
            return None;
        }
    };

    let model = match artifact.into_model(&encoder.fingerprint()) {
        Ok(model) => model,
        Err(e) => {
            warn!("Ignoring incompatible model {}: {}", path.display(), e);
            return None;
        }
    };

    if model.hidden_features() != config.training.hidden_dim
        || model.out_features() != config.training.embedding_dim
    {
        warn!(
            "Ignoring model {} with layer sizes {}x{} (configured {}x{})",
            path.display(),
            model.hidden_features(),
            model.out_features(),
            config.training.hidden_dim,
            config.training.embedding_dim
        );
        return None;
    }

    info!("Model loaded from {}", path.display());
    Some(model)
}

fn warn_duplicate_ids(records: &[ProgramRecord]) {
    let mut seen = AHashSet::with_capacity(records.len());
    for record in records {
        let id = record.unique_id();
        if !seen.insert(id.clone()) {
            warn!("Duplicate program id {}", id);
        }
    }
}

fn to_matrix(vectors: &[Vector], dim: usize) -> Result<Array2<f32>> {
    let mut data = Vec::with_capacity(vectors.len() * dim);
    for vector in vectors {
        if vector.dim() != dim {
            return Err(Error::InvalidDimension {
                expected: dim,
                actual: vector.dim(),
            });
        }
        data.extend_from_slice(vector.as_slice());
    }
    Array2::from_shape_vec((vectors.len(), dim), data)
        .map_err(|e| Error::DataShape(format!("feature matrix: {}", e)))
}
