//! diplomarec-model: graph convolutional embeddings for program similarity
//!
//! Provides:
//! - A two-layer GCN over a [`SimilarityGraph`](diplomarec_core::SimilarityGraph)
//! - Unsupervised contrastive training with Adam
//! - Fingerprinted, atomically written model artifacts

pub mod artifact;
pub mod gcn;
pub mod optim;
pub mod trainer;

pub use artifact::{ModelArtifact, ARTIFACT_FORMAT_VERSION};
pub use gcn::{Adjacency, EmbeddingModel, GcnLayer};
pub use optim::Adam;
pub use trainer::{Trainer, TrainingConfig, TrainingReport};
