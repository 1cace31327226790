//! # diplomarec
//!
//! Graph-embedding recommender for higher-education programs.
//!
//! Programs are encoded as multi-hot feature vectors, linked into a
//! similarity graph, and embedded with a two-layer graph convolutional
//! network trained contrastively on the graph's edges. A student profile is
//! embedded as a transient node and programs are ranked by a blend of
//! embedding similarity and direct subject/career/field overlap.
//!
//! ## Quick Start
//!
//! ### As a Server
//!
//! ```bash
//! diplomarec --data ./data/programs.csv --model ./data/model.bin --port 8000
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use diplomarec::prelude::*;
//! use std::sync::Arc;
//!
//! let source = Arc::new(CsvSource::new("programs.csv"));
//! let config = EngineConfig::default().with_model_path("model.bin");
//! let engine = RecommendationEngine::new(source, config).unwrap();
//!
//! let query = QueryFeatures::new()
//!     .with_subjects(["Physique"])
//!     .with_fields(["SP"])
//!     .with_duration(3);
//! for r in engine.recommend(&query).unwrap() {
//!     println!("{} ({}) {:.1}%", r.name, r.school, r.match_percentage);
//! }
//! ```
//!
//! ## Crate Structure
//!
//! - `diplomarec-core` - records, feature encoding, similarity graph, dataset hashing
//! - `diplomarec-model` - GCN, Adam, contrastive trainer, model artifacts
//! - `diplomarec-engine` - data sources, snapshots, ranking, retraining
//! - `diplomarec-api` - REST API

// Re-export core types
pub use diplomarec_core::{
    DatasetHash, Error, FeatureEncoder, Mention, ProgramRecord, QueryFeatures, Result,
    SimilarityGraph, SimilarityGraphBuilder, UniqueId, Validation, Vector,
};

// Re-export model
pub use diplomarec_model::{EmbeddingModel, ModelArtifact, Trainer, TrainingConfig};

// Re-export engine
pub use diplomarec_engine::{
    CsvSource, EngineConfig, EngineState, MemorySource, ProgramSource, Recommendation,
    RecommendationEngine, RetrainOutcome,
};

// Re-export API
pub use diplomarec_api::RestApi;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        CsvSource, EngineConfig, EngineState, Error, MemorySource, ProgramRecord, ProgramSource,
        QueryFeatures, Recommendation, RecommendationEngine, RestApi, Result, RetrainOutcome,
        TrainingConfig,
    };
}
