//! diplomarec-engine: the recommendation service core
//!
//! Ties the pipeline together: a [`ProgramSource`] supplies records, a
//! [`Snapshot`] holds everything trained from them, and the
//! [`RecommendationEngine`] publishes snapshots, serves predictions and
//! retrains when the data changes.

pub mod background;
pub mod config;
pub mod engine;
pub mod ranker;
pub mod snapshot;
pub mod source;

pub use background::{RetrainJob, RetrainWorker};
pub use config::{EngineConfig, DEFAULT_TOP_K};
pub use engine::{EngineState, EngineStatus, RecommendationEngine, RetrainOutcome};
pub use ranker::{PredictionRanker, Recommendation, ScoreWeights};
pub use snapshot::{ArtifactPolicy, ModelOrigin, Snapshot, SnapshotInfo};
pub use source::{parse_list, CsvSource, MemorySource, ProgramSource};
