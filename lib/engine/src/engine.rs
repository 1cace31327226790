//! Recommendation engine lifecycle
//!
//! ```text
//! Uninitialized ──load()──▶ Loading ──▶ Ready ◀──▶ Retraining
//!                              │
//!                              └──(error)──▶ Uninitialized
//! ```
//!
//! [`RecommendationEngine::new`] loads before returning. A server that wants
//! to answer readiness probes during startup uses
//! [`RecommendationEngine::unloaded`] and calls
//! [`load`](RecommendationEngine::load) itself.
//!
//! The published [`Snapshot`] sits behind a lock as an `Arc`. Predictions
//! clone the `Arc` and work lock-free on it; a retrain builds a complete new
//! snapshot on the side and swaps it in with one write.

use crate::background::RetrainWorker;
use crate::config::EngineConfig;
use crate::ranker::{PredictionRanker, Recommendation};
use crate::snapshot::{ArtifactPolicy, Snapshot, SnapshotInfo};
use crate::source::ProgramSource;
use diplomarec_core::{DatasetHash, Error, QueryFeatures, Result, Validation};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum EngineState {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Retraining,
}

impl EngineState {
    /// Whether predictions can be served
    pub fn is_serving(&self) -> bool {
        matches!(self, EngineState::Ready | EngineState::Retraining)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Loading => "loading",
            EngineState::Ready => "ready",
            EngineState::Retraining => "retraining",
        };
        f.write_str(name)
    }
}

/// Result of a retrain request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrainOutcome {
    /// Dataset hash matched the published snapshot; nothing was rebuilt
    Unchanged { hash: DatasetHash },
    Retrained {
        previous: DatasetHash,
        current: DatasetHash,
        programs: usize,
    },
}

impl fmt::Display for RetrainOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrainOutcome::Unchanged { .. } => {
                f.write_str("No changes detected in data, no need to retrain the model.")
            }
            RetrainOutcome::Retrained { programs, .. } => {
                write!(f, "Model retrained successfully on {} programs.", programs)
            }
        }
    }
}

/// Engine status for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub training_runs: u64,
    pub retrain_busy: bool,
    pub retrains_requested: u64,
    pub retrains_coalesced: u64,
    pub retrains_completed: u64,
    pub snapshot: Option<SnapshotInfo>,
}

struct EngineShared {
    source: Arc<dyn ProgramSource>,
    config: EngineConfig,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    state: RwLock<EngineState>,
    retrain_gate: Mutex<()>,
    training_runs: AtomicU64,
}

impl EngineShared {
    fn set_state(&self, state: EngineState) {
        *self.state.write() = state;
    }

    fn current(&self) -> Result<Arc<Snapshot>> {
        self.snapshot
            .read()
            .clone()
            .ok_or_else(|| Error::NotReady(self.state.read().to_string()))
    }

    fn publish(&self, snapshot: Snapshot) {
        if snapshot.origin().is_trained() {
            self.training_runs.fetch_add(1, Ordering::Relaxed);
        }
        *self.snapshot.write() = Some(Arc::new(snapshot));
    }

    fn load(&self) -> Result<()> {
        let _gate = self.retrain_gate.lock();
        if self.snapshot.read().is_some() {
            return Ok(());
        }

        self.set_state(EngineState::Loading);
        info!("Loading programs from {}", self.source.describe());
        let built = self.source.fetch().and_then(|records| {
            let hash = DatasetHash::of(&records)?;
            Snapshot::build(records, hash, &self.config, ArtifactPolicy::Reuse)
        });

        match built {
            Ok(snapshot) => {
                self.publish(snapshot);
                self.set_state(EngineState::Ready);
                info!("Engine ready");
                Ok(())
            }
            Err(e) => {
                self.set_state(EngineState::Uninitialized);
                error!("Loading failed: {}", e);
                Err(e)
            }
        }
    }

    fn retrain(&self) -> Result<RetrainOutcome> {
        let _gate = self.retrain_gate.lock();
        let current = self.current()?;

        let records = self.source.fetch()?;
        let hash = DatasetHash::of(&records)?;

        if current.hash() == &hash {
            info!("No changes detected in data, dataset {}", hash.short());
            return Ok(RetrainOutcome::Unchanged { hash });
        }

        info!(
            "Dataset changed ({} -> {}), retraining on {} programs",
            current.hash().short(),
            hash.short(),
            records.len()
        );
        self.set_state(EngineState::Retraining);
        let started = Instant::now();
        let built = Snapshot::build(records, hash, &self.config, ArtifactPolicy::Overwrite);
        self.set_state(EngineState::Ready);

        match built {
            Ok(snapshot) => {
                let outcome = RetrainOutcome::Retrained {
                    previous: current.hash().clone(),
                    current: snapshot.hash().clone(),
                    programs: snapshot.records().len(),
                };
                self.publish(snapshot);
                info!("Retrain finished in {:?}", started.elapsed());
                Ok(outcome)
            }
            Err(e) => {
                error!("Retrain failed, keeping dataset {}: {}", current.hash().short(), e);
                Err(e)
            }
        }
    }
}

/// Owns the published snapshot and serves predictions from it
pub struct RecommendationEngine {
    shared: Arc<EngineShared>,
    worker: RetrainWorker,
}

impl RecommendationEngine {
    /// Fetch, fit and train (or load) synchronously.
    ///
    /// Any failure here is fatal: no engine is returned.
    pub fn new(source: Arc<dyn ProgramSource>, config: EngineConfig) -> Result<Self> {
        let engine = Self::unloaded(source, config)?;
        engine.load()?;
        Ok(engine)
    }

    /// An engine in [`EngineState::Uninitialized`] with nothing to serve yet
    pub fn unloaded(source: Arc<dyn ProgramSource>, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(EngineShared {
            source,
            config,
            snapshot: RwLock::new(None),
            state: RwLock::new(EngineState::Uninitialized),
            retrain_gate: Mutex::new(()),
            training_runs: AtomicU64::new(0),
        });

        let job_shared = shared.clone();
        let worker = RetrainWorker::new(Box::new(move || {
            if let Err(e) = job_shared.retrain() {
                error!("Background retrain failed: {}", e);
            }
        }))?;

        Ok(Self { shared, worker })
    }

    /// Build and publish the first snapshot, reusing a compatible artifact.
    ///
    /// A failure leaves the engine `Uninitialized`; a later call may try
    /// again. Does nothing once a snapshot is published.
    pub fn load(&self) -> Result<()> {
        self.shared.load()
    }

    pub fn state(&self) -> EngineState {
        *self.shared.state.read()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Currently published snapshot, if any
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.shared.snapshot.read().clone()
    }

    /// Number of times a model was trained rather than loaded
    pub fn training_runs(&self) -> u64 {
        self.shared.training_runs.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            state: self.state(),
            training_runs: self.training_runs(),
            retrain_busy: self.worker.is_busy(),
            retrains_requested: self.worker.jobs_submitted(),
            retrains_coalesced: self.worker.jobs_coalesced(),
            retrains_completed: self.worker.jobs_completed(),
            snapshot: self.snapshot().map(|s| s.info()),
        }
    }

    /// Ranked programs for `query`, filtered on `desired_duration`
    pub fn predict(
        &self,
        query: &QueryFeatures,
        desired_duration: Option<u32>,
        top_k: usize,
    ) -> Result<Vec<Recommendation>> {
        let snapshot = self.shared.current()?;
        PredictionRanker::new(&snapshot, self.shared.config.weights).rank(query, desired_duration, top_k)
    }

    /// [`predict`](Self::predict) with the query's own duration and the
    /// configured `top_k`
    pub fn recommend(&self, query: &QueryFeatures) -> Result<Vec<Recommendation>> {
        self.predict(query, query.duration, self.shared.config.top_k)
    }

    pub fn validate(&self, query: &QueryFeatures) -> Result<Validation> {
        Ok(self.shared.current()?.encoder().validate(query))
    }

    /// Re-read the source and rebuild if the data changed.
    ///
    /// On error the previously published snapshot keeps serving.
    pub fn retrain(&self) -> Result<RetrainOutcome> {
        self.shared.retrain()
    }

    /// Queue a retrain on the background worker; `false` if merged into one
    /// already waiting
    pub fn spawn_retrain(&self) -> bool {
        self.worker.submit()
    }

    /// Wait for queued background retrains to finish
    pub fn wait_for_retrain(&self, timeout: std::time::Duration) -> bool {
        self.worker.wait_idle(timeout)
    }
}
