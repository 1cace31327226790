use crate::ranker::ScoreWeights;
use diplomarec_core::{Error, Result, DEFAULT_SIMILARITY_THRESHOLD};
use diplomarec_model::TrainingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default number of recommendations returned per query
pub const DEFAULT_TOP_K: usize = 10;

/// Configuration for a recommendation engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Cosine similarity above which two programs are linked
    pub similarity_threshold: f32,
    pub top_k: usize,
    /// Where trained weights are persisted; `None` keeps them in memory only
    pub model_path: Option<PathBuf>,
    pub training: TrainingConfig,
    pub weights: ScoreWeights,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            top_k: DEFAULT_TOP_K,
            model_path: None,
            training: TrainingConfig::default(),
            weights: ScoreWeights::default(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[must_use]
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.training.epochs = epochs;
        self
    }

    #[must_use]
    pub fn with_train_timeout(mut self, timeout: Duration) -> Self {
        self.training.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.training.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(-1.0..1.0).contains(&self.similarity_threshold) {
            return Err(Error::InvalidConfig(format!(
                "similarity threshold must be in [-1, 1), got {}",
                self.similarity_threshold
            )));
        }
        if self.training.hidden_dim == 0 || self.training.embedding_dim == 0 {
            return Err(Error::InvalidConfig(
                "hidden and embedding dimensions must be positive".to_string(),
            ));
        }
        if !(self.training.learning_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be positive, got {}",
                self.training.learning_rate
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.similarity_threshold, 0.7);
        assert_eq!(config.top_k, 10);
        assert_eq!(config.training.hidden_dim, 64);
        assert_eq!(config.training.embedding_dim, 32);
        assert_eq!(config.training.epochs, 10);
        assert!(config.model_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let config = EngineConfig::default().with_threshold(1.5);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_zero_learning_rate() {
        let mut config = EngineConfig::default();
        config.training.learning_rate = 0.0;
        assert!(config.validate().is_err());
    }
}
