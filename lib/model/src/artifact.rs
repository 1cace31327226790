//! Persisted model weights
//!
//! The artifact stores the trained weights together with the fingerprint of
//! the feature space they were trained on. Loading against a different
//! feature space is refused, since the first layer's rows would no longer
//! line up with the encoded columns.

use crate::gcn::{EmbeddingModel, GcnLayer};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use diplomarec_core::{Error, FeatureFingerprint, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Bumped whenever the on-disk layout changes
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LayerWeights {
    rows: usize,
    cols: usize,
    weight: Vec<f32>,
    bias: Vec<f32>,
}

impl LayerWeights {
    fn from_layer(layer: &GcnLayer) -> Self {
        Self {
            rows: layer.in_features(),
            cols: layer.out_features(),
            weight: layer.weight().iter().copied().collect(),
            bias: layer.bias().to_vec(),
        }
    }

    fn into_layer(self) -> Result<GcnLayer> {
        let weight = Array2::from_shape_vec((self.rows, self.cols), self.weight)
            .map_err(|e| Error::ModelIo(format!("Malformed layer weights: {}", e)))?;
        GcnLayer::from_parts(weight, Array1::from_vec(self.bias))
            .map_err(|e| Error::ModelIo(e.to_string()))
    }
}

/// Serialized embedding model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    format_version: u32,
    fingerprint: FeatureFingerprint,
    conv1: LayerWeights,
    conv2: LayerWeights,
}

impl ModelArtifact {
    pub fn from_model(model: &EmbeddingModel, fingerprint: FeatureFingerprint) -> Self {
        let (conv1, conv2) = model.layers();
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            fingerprint,
            conv1: LayerWeights::from_layer(conv1),
            conv2: LayerWeights::from_layer(conv2),
        }
    }

    pub fn fingerprint(&self) -> &FeatureFingerprint {
        &self.fingerprint
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::ModelIo(format!("Serialization error: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let artifact: Self = bincode::deserialize(bytes)
            .map_err(|e| Error::ModelIo(format!("Deserialization error: {}", e)))?;
        if artifact.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(Error::ModelIo(format!(
                "Unsupported artifact version {} (expected {})",
                artifact.format_version, ARTIFACT_FORMAT_VERSION
            )));
        }
        Ok(artifact)
    }

    /// Write atomically, replacing any previous artifact
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let data = self.to_bytes()?;
        AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
            .write(|f| f.write_all(&data))
            .map_err(|e| Error::ModelIo(format!("Failed to write {}: {}", path.display(), e)))?;
        info!("Model saved to {} ({} bytes)", path.display(), data.len());
        Ok(())
    }

    /// Read an artifact; `Ok(None)` when the file does not exist
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read(path)?;
        Self::from_bytes(&data).map(Some)
    }

    /// Rebuild the model, refusing weights trained on another feature space
    pub fn into_model(self, expected: &FeatureFingerprint) -> Result<EmbeddingModel> {
        if &self.fingerprint != expected {
            return Err(Error::ModelIo(format!(
                "Artifact fingerprint {} does not match current features {}",
                self.fingerprint, expected
            )));
        }
        if self.conv1.rows != expected.feature_dim {
            return Err(Error::ModelIo(format!(
                "Artifact expects {} features, encoder produces {}",
                self.conv1.rows, expected.feature_dim
            )));
        }
        let model = EmbeddingModel::from_layers(self.conv1.into_layer()?, self.conv2.into_layer()?)
            .map_err(|e| Error::ModelIo(e.to_string()))?;
        Ok(model)
    }
}
