//! Unsupervised contrastive training of the embedding model
//!
//! Every epoch runs one full-batch forward pass over the whole graph. Linked
//! programs are pulled together and uniformly sampled unlinked pairs are
//! pushed apart, both measured by cosine similarity of their embeddings:
//!
//! ```text
//! loss = (Σ_edges -ln σ(cos(u, v)) + Σ_negatives -ln(1 - σ(cos(u, v)))) / |edges|
//! ```

use crate::gcn::{Adjacency, EmbeddingModel};
use crate::optim::Adam;
use diplomarec_core::{Error, Result, SimilarityGraph};
use ndarray::{Array2, ArrayView1, ArrayViewMut1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub hidden_dim: usize,
    pub embedding_dim: usize,
    pub epochs: usize,
    pub learning_rate: f32,
    /// Seed for weight initialization and negative sampling
    pub seed: u64,
    /// Abort training once this much wall time has elapsed
    #[serde(default)]
    pub timeout: Option<Duration>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            hidden_dim: 64,
            embedding_dim: 32,
            epochs: 10,
            learning_rate: 0.01,
            seed: 42,
            timeout: None,
        }
    }
}

/// What happened during a training run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingReport {
    pub epochs_run: usize,
    /// Loss value of each completed epoch
    pub losses: Vec<f32>,
    /// True when the graph had no edges and the model kept its initial weights
    pub skipped: bool,
    pub elapsed: Duration,
}

impl TrainingReport {
    pub fn final_loss(&self) -> Option<f32> {
        self.losses.last().copied()
    }
}

/// Trains an [`EmbeddingModel`] on a similarity graph
#[derive(Debug, Clone, Default)]
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Freshly initialized model for `input_dim` features
    pub fn init_model(&self, input_dim: usize) -> EmbeddingModel {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        EmbeddingModel::new(
            input_dim,
            self.config.hidden_dim,
            self.config.embedding_dim,
            &mut rng,
        )
    }

    /// Initialize and train a model.
    ///
    /// `features` holds one row per graph node, in node order. A graph with
    /// no edges has no training signal: the initial weights are returned
    /// and the report is marked as skipped.
    pub fn train(
        &self,
        graph: &SimilarityGraph,
        features: &Array2<f32>,
    ) -> Result<(EmbeddingModel, TrainingReport)> {
        if features.nrows() != graph.node_count() {
            return Err(Error::DataShape(format!(
                "{} feature rows for a graph of {} nodes",
                features.nrows(),
                graph.node_count()
            )));
        }

        let started = Instant::now();
        let mut model = self.init_model(features.ncols());
        let mut report = TrainingReport::default();

        if graph.edge_count() == 0 {
            warn!(
                "Graph has no edges, skipping training of {} nodes",
                graph.node_count()
            );
            report.skipped = true;
            report.elapsed = started.elapsed();
            return Ok((model, report));
        }

        let adjacency = Adjacency::from_graph(graph);
        let positives = graph.edge_index();
        let num_nodes = graph.node_count();
        let num_negatives = positives.len();
        let ax = adjacency.propagate(features.view());

        let mut optimizer = Adam::new(self.config.learning_rate);
        let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(1));

        info!(
            "Training embeddings: {} nodes, {} edges, {} epochs",
            num_nodes,
            positives.len(),
            self.config.epochs
        );

        for epoch in 0..self.config.epochs {
            self.check_deadline(started, epoch)?;

            let negatives = sample_negatives(graph, num_nodes, num_negatives, &mut rng);

            let (embeddings, cache) = model.forward_cached(&adjacency, ax.clone());
            let mut d_out = Array2::<f32>::zeros(embeddings.raw_dim());
            let scale = 1.0 / num_negatives as f32;
            let mut total = 0.0f32;

            for &(a, b) in &positives {
                total += pair_term(&embeddings, &mut d_out, a, b, true, scale);
            }
            for &(a, b) in &negatives {
                total += pair_term(&embeddings, &mut d_out, a, b, false, scale);
            }
            let loss = total * scale;

            let grads = model.backward(&adjacency, &cache, &d_out);
            optimizer.step(model.parameters_with(&grads));

            debug!("Epoch {}, Loss: {:.4}", epoch + 1, loss);
            report.losses.push(loss);
            report.epochs_run = epoch + 1;
        }

        self.check_deadline(started, report.epochs_run)?;

        report.elapsed = started.elapsed();
        if let Some(loss) = report.final_loss() {
            info!(
                "Training finished in {:?} after {} steps, final loss {:.4}",
                report.elapsed,
                optimizer.steps(),
                loss
            );
        }
        Ok((model, report))
    }

    /// The budget covers the whole run, including the last epoch
    fn check_deadline(&self, started: Instant, epochs: usize) -> Result<()> {
        match self.config.timeout {
            Some(timeout) if started.elapsed() >= timeout => {
                warn!("Training timed out after {} epochs", epochs);
                Err(Error::TrainingTimeout { epochs })
            }
            _ => Ok(()),
        }
    }
}

/// Uniform node pairs that are not graph edges.
///
/// Draws `count` candidate pairs and discards the ones that coincide with an
/// edge, so fewer than `count` pairs may be returned.
fn sample_negatives(
    graph: &SimilarityGraph,
    num_nodes: usize,
    count: usize,
    rng: &mut StdRng,
) -> Vec<(usize, usize)> {
    (0..count)
        .map(|_| (rng.random_range(0..num_nodes), rng.random_range(0..num_nodes)))
        .filter(|&(a, b)| !graph.has_edge(a, b))
        .collect()
}

/// Adds one pair's loss gradient into `d_out` and returns its unscaled loss
fn pair_term(
    embeddings: &Array2<f32>,
    d_out: &mut Array2<f32>,
    a: usize,
    b: usize,
    positive: bool,
    scale: f32,
) -> f32 {
    let u = embeddings.row(a);
    let v = embeddings.row(b);
    let (cos, grad_u, grad_v) = cosine_with_grads(u, v);
    let sig = sigmoid(cos);

    let (loss, dl_dcos) = if positive {
        (softplus(-cos), sig - 1.0)
    } else {
        (softplus(cos), sig)
    };

    if let (Some(gu), Some(gv)) = (grad_u, grad_v) {
        accumulate(d_out.row_mut(a), &gu, dl_dcos * scale);
        accumulate(d_out.row_mut(b), &gv, dl_dcos * scale);
    }
    loss
}

/// Cosine similarity and its gradients with respect to each input.
///
/// Gradients are `None` when either vector has zero norm.
fn cosine_with_grads(
    u: ArrayView1<f32>,
    v: ArrayView1<f32>,
) -> (f32, Option<Vec<f32>>, Option<Vec<f32>>) {
    let nu = u.dot(&u).sqrt();
    let nv = v.dot(&v).sqrt();
    if nu <= f32::EPSILON || nv <= f32::EPSILON {
        return (0.0, None, None);
    }
    let cos = u.dot(&v) / (nu * nv);
    let grad_u = u
        .iter()
        .zip(v.iter())
        .map(|(&ui, &vi)| vi / (nu * nv) - cos * ui / (nu * nu))
        .collect();
    let grad_v = u
        .iter()
        .zip(v.iter())
        .map(|(&ui, &vi)| ui / (nu * nv) - cos * vi / (nv * nv))
        .collect();
    (cos, Some(grad_u), Some(grad_v))
}

#[inline]
fn accumulate(mut row: ArrayViewMut1<f32>, grad: &[f32], factor: f32) {
    for (r, g) in row.iter_mut().zip(grad) {
        *r += factor * g;
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// `ln(1 + e^x)`
#[inline]
fn softplus(x: f32) -> f32 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}
