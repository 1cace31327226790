//! Two-layer graph convolutional embedding model
//!
//! Each layer aggregates neighbor features with symmetric normalization and
//! self-loops before applying a dense transform:
//!
//! ```text
//! H' = D^-1/2 (A + I) D^-1/2 · H · W + b
//! ```
//!
//! The first layer is followed by ReLU, the second is linear.

use diplomarec_core::{Error, NodeId, Result, SimilarityGraph};
use ndarray::{Array1, Array2, ArrayView2, ArrayViewD, ArrayViewMutD, Axis, Zip};
use rand::Rng;

/// Normalized adjacency of an undirected graph.
///
/// Propagation accepts feature matrices with more rows than the adjacency
/// has nodes: surplus rows are appended isolated nodes that only see their
/// own self-loop. This is how transient query nodes are embedded without
/// touching the base graph.
#[derive(Debug, Clone)]
pub struct Adjacency {
    num_nodes: usize,
    edges: Vec<(NodeId, NodeId)>,
    inv_sqrt_degree: Vec<f32>,
}

impl Adjacency {
    pub fn new(num_nodes: usize, edges: Vec<(NodeId, NodeId)>) -> Result<Self> {
        if let Some(&(a, b)) = edges.iter().find(|&&(a, b)| a >= num_nodes || b >= num_nodes) {
            return Err(Error::DataShape(format!(
                "edge ({}, {}) out of range for {} nodes",
                a, b, num_nodes
            )));
        }
        Ok(Self::with_edges(num_nodes, edges))
    }

    pub fn from_graph(graph: &SimilarityGraph) -> Self {
        Self::with_edges(graph.node_count(), graph.edge_index())
    }

    fn with_edges(num_nodes: usize, edges: Vec<(NodeId, NodeId)>) -> Self {
        let mut degree = vec![1.0f32; num_nodes];
        for &(a, b) in &edges {
            degree[a] += 1.0;
            degree[b] += 1.0;
        }
        Self {
            num_nodes,
            inv_sqrt_degree: degree.iter().map(|d| 1.0 / d.sqrt()).collect(),
            edges,
        }
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// `D^-1/2 (A + I) D^-1/2 · x`
    ///
    /// The operator is symmetric, so the same call also propagates gradients.
    pub fn propagate(&self, x: ArrayView2<f32>) -> Array2<f32> {
        let mut out = Array2::<f32>::zeros(x.raw_dim());

        for (i, (mut out_row, x_row)) in out.outer_iter_mut().zip(x.outer_iter()).enumerate() {
            let self_coeff = match self.inv_sqrt_degree.get(i) {
                Some(inv) => inv * inv,
                None => 1.0,
            };
            out_row.scaled_add(self_coeff, &x_row);
        }

        for &(a, b) in &self.edges {
            let coeff = self.inv_sqrt_degree[a] * self.inv_sqrt_degree[b];
            out.row_mut(b).scaled_add(coeff, &x.row(a));
            out.row_mut(a).scaled_add(coeff, &x.row(b));
        }

        out
    }
}

/// One graph convolution: propagate, then dense transform
#[derive(Debug, Clone)]
pub struct GcnLayer {
    pub(crate) weight: Array2<f32>,
    pub(crate) bias: Array1<f32>,
}

impl GcnLayer {
    /// Glorot-uniform weights, zero bias
    pub fn new<R: Rng>(in_features: usize, out_features: usize, rng: &mut R) -> Self {
        let limit = (6.0 / (in_features + out_features).max(1) as f32).sqrt();
        let weight = Array2::from_shape_fn((in_features, out_features), |_| {
            rng.random_range(-limit..=limit)
        });
        Self {
            weight,
            bias: Array1::zeros(out_features),
        }
    }

    pub fn from_parts(weight: Array2<f32>, bias: Array1<f32>) -> Result<Self> {
        if weight.ncols() != bias.len() {
            return Err(Error::InvalidDimension {
                expected: weight.ncols(),
                actual: bias.len(),
            });
        }
        Ok(Self { weight, bias })
    }

    #[inline]
    pub fn in_features(&self) -> usize {
        self.weight.nrows()
    }

    #[inline]
    pub fn out_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn weight(&self) -> &Array2<f32> {
        &self.weight
    }

    pub fn bias(&self) -> &Array1<f32> {
        &self.bias
    }

    /// Dense transform of already-propagated features
    #[inline]
    fn transform(&self, propagated: &Array2<f32>) -> Array2<f32> {
        propagated.dot(&self.weight) + &self.bias
    }

    pub fn forward(&self, adjacency: &Adjacency, x: ArrayView2<f32>) -> Array2<f32> {
        self.transform(&adjacency.propagate(x))
    }
}

/// Intermediate activations kept for backpropagation
pub(crate) struct ForwardCache {
    /// Propagated input features (constant across epochs)
    pub(crate) ax: Array2<f32>,
    /// First layer pre-activation
    pub(crate) h1: Array2<f32>,
    /// Propagated first layer activation
    pub(crate) az: Array2<f32>,
}

/// Parameter gradients, shaped like the model parameters
pub(crate) struct Gradients {
    pub(crate) w1: Array2<f32>,
    pub(crate) b1: Array1<f32>,
    pub(crate) w2: Array2<f32>,
    pub(crate) b2: Array1<f32>,
}

/// Two-layer GCN producing one embedding per node
#[derive(Debug, Clone)]
pub struct EmbeddingModel {
    conv1: GcnLayer,
    conv2: GcnLayer,
}

impl EmbeddingModel {
    pub fn new<R: Rng>(
        in_features: usize,
        hidden_features: usize,
        out_features: usize,
        rng: &mut R,
    ) -> Self {
        Self {
            conv1: GcnLayer::new(in_features, hidden_features, rng),
            conv2: GcnLayer::new(hidden_features, out_features, rng),
        }
    }

    pub fn from_layers(conv1: GcnLayer, conv2: GcnLayer) -> Result<Self> {
        if conv1.out_features() != conv2.in_features() {
            return Err(Error::InvalidDimension {
                expected: conv1.out_features(),
                actual: conv2.in_features(),
            });
        }
        Ok(Self { conv1, conv2 })
    }

    #[inline]
    pub fn in_features(&self) -> usize {
        self.conv1.in_features()
    }

    #[inline]
    pub fn hidden_features(&self) -> usize {
        self.conv1.out_features()
    }

    #[inline]
    pub fn out_features(&self) -> usize {
        self.conv2.out_features()
    }

    pub fn layers(&self) -> (&GcnLayer, &GcnLayer) {
        (&self.conv1, &self.conv2)
    }

    /// Embed every row of `features`.
    ///
    /// `features` must have at least as many rows as `adjacency` has nodes;
    /// extra rows are embedded as isolated nodes. Pure: neither the model
    /// nor the adjacency is modified.
    pub fn forward(&self, adjacency: &Adjacency, features: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_input(adjacency, features)?;
        let z1 = self.conv1.forward(adjacency, features).mapv_into(relu);
        Ok(self.conv2.forward(adjacency, z1.view()))
    }

    fn check_input(&self, adjacency: &Adjacency, features: ArrayView2<f32>) -> Result<()> {
        if features.ncols() != self.in_features() {
            return Err(Error::InvalidDimension {
                expected: self.in_features(),
                actual: features.ncols(),
            });
        }
        if features.nrows() < adjacency.num_nodes() {
            return Err(Error::DataShape(format!(
                "{} feature rows for a graph of {} nodes",
                features.nrows(),
                adjacency.num_nodes()
            )));
        }
        Ok(())
    }

    /// Forward pass from pre-propagated input, keeping activations
    pub(crate) fn forward_cached(&self, adjacency: &Adjacency, ax: Array2<f32>) -> (Array2<f32>, ForwardCache) {
        let h1 = self.conv1.transform(&ax);
        let z1 = h1.mapv(relu);
        let az = adjacency.propagate(z1.view());
        let out = self.conv2.transform(&az);
        (out, ForwardCache { ax, h1, az })
    }

    pub(crate) fn backward(
        &self,
        adjacency: &Adjacency,
        cache: &ForwardCache,
        d_out: &Array2<f32>,
    ) -> Gradients {
        let w2 = cache.az.t().dot(d_out);
        let b2 = d_out.sum_axis(Axis(0));

        let d_az = d_out.dot(&self.conv2.weight.t());
        let mut d_h1 = adjacency.propagate(d_az.view());
        Zip::from(&mut d_h1).and(&cache.h1).for_each(|g, &h| {
            if h <= 0.0 {
                *g = 0.0;
            }
        });

        let w1 = cache.ax.t().dot(&d_h1);
        let b1 = d_h1.sum_axis(Axis(0));

        Gradients { w1, b1, w2, b2 }
    }

    /// Parameters paired with their gradients, in a fixed order
    pub(crate) fn parameters_with<'a>(
        &'a mut self,
        grads: &'a Gradients,
    ) -> Vec<(ArrayViewMutD<'a, f32>, ArrayViewD<'a, f32>)> {
        vec![
            (self.conv1.weight.view_mut().into_dyn(), grads.w1.view().into_dyn()),
            (self.conv1.bias.view_mut().into_dyn(), grads.b1.view().into_dyn()),
            (self.conv2.weight.view_mut().into_dyn(), grads.w2.view().into_dyn()),
            (self.conv2.bias.view_mut().into_dyn(), grads.b2.view().into_dyn()),
        ]
    }
}

#[inline]
fn relu(x: f32) -> f32 {
    x.max(0.0)
}
