//! Program similarity graph
//!
//! Nodes are programs in dataset order; an undirected edge joins two programs
//! whose feature vectors have a cosine similarity strictly above the
//! threshold. The graph is rebuilt from scratch on every training cycle.

use crate::record::UniqueId;
use crate::vector::{cosine_similarity, Vector};
use crate::{Error, Result};
use ahash::AHashSet;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Index of a node in the graph (its position in the dataset)
pub type NodeId = usize;

/// Default cosine similarity threshold for linking two programs
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub label: UniqueId,
    pub features: Vector,
}

/// Undirected weighted edge with `from < to`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub weight: f32,
}

impl Node {
    #[inline]
    #[must_use]
    pub fn new(id: NodeId, label: UniqueId, features: Vector) -> Self {
        Self { id, label, features }
    }
}

impl Edge {
    #[inline]
    #[must_use]
    pub fn new(from: NodeId, to: NodeId, weight: f32) -> Self {
        let (from, to) = if from <= to { (from, to) } else { (to, from) };
        Self { from, to, weight }
    }
}

/// Immutable similarity graph over program nodes
#[derive(Debug, Clone, Default)]
pub struct SimilarityGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    edge_set: AHashSet<(NodeId, NodeId)>,
    threshold: f32,
}

impl SimilarityGraph {
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Edges as `(from, to)` index pairs
    pub fn edge_index(&self) -> Vec<(NodeId, NodeId)> {
        self.edges.iter().map(|e| (e.from, e.to)).collect()
    }

    /// Whether `a` and `b` are connected, in either direction
    #[inline]
    pub fn has_edge(&self, a: NodeId, b: NodeId) -> bool {
        let key = if a <= b { (a, b) } else { (b, a) };
        self.edge_set.contains(&key)
    }

    /// Number of connected components (isolated nodes count as one each)
    pub fn connected_components(&self) -> usize {
        let mut parent: Vec<usize> = (0..self.nodes.len()).collect();

        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }

        let mut components = self.nodes.len();
        for edge in &self.edges {
            let a = find(&mut parent, edge.from);
            let b = find(&mut parent, edge.to);
            if a != b {
                parent[a] = b;
                components -= 1;
            }
        }
        components
    }
}

/// Builds a [`SimilarityGraph`] from node feature vectors
#[derive(Debug, Clone, Copy)]
pub struct SimilarityGraphBuilder {
    threshold: f32,
}

impl Default for SimilarityGraphBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl SimilarityGraphBuilder {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Build the graph.
    ///
    /// Computes the full pairwise similarity matrix, so cost grows as O(n²)
    /// in the number of programs.
    pub fn build(&self, labels: Vec<UniqueId>, vectors: Vec<Vector>) -> Result<SimilarityGraph> {
        if labels.len() != vectors.len() {
            return Err(Error::DataShape(format!(
                "{} node labels for {} feature vectors",
                labels.len(),
                vectors.len()
            )));
        }

        let threshold = self.threshold;
        let edges: Vec<Edge> = (0..vectors.len())
            .into_par_iter()
            .flat_map_iter(|i| {
                let row = vectors[i].as_slice();
                let vectors = &vectors;
                (i + 1..vectors.len()).filter_map(move |j| {
                    let similarity = cosine_similarity(row, vectors[j].as_slice());
                    (similarity > threshold).then(|| Edge::new(i, j, similarity))
                })
            })
            .collect();

        let edge_set = edges.iter().map(|e| (e.from, e.to)).collect();
        let nodes = labels
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(id, (label, features))| Node::new(id, label, features))
            .collect();

        let graph = SimilarityGraph {
            nodes,
            edges,
            edge_set,
            threshold,
        };

        info!(
            "Graph created with {} nodes and {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        info!("Connected components: {}", graph.connected_components());

        Ok(graph)
    }
}
