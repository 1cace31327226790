//! # diplomarec Core
//!
//! Core library for the diplomarec recommendation engine.
//!
//! This crate provides the data model and the deterministic parts of the
//! pipeline:
//!
//! - [`ProgramRecord`] - One educational program and its categorical attributes
//! - [`FeatureEncoder`] - Vocabulary/scaler fitting and fixed-length encoding
//! - [`SimilarityGraphBuilder`] - Cosine-threshold graph over programs
//! - [`DatasetHash`] - Content fingerprint used to gate retraining
//!
//! ## Example
//!
//! ```rust
//! use diplomarec_core::{FeatureEncoder, ProgramRecord, QueryFeatures, SimilarityGraphBuilder};
//!
//! let records = vec![
//!     ProgramRecord::new("Licence Physique", "FS Rabat")
//!         .with_duration(3)
//!         .with_subjects(["Physique", "Chimie"])
//!         .with_fields(["SP"]),
//!     ProgramRecord::new("Licence Chimie", "FS Rabat")
//!         .with_duration(3)
//!         .with_subjects(["Chimie"])
//!         .with_fields(["SP"]),
//! ];
//!
//! let encoder = FeatureEncoder::fit(&records).unwrap();
//! let vectors = encoder.transform_all(&records);
//! let labels = records.iter().map(|r| r.unique_id()).collect();
//! let graph = SimilarityGraphBuilder::default().build(labels, vectors).unwrap();
//!
//! let query = encoder.encode_query(&QueryFeatures::new().with_subjects(["Physique"]));
//! assert_eq!(query.dim(), encoder.dim());
//! assert_eq!(graph.node_count(), 2);
//! ```

pub mod encoder;
pub mod error;
pub mod graph;
pub mod hash;
pub mod record;
pub mod vector;

pub use encoder::{FeatureEncoder, FeatureFingerprint, QueryFeatures, StandardScaler, Validation, Vocabulary};
pub use error::{Error, Result};
pub use graph::{Edge, Node, NodeId, SimilarityGraph, SimilarityGraphBuilder, DEFAULT_SIMILARITY_THRESHOLD};
pub use hash::DatasetHash;
pub use record::{Mention, ProgramRecord, UniqueId};
pub use vector::{cosine_similarity, Vector};
