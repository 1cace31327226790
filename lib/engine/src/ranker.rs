//! Query embedding and candidate ranking
//!
//! The query is encoded like a program, appended to the snapshot's feature
//! matrix as an isolated node and pushed through the model. Candidates that
//! pass the hard filters are scored by
//!
//! ```text
//! composite = w_sim · cos(query, program) + w_subj · subject_overlap
//!           + w_career · career_overlap + w_field · field_overlap
//! ```
//!
//! and returned best first.

use crate::snapshot::Snapshot;
use ahash::AHashSet;
use diplomarec_core::{cosine_similarity, Error, ProgramRecord, QueryFeatures, Result};
use ndarray::{concatenate, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// Weights of the composite score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub similarity: f32,
    pub subject: f32,
    pub career: f32,
    pub field: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            similarity: 0.5,
            subject: 0.2,
            career: 0.2,
            field: 0.1,
        }
    }
}

/// One ranked program with its score breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub name: String,
    pub school: String,
    pub city: String,
    pub duration: u32,
    pub mention: String,
    pub subjects: Vec<String>,
    pub taught_subjects: Vec<String>,
    pub careers: Vec<String>,
    pub employment_opportunities: Vec<String>,
    pub prerequisites: Vec<String>,
    pub fields: Vec<String>,
    /// Cosine similarity of query and program embeddings
    pub similarity: f32,
    pub subject_overlap: f32,
    pub career_overlap: f32,
    pub field_overlap: f32,
    /// Composite score × 100
    pub match_percentage: f32,
}

impl Recommendation {
    fn from_record(record: &ProgramRecord, scores: Scores) -> Self {
        Self {
            name: record.name.clone(),
            school: record.school.clone(),
            city: record.city.clone(),
            duration: record.duration,
            mention: record.mention.clone(),
            subjects: record.subjects.clone(),
            taught_subjects: record.taught_subjects.clone(),
            careers: record.careers.clone(),
            employment_opportunities: record.employment_opportunities.clone(),
            prerequisites: record.prerequisites.clone(),
            fields: record.fields.clone(),
            similarity: scores.similarity,
            subject_overlap: scores.subject,
            career_overlap: scores.career,
            field_overlap: scores.field,
            match_percentage: scores.composite * 100.0,
        }
    }

    /// Composite score in `[-0.5, 1]`
    pub fn composite(&self) -> f32 {
        self.match_percentage / 100.0
    }
}

#[derive(Debug, Clone, Copy)]
struct Scores {
    similarity: f32,
    subject: f32,
    career: f32,
    field: f32,
    composite: f32,
}

/// Ranks the programs of one snapshot against queries
pub struct PredictionRanker<'a> {
    snapshot: &'a Snapshot,
    weights: ScoreWeights,
}

impl<'a> PredictionRanker<'a> {
    pub fn new(snapshot: &'a Snapshot, weights: ScoreWeights) -> Self {
        Self { snapshot, weights }
    }

    /// Embed the query as a transient node appended to the graph
    pub fn embed_query(&self, query: &QueryFeatures) -> Result<Vec<f32>> {
        let encoded = self.snapshot.encoder().encode_query(query);
        let dim = encoded.dim();
        let row = Array2::from_shape_vec((1, dim), encoded.into_inner())
            .map_err(|e| Error::Encoding(format!("query vector: {}", e)))?;
        let features = self.snapshot.features();
        if features.ncols() != dim {
            return Err(Error::InvalidDimension {
                expected: features.ncols(),
                actual: dim,
            });
        }

        let extended = concatenate(Axis(0), &[features.view(), row.view()])
            .map_err(|e| Error::Encoding(format!("query node: {}", e)))?;
        let embeddings = self
            .snapshot
            .model()
            .forward(self.snapshot.adjacency(), extended.view())?;

        Ok(embeddings.row(features.nrows()).to_vec())
    }

    /// Rank candidate programs for `query`.
    ///
    /// Filters are wildcards when the query side is empty: fields and careers
    /// when the query lists none, duration unless `desired_duration` is a
    /// positive number of years. An empty result is not an error.
    pub fn rank(
        &self,
        query: &QueryFeatures,
        desired_duration: Option<u32>,
        top_k: usize,
    ) -> Result<Vec<Recommendation>> {
        let query_embedding = self.embed_query(query)?;

        let subjects = distinct(&query.subjects);
        let careers = distinct(&query.careers);
        let fields = distinct(&query.fields);
        let duration = desired_duration.filter(|&d| d > 0);

        let records = self.snapshot.records();
        let mut ranked: Vec<(usize, Scores)> = records
            .iter()
            .enumerate()
            .filter(|(_, record)| {
                (fields.is_empty() || intersects(&fields, &record.fields))
                    && duration.map_or(true, |d| record.duration == d)
                    && (careers.is_empty() || intersects(&careers, &record.careers))
            })
            .map(|(i, record)| {
                let embedding = self.snapshot.embeddings().row(i);
                let similarity = match embedding.as_slice() {
                    Some(row) => cosine_similarity(&query_embedding, row),
                    None => cosine_similarity(&query_embedding, &embedding.to_vec()),
                };
                (i, self.score(similarity, &subjects, &careers, &fields, record))
            })
            .collect();

        debug!(
            "{} of {} programs pass filters",
            ranked.len(),
            records.len()
        );

        ranked.sort_by(|a, b| {
            b.1.composite
                .partial_cmp(&a.1.composite)
                .unwrap_or(Ordering::Equal)
        });

        let mut seen = AHashSet::new();
        let recommendations = ranked
            .into_iter()
            .filter(|(i, _)| {
                let record = &records[*i];
                seen.insert((record.name.as_str(), record.school.as_str()))
            })
            .take(top_k)
            .map(|(i, scores)| Recommendation::from_record(&records[i], scores))
            .collect();

        Ok(recommendations)
    }

    fn score(
        &self,
        similarity: f32,
        subjects: &[&str],
        careers: &[&str],
        fields: &[&str],
        record: &ProgramRecord,
    ) -> Scores {
        let subject = overlap(subjects, &record.subjects);
        let career = overlap(careers, &record.careers);
        let field = overlap(fields, &record.fields);
        let w = &self.weights;
        Scores {
            similarity,
            subject,
            career,
            field,
            composite: w.similarity * similarity
                + w.subject * subject
                + w.career * career
                + w.field * field,
        }
    }
}

/// Query values without repeats, in first-seen order
fn distinct(values: &[String]) -> Vec<&str> {
    let mut seen = AHashSet::with_capacity(values.len());
    values
        .iter()
        .map(String::as_str)
        .filter(|v| seen.insert(*v))
        .collect()
}

fn intersects(query: &[&str], candidate: &[String]) -> bool {
    candidate.iter().any(|c| query.contains(&c.as_str()))
}

/// Share of query values the candidate carries
fn overlap(query: &[&str], candidate: &[String]) -> f32 {
    let hits = query
        .iter()
        .filter(|&&q| candidate.iter().any(|c| c.as_str() == q))
        .count();
    hits as f32 / query.len().max(1) as f32
}
