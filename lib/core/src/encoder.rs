//! Feature encoding
//!
//! Turns program records and learner queries into fixed-length vectors:
//!
//! ```text
//! [ subjects (multi-hot) | careers (multi-hot) | fields (multi-hot) | duration (z-score) | mention rank ]
//! ```
//!
//! Vocabularies are learned once by [`FeatureEncoder::fit`]; later transforms
//! project onto them and never grow the vector.

use crate::record::{Mention, ProgramRecord};
use crate::vector::Vector;
use crate::{Error, Result};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, warn};

/// Sorted set of category labels with O(1) position lookup
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    labels: Vec<String>,
    index: AHashMap<String, usize>,
}

impl Vocabulary {
    pub fn fit<'a, I>(lists: I) -> Self
    where
        I: IntoIterator<Item = &'a [String]>,
    {
        let labels: BTreeSet<&String> = lists.into_iter().flatten().collect();
        let labels: Vec<String> = labels.into_iter().cloned().collect();
        let index = labels
            .iter()
            .enumerate()
            .map(|(i, label)| (label.clone(), i))
            .collect();
        Self { labels, index }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn contains(&self, label: &str) -> bool {
        self.index.contains_key(label)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Multi-hot encode `values` into `out`, returning the labels that were
    /// not part of the vocabulary.
    fn encode_into<'a>(&self, values: &'a [String], out: &mut [f32]) -> Vec<&'a str> {
        let mut unknown = Vec::new();
        for value in values {
            match self.index.get(value.as_str()) {
                Some(&pos) => out[pos] = 1.0,
                None => unknown.push(value.as_str()),
            }
        }
        unknown
    }
}

/// Standardizes a numeric column to zero mean and unit variance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandardScaler {
    mean: f64,
    scale: f64,
}

impl StandardScaler {
    pub fn fit(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self { mean: 0.0, scale: 1.0 };
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();
        // Constant columns keep their raw offset from the mean
        let scale = if std > f64::EPSILON { std } else { 1.0 };
        Self { mean, scale }
    }

    #[inline]
    pub fn transform(&self, value: f64) -> f32 {
        ((value - self.mean) / self.scale) as f32
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

/// Partial learner profile used as a query.
///
/// Every field is optional: empty lists encode to zeros and act as wildcards
/// in ranking filters, and an absent duration means "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFeatures {
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub careers: Vec<String>,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub mention: Option<String>,
}

impl QueryFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_subjects<I, S>(mut self, subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subjects = subjects.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_careers<I, S>(mut self, careers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.careers = careers.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_duration(mut self, duration: u32) -> Self {
        self.duration = Some(duration);
        self
    }

    #[must_use]
    pub fn with_mention(mut self, mention: impl Into<String>) -> Self {
        self.mention = Some(mention.into());
        self
    }
}

/// Outcome of checking a query against the fitted vocabularies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub is_valid: bool,
    pub diagnostics: Vec<String>,
}

/// Identity of the feature space a model was trained in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFingerprint {
    pub feature_dim: usize,
    /// SHA-256 over the ordered vocabularies
    pub vocabulary_digest: String,
}

impl fmt::Display for FeatureFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.vocabulary_digest.get(..12).unwrap_or(&self.vocabulary_digest);
        write!(f, "{}d/{}", self.feature_dim, short)
    }
}

/// Fitted encoder for program records and queries
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    subjects: Vocabulary,
    careers: Vocabulary,
    fields: Vocabulary,
    duration: StandardScaler,
}

/// Trailing numeric features: duration and mention rank
const NUMERIC_FEATURES: usize = 2;

impl FeatureEncoder {
    /// Learn vocabularies and the duration scaler from `records`.
    pub fn fit(records: &[ProgramRecord]) -> Result<Self> {
        if records.is_empty() {
            return Err(Error::DataShape("cannot fit encoder on an empty dataset".to_string()));
        }

        let subjects = Vocabulary::fit(records.iter().map(|r| r.subjects.as_slice()));
        let careers = Vocabulary::fit(records.iter().map(|r| r.careers.as_slice()));
        let fields = Vocabulary::fit(records.iter().map(|r| r.fields.as_slice()));
        let durations: Vec<f64> = records.iter().map(|r| f64::from(r.duration)).collect();
        let duration = StandardScaler::fit(&durations);

        info!("Valid subjects: {:?}", subjects.labels());
        info!("Valid careers: {:?}", careers.labels());
        info!("Valid filieres: {:?}", fields.labels());

        let encoder = Self { subjects, careers, fields, duration };
        debug!(
            "Encoder fitted: {} records, feature dim {}",
            records.len(),
            encoder.dim()
        );
        Ok(encoder)
    }

    /// Length of every vector this encoder produces
    #[inline]
    pub fn dim(&self) -> usize {
        self.subjects.len() + self.careers.len() + self.fields.len() + NUMERIC_FEATURES
    }

    pub fn subjects(&self) -> &Vocabulary {
        &self.subjects
    }

    pub fn careers(&self) -> &Vocabulary {
        &self.careers
    }

    pub fn fields(&self) -> &Vocabulary {
        &self.fields
    }

    pub fn duration_scaler(&self) -> StandardScaler {
        self.duration
    }

    /// Encode a program record into its canonical feature vector
    pub fn transform(&self, record: &ProgramRecord) -> Vector {
        let (vector, _) = self.encode(
            &record.subjects,
            &record.careers,
            &record.fields,
            self.duration.transform(f64::from(record.duration)),
            record.mention_rank(),
        );
        vector
    }

    /// Encode every record, in order
    pub fn transform_all(&self, records: &[ProgramRecord]) -> Vec<Vector> {
        records.iter().map(|r| self.transform(r)).collect()
    }

    /// Encode a partial learner profile.
    ///
    /// Never fails: unknown categories contribute nothing and are reported
    /// through a warning. An absent duration is scaled as 0 years.
    pub fn encode_query(&self, query: &QueryFeatures) -> Vector {
        let duration = self.duration.transform(f64::from(query.duration.unwrap_or(0)));
        let mention = query.mention.as_deref().map(Mention::rank_of).unwrap_or(0);

        let (vector, unknown) =
            self.encode(&query.subjects, &query.careers, &query.fields, duration, mention);
        if !unknown.is_empty() {
            warn!("Query categories outside the fitted vocabulary ignored: {}", unknown.join(", "));
        }
        vector
    }

    /// Report query values that fall outside the fitted vocabularies
    pub fn validate(&self, query: &QueryFeatures) -> Validation {
        let mut diagnostics = Vec::new();
        for subject in &query.subjects {
            if !self.subjects.contains(subject) {
                diagnostics.push(format!("Subject: {}", subject));
            }
        }
        for career in &query.careers {
            if !self.careers.contains(career) {
                diagnostics.push(format!("Career: {}", career));
            }
        }
        for field in &query.fields {
            if !self.fields.contains(field) {
                diagnostics.push(format!("Filiere: {}", field));
            }
        }

        if !diagnostics.is_empty() {
            warn!("Invalid user inputs: {}", diagnostics.join(", "));
        }

        Validation {
            is_valid: diagnostics.is_empty(),
            diagnostics,
        }
    }

    /// Fingerprint of the fitted feature space
    pub fn fingerprint(&self) -> FeatureFingerprint {
        let mut hasher = Sha256::new();
        for (tag, vocabulary) in [
            ("subjects", &self.subjects),
            ("careers", &self.careers),
            ("fields", &self.fields),
        ] {
            hasher.update(tag.as_bytes());
            hasher.update([0u8]);
            for label in vocabulary.labels() {
                hasher.update(label.as_bytes());
                hasher.update([0u8]);
            }
            hasher.update([0xffu8]);
        }
        FeatureFingerprint {
            feature_dim: self.dim(),
            vocabulary_digest: format!("{:x}", hasher.finalize()),
        }
    }

    fn encode<'a>(
        &self,
        subjects: &'a [String],
        careers: &'a [String],
        fields: &'a [String],
        duration: f32,
        mention: u8,
    ) -> (Vector, Vec<&'a str>) {
        let mut data = vec![0.0f32; self.dim()];
        let mut unknown = Vec::new();

        let careers_at = self.subjects.len();
        let fields_at = careers_at + self.careers.len();
        let numeric_at = fields_at + self.fields.len();

        unknown.extend(self.subjects.encode_into(subjects, &mut data[..careers_at]));
        unknown.extend(self.careers.encode_into(careers, &mut data[careers_at..fields_at]));
        unknown.extend(self.fields.encode_into(fields, &mut data[fields_at..numeric_at]));
        data[numeric_at] = duration;
        data[numeric_at + 1] = f32::from(mention);

        (Vector::new(data), unknown)
    }
}
