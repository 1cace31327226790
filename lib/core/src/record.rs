//! Program records
//!
//! A [`ProgramRecord`] is one educational program ("diploma") as exported by
//! the data provider. Records are immutable once loaded; every derived
//! structure (feature vectors, graph nodes, embeddings) refers to them by
//! position in the dataset.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One educational program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProgramRecord {
    pub name: String,
    pub school: String,
    pub city: String,
    /// Program length in years
    pub duration: u32,
    /// Honor mention required at admission, as free text
    pub mention: String,
    /// Student subjects the program expects
    pub subjects: Vec<String>,
    /// Subjects taught inside the program
    #[serde(default)]
    pub taught_subjects: Vec<String>,
    pub careers: Vec<String>,
    pub employment_opportunities: Vec<String>,
    pub prerequisites: Vec<String>,
    pub fields: Vec<String>,
}

impl ProgramRecord {
    pub fn new(name: impl Into<String>, school: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            school: school.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_duration(mut self, duration: u32) -> Self {
        self.duration = duration;
        self
    }

    #[must_use]
    pub fn with_mention(mut self, mention: impl Into<String>) -> Self {
        self.mention = mention.into();
        self
    }

    #[must_use]
    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = city.into();
        self
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

    /// Stable identifier: normalized name and school joined by `_`
    pub fn unique_id(&self) -> UniqueId {
        UniqueId(format!("{}_{}", normalize(&self.name), normalize(&self.school)))
    }

    /// Ordinal rank of the required mention
    pub fn mention_rank(&self) -> u8 {
        Mention::rank_of(&self.mention)
    }
}

fn normalize(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Identifier of a program node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UniqueId(String);

impl UniqueId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Academic honor level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Mention {
    Passable = 0,
    AssezBien = 1,
    Bien = 2,
    TresBien = 3,
}

impl Mention {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "Passable" => Some(Mention::Passable),
            "Assez Bien" => Some(Mention::AssezBien),
            "Bien" => Some(Mention::Bien),
            "Mention Très Bien" | "Très Bien" => Some(Mention::TresBien),
            _ => None,
        }
    }

    /// Rank of a mention label; unknown text ranks 0
    pub fn rank_of(text: &str) -> u8 {
        Self::parse(text).map(|m| m as u8).unwrap_or(0)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mention::Passable => "Passable",
            Mention::AssezBien => "Assez Bien",
            Mention::Bien => "Bien",
            Mention::TresBien => "Mention Très Bien",
        }
    }
}
