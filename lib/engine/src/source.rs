//! Program data providers
//!
//! A [`ProgramSource`] returns the full, ordered list of programs each time
//! it is asked. The engine fetches once at startup and again on every
//! retrain request.

use diplomarec_core::{Error, ProgramRecord, Result};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Supplies the current program dataset
pub trait ProgramSource: Send + Sync {
    fn fetch(&self) -> Result<Vec<ProgramRecord>>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Column headers of the program export
pub mod columns {
    pub const NAME: &str = "Nom_Diplôme";
    pub const SCHOOL: &str = "Ecole";
    pub const CITY: &str = "Ville";
    pub const DURATION: &str = "Durée";
    pub const MENTION: &str = "Mention_Bac";
    pub const SUBJECTS: &str = "Matieres_Etudiant";
    pub const TAUGHT_SUBJECTS: &str = "Matieres_Diplome";
    pub const CAREERS: &str = "Career";
    pub const FIELDS: &str = "Filiere";
    pub const EMPLOYMENT: &str = "Employement_Opportunities";
    pub const PREREQUISITES: &str = "Ancienne_Diplome";

    pub const REQUIRED: [&str; 10] = [
        NAME,
        SCHOOL,
        DURATION,
        MENTION,
        SUBJECTS,
        CAREERS,
        FIELDS,
        EMPLOYMENT,
        PREREQUISITES,
        CITY,
    ];
}

/// Reads programs from a CSV export, re-reading the file on every fetch
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

struct ColumnIndex {
    name: usize,
    school: usize,
    city: usize,
    duration: usize,
    mention: usize,
    subjects: usize,
    taught_subjects: Option<usize>,
    careers: usize,
    fields: usize,
    employment: usize,
    prerequisites: usize,
}

impl ColumnIndex {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let position = |name: &str| headers.iter().position(|h| h.trim() == name);

        let missing: Vec<&str> = columns::REQUIRED
            .iter()
            .copied()
            .filter(|c| position(c).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(Error::DataShape(format!(
                "missing required columns: {}",
                missing.join(", ")
            )));
        }

        let required = |name: &str| {
            position(name).ok_or_else(|| Error::DataShape(format!("missing column {}", name)))
        };
        Ok(Self {
            name: required(columns::NAME)?,
            school: required(columns::SCHOOL)?,
            city: required(columns::CITY)?,
            duration: required(columns::DURATION)?,
            mention: required(columns::MENTION)?,
            subjects: required(columns::SUBJECTS)?,
            taught_subjects: position(columns::TAUGHT_SUBJECTS),
            careers: required(columns::CAREERS)?,
            fields: required(columns::FIELDS)?,
            employment: required(columns::EMPLOYMENT)?,
            prerequisites: required(columns::PREREQUISITES)?,
        })
    }
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse_row(row: &csv::StringRecord, index: &ColumnIndex, line: u64) -> Result<ProgramRecord> {
        let cell = |i: usize| row.get(i).unwrap_or("").trim();

        let duration = parse_duration(cell(index.duration)).ok_or_else(|| {
            Error::DataShape(format!(
                "line {}: invalid {} value {:?}",
                line,
                columns::DURATION,
                cell(index.duration)
            ))
        })?;

        Ok(ProgramRecord {
            name: cell(index.name).to_string(),
            school: cell(index.school).to_string(),
            city: cell(index.city).to_string(),
            duration,
            mention: cell(index.mention).to_string(),
            subjects: parse_list(cell(index.subjects)),
            taught_subjects: index
                .taught_subjects
                .map(|i| parse_list(cell(i)))
                .unwrap_or_default(),
            careers: parse_list(cell(index.careers)),
            employment_opportunities: parse_list(cell(index.employment)),
            prerequisites: parse_list(cell(index.prerequisites)),
            fields: parse_list(cell(index.fields)),
        })
    }
}

impl ProgramSource for CsvSource {
    fn fetch(&self) -> Result<Vec<ProgramRecord>> {
        let mut reader = csv::Reader::from_path(&self.path).map_err(|e| {
            Error::DataShape(format!("Failed to open CSV {}: {}", self.path.display(), e))
        })?;

        let headers = reader
            .headers()
            .map_err(|e| Error::DataShape(format!("Failed to read headers: {}", e)))?
            .clone();
        let index = ColumnIndex::from_headers(&headers)?;

        let mut records = Vec::new();
        for (i, row) in reader.records().enumerate() {
            // header is line 1
            let line = i as u64 + 2;
            let row = row.map_err(|e| Error::DataShape(format!("line {}: {}", line, e)))?;
            records.push(Self::parse_row(&row, &index, line)?);
        }

        info!("Loaded {} programs from {}", records.len(), self.path.display());
        Ok(records)
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}

/// In-process dataset, replaceable at runtime
#[derive(Debug, Default)]
pub struct MemorySource {
    records: RwLock<Vec<ProgramRecord>>,
}

impl MemorySource {
    pub fn new(records: Vec<ProgramRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Swap the dataset served by subsequent fetches
    pub fn replace(&self, records: Vec<ProgramRecord>) {
        debug!("Replacing in-memory dataset with {} programs", records.len());
        *self.records.write() = records;
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl ProgramSource for MemorySource {
    fn fetch(&self) -> Result<Vec<ProgramRecord>> {
        Ok(self.records.read().clone())
    }

    fn describe(&self) -> String {
        format!("memory:{} programs", self.len())
    }
}

/// Whole years; accepts `3`, `3.0` and an empty cell (0)
fn parse_duration(cell: &str) -> Option<u32> {
    if cell.is_empty() {
        return Some(0);
    }
    if let Ok(years) = cell.parse::<u32>() {
        return Some(years);
    }
    let years = cell.parse::<f64>().ok()?;
    (years.is_finite() && years >= 0.0 && years.fract() == 0.0 && years <= f64::from(u32::MAX))
        .then_some(years as u32)
}

/// Parse a list cell.
///
/// Accepted forms: `['a', 'b']`, `["a", "b"]`, `a, b`, `a`, `[]` and empty.
/// Quoted items may contain commas.
pub fn parse_list(cell: &str) -> Vec<String> {
    let cell = cell.trim();
    let inner = cell
        .strip_prefix('[')
        .and_then(|c| c.strip_suffix(']'))
        .unwrap_or(cell);

    let mut items = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in inner.chars() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'') | (None, '"') if current.trim().is_empty() => {
                current.clear();
                quote = Some(ch);
            }
            (None, ',') => {
                push_item(&mut items, &current);
                current.clear();
            }
            (None, c) => current.push(c),
        }
    }
    push_item(&mut items, &current);
    items
}

fn push_item(items: &mut Vec<String>, raw: &str) {
    let item = raw.trim();
    if !item.is_empty() {
        items.push(item.to_string());
    }
}
