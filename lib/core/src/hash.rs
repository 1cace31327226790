//! Dataset change detection

use crate::record::ProgramRecord;
use crate::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Content fingerprint of a full program dataset.
///
/// Only meaningful for equality: two datasets hash equal exactly when their
/// canonical forms (records in order, every field) are identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetHash(String);

impl DatasetHash {
    /// Hash the canonical JSON form of `records`
    pub fn of(records: &[ProgramRecord]) -> Result<Self> {
        let canonical = serde_json::to_vec(records)?;
        Ok(Self(format!("{:x}", Sha256::digest(&canonical))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for DatasetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
