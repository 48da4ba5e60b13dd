use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GexError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeoSeriesAccession(String);

impl GeoSeriesAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GeoSeriesAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GeoSeriesAccession {
    type Err = GexError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let digits = normalized.strip_prefix("GSE");
        let is_valid = digits
            .map(|rest| !rest.is_empty() && rest.chars().all(|ch| ch.is_ascii_digit()))
            .unwrap_or(false);
        if !is_valid {
            return Err(GexError::InvalidAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Function a file serves within a detected layout. Exactly one file
/// satisfies each role per sample in the supported layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRole {
    Matrix,
    Barcodes,
    Features,
    Counts,
    Annotation,
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileRole::Matrix => write!(f, "matrix"),
            FileRole::Barcodes => write!(f, "barcodes"),
            FileRole::Features => write!(f, "features"),
            FileRole::Counts => write!(f, "counts"),
            FileRole::Annotation => write!(f, "annotation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    MatrixTriplet,
    Tabular,
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatKind::MatrixTriplet => write!(f, "matrix_triplet"),
            FormatKind::Tabular => write!(f, "tabular"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleDescriptor {
    pub sample_id: String,
    pub roles: BTreeMap<FileRole, PathBuf>,
}

impl SampleDescriptor {
    pub fn new(sample_id: impl Into<String>) -> Self {
        Self {
            sample_id: sample_id.into(),
            roles: BTreeMap::new(),
        }
    }

    pub fn path(&self, role: FileRole) -> Option<&Path> {
        self.roles.get(&role).map(PathBuf::as_path)
    }

    pub fn missing_roles(&self, required: &[FileRole]) -> Vec<FileRole> {
        required
            .iter()
            .copied()
            .filter(|role| !self.roles.contains_key(role))
            .collect()
    }
}

/// Classifier output: the detected layout plus one descriptor per sample,
/// in detection order. `all_files_by_role` keeps every match per role for
/// diagnostics and is never consulted during ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub kind: FormatKind,
    pub samples: Vec<SampleDescriptor>,
    pub all_files_by_role: BTreeMap<FileRole, Vec<PathBuf>>,
}

impl FormatDescriptor {
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}
