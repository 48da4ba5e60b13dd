use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::domain::{FileRole, FormatDescriptor, FormatKind, SampleDescriptor};
use crate::error::GexError;

static MATRIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)matrix\.mtx(\.gz)?$").unwrap());
static BARCODES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)barcodes\.tsv(\.gz)?$").unwrap());
static FEATURES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)features\.tsv(\.gz)?$").unwrap());
static GENES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)genes\.tsv(\.gz)?$").unwrap());
static COUNTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)count.*\.csv(\.gz)?$").unwrap());
static ANNOTATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(anno|index|barcode|meta).*\.csv(\.gz)?$").unwrap());

/// Detects the expression layout among `paths`, evaluating the supported
/// layouts in fixed priority order: the 10x-style matrix triplet first,
/// then a single tabular counts file. Matching is case-insensitive and
/// looks at basenames only; directory components are preserved in the
/// returned descriptor but never influence detection. No disk access.
pub fn classify(paths: &[PathBuf]) -> Result<FormatDescriptor, GexError> {
    if let Some(descriptor) = detect_matrix_triplet(paths) {
        return Ok(descriptor);
    }
    if let Some(descriptor) = detect_tabular(paths) {
        return Ok(descriptor);
    }
    Err(GexError::NotDetected)
}

fn detect_matrix_triplet(paths: &[PathBuf]) -> Option<FormatDescriptor> {
    let matrix = matches_for(&MATRIX_RE, paths);
    let barcodes = matches_for(&BARCODES_RE, paths);
    let features = matches_for(&FEATURES_RE, paths);
    let genes = matches_for(&GENES_RE, paths);

    // Legacy CellRanger v2 output names the feature file genes.tsv.
    let feature_files = if features.is_empty() { genes } else { features };

    if matrix.is_empty() || barcodes.is_empty() || feature_files.is_empty() {
        return None;
    }

    if matrix.len() > 1 {
        warn!(
            matrix_files = matrix.len(),
            "multiple matrix files detected; multi-sample grouping is unsupported, \
             ingesting only the first matrix/barcodes/features match"
        );
    }

    let mut sample = SampleDescriptor::new("sample1");
    sample.roles.insert(FileRole::Matrix, matrix[0].clone());
    sample.roles.insert(FileRole::Barcodes, barcodes[0].clone());
    sample
        .roles
        .insert(FileRole::Features, feature_files[0].clone());

    let mut all_files = BTreeMap::new();
    all_files.insert(FileRole::Matrix, matrix);
    all_files.insert(FileRole::Barcodes, barcodes);
    all_files.insert(FileRole::Features, feature_files);

    Some(FormatDescriptor {
        kind: FormatKind::MatrixTriplet,
        samples: vec![sample],
        all_files_by_role: all_files,
    })
}

fn detect_tabular(paths: &[PathBuf]) -> Option<FormatDescriptor> {
    let counts = matches_for(&COUNTS_RE, paths);
    if counts.is_empty() {
        return None;
    }
    let annotation = matches_for(&ANNOTATION_RE, paths);

    let mut sample = SampleDescriptor::new("sample1");
    sample.roles.insert(FileRole::Counts, counts[0].clone());
    if let Some(first) = annotation.first() {
        // Attached but not consumed by ingestion yet; reserved.
        sample.roles.insert(FileRole::Annotation, first.clone());
    }

    let mut all_files = BTreeMap::new();
    all_files.insert(FileRole::Counts, counts);
    if !annotation.is_empty() {
        all_files.insert(FileRole::Annotation, annotation);
    }

    Some(FormatDescriptor {
        kind: FormatKind::Tabular,
        samples: vec![sample],
        all_files_by_role: all_files,
    })
}

fn matches_for(pattern: &Regex, paths: &[PathBuf]) -> Vec<PathBuf> {
    paths
        .iter()
        .filter(|path| {
            basename(path)
                .map(|name| pattern.is_match(name))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

fn basename(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}
