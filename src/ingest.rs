use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{FileRole, FormatDescriptor, FormatKind, SampleDescriptor};
use crate::error::GexError;
use crate::fs_util;
use crate::matrix::{ExpressionMatrix, MatrixBuilder, Provenance};

const TRIPLET_ROLES: [FileRole; 3] = [FileRole::Matrix, FileRole::Barcodes, FileRole::Features];

/// Per-call ingestion parameters. `tool_version` is recorded in
/// provenance and passed in explicitly by the caller; `staging_root` is
/// where the scoped per-sample staging directory is created.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub min_cells: u32,
    pub min_features: u32,
    pub label: String,
    pub tool_version: String,
    pub staging_root: PathBuf,
}

/// Outcome of a build: a single matrix for one-sample descriptors, or an
/// ordered per-sample mapping, never both.
#[derive(Debug)]
pub enum MatrixSet {
    Single(ExpressionMatrix),
    PerSample(Vec<(String, ExpressionMatrix)>),
}

impl MatrixSet {
    pub fn matrices(&self) -> Vec<&ExpressionMatrix> {
        match self {
            MatrixSet::Single(matrix) => vec![matrix],
            MatrixSet::PerSample(entries) => {
                entries.iter().map(|(_, matrix)| matrix).collect()
            }
        }
    }
}

/// Dispatches each sample of `format` to the ingestor its kind requires.
/// One sample is returned directly under the project label; several are
/// ingested in descriptor order under `{label}_{sample_id}`, and the
/// first failure aborts the whole call.
pub fn build(
    format: &FormatDescriptor,
    opts: &BuildOptions,
    builder: &dyn MatrixBuilder,
) -> Result<MatrixSet, GexError> {
    if format.samples.is_empty() {
        return Err(GexError::NotDetected);
    }

    if format.sample_count() == 1 {
        let matrix = ingest_sample(format.kind, &format.samples[0], opts, &opts.label, builder)?;
        return Ok(MatrixSet::Single(matrix));
    }

    let mut results = Vec::with_capacity(format.sample_count());
    for sample in &format.samples {
        let label = format!("{}_{}", opts.label, sample.sample_id);
        let matrix = ingest_sample(format.kind, sample, opts, &label, builder)?;
        results.push((sample.sample_id.clone(), matrix));
    }
    Ok(MatrixSet::PerSample(results))
}

fn ingest_sample(
    kind: FormatKind,
    sample: &SampleDescriptor,
    opts: &BuildOptions,
    label: &str,
    builder: &dyn MatrixBuilder,
) -> Result<ExpressionMatrix, GexError> {
    match kind {
        FormatKind::MatrixTriplet => ingest_triplet(sample, opts, label, builder),
        FormatKind::Tabular => ingest_tabular(sample, opts, label, builder),
    }
}

/// Stages the three triplet files under the fixed names the matrix
/// loader expects and constructs the filtered matrix. The staging
/// directory is scoped to this call and removed on every exit path.
pub fn ingest_triplet(
    sample: &SampleDescriptor,
    opts: &BuildOptions,
    label: &str,
    builder: &dyn MatrixBuilder,
) -> Result<ExpressionMatrix, GexError> {
    require_roles(sample, &TRIPLET_ROLES)?;
    let sources: Vec<&Path> = TRIPLET_ROLES
        .iter()
        .map(|role| sample.path(*role).unwrap())
        .collect();
    require_readable(&sources)?;

    fs::create_dir_all(&opts.staging_root)
        .map_err(|err| GexError::Filesystem(err.to_string()))?;
    let staging = tempfile::Builder::new()
        .prefix("gexfetch-stage")
        .tempdir_in(&opts.staging_root)
        .map_err(|err| GexError::Filesystem(err.to_string()))?;

    fs_util::stage_copy(sources[0], staging.path(), "matrix.mtx")?;
    fs_util::stage_copy(sources[1], staging.path(), "barcodes.tsv")?;
    fs_util::stage_copy(sources[2], staging.path(), "features.tsv")?;

    let raw = builder.load_directory(staging.path())?;
    let mut matrix = builder.construct(raw, label, opts.min_cells, opts.min_features)?;
    matrix.provenance = Some(provenance(
        sources.iter().map(|path| path.to_path_buf()).collect(),
        &opts.tool_version,
        None,
    ));
    Ok(matrix)
}

/// Loads a delimited counts file directly, no staging required. The
/// annotation file, when detected, is recorded in provenance but not yet
/// merged into per-cell metadata.
pub fn ingest_tabular(
    sample: &SampleDescriptor,
    opts: &BuildOptions,
    label: &str,
    builder: &dyn MatrixBuilder,
) -> Result<ExpressionMatrix, GexError> {
    require_roles(sample, &[FileRole::Counts])?;
    let counts_path = sample.path(FileRole::Counts).unwrap();
    require_readable(&[counts_path])?;

    let raw = builder.load_tabular(counts_path)?;
    let mut matrix = builder.construct(raw, label, opts.min_cells, opts.min_features)?;

    let mut sources = vec![counts_path.to_path_buf()];
    if let Some(annotation) = sample.path(FileRole::Annotation) {
        sources.push(annotation.to_path_buf());
    }
    matrix.provenance = Some(provenance(
        sources,
        &opts.tool_version,
        Some("tabular".to_string()),
    ));
    Ok(matrix)
}

fn provenance(
    source_files: Vec<PathBuf>,
    tool_version: &str,
    original_format: Option<String>,
) -> Provenance {
    Provenance {
        source_files,
        created_at: chrono::Utc::now().to_rfc3339(),
        tool: format!("gexfetch/{tool_version}"),
        original_format,
    }
}

fn require_roles(sample: &SampleDescriptor, required: &[FileRole]) -> Result<(), GexError> {
    let missing = sample.missing_roles(required);
    if missing.is_empty() {
        return Ok(());
    }
    Err(GexError::MissingRoles {
        sample_id: sample.sample_id.clone(),
        roles: missing
            .iter()
            .map(|role| role.to_string())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

fn require_readable(paths: &[&Path]) -> Result<(), GexError> {
    let missing: Vec<String> = paths
        .iter()
        .filter(|path| !path.is_file())
        .map(|path| path.display().to_string())
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(GexError::SourceMissing(missing.join(", ")))
}
