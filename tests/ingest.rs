use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use assert_matches::assert_matches;
use flate2::Compression;
use flate2::write::GzEncoder;

use gexfetch::classify::classify;
use gexfetch::domain::{FileRole, FormatDescriptor, FormatKind, SampleDescriptor};
use gexfetch::error::GexError;
use gexfetch::ingest::{BuildOptions, MatrixSet, build, ingest_triplet};
use gexfetch::matrix::SprsMatrixBuilder;

const MTX: &str = "\
%%MatrixMarket matrix coordinate integer general
%
3 2 4
1 1 5
2 1 1
3 2 2
1 2 3
";
const BARCODES: &str = "AAACCCAAGAAACACT-1\nTTTGGTTTCTTTAGTC-1\n";
const FEATURES: &str = "ENSG01\tTP53\tGene Expression\nENSG02\tBRCA1\tGene Expression\nENSG03\tEGFR\tGene Expression\n";

fn write_plain(path: &Path, content: &str) {
    fs::write(path, content).unwrap();
}

fn write_gz(path: &Path, content: &str) {
    let file = fs::File::create(path).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    encoder.finish().unwrap();
}

fn write_triplet(dir: &Path, gz: bool) -> Vec<PathBuf> {
    let suffix = if gz { ".gz" } else { "" };
    let matrix = dir.join(format!("GSE9_matrix.mtx{suffix}"));
    let barcodes = dir.join(format!("GSE9_barcodes.tsv{suffix}"));
    let features = dir.join(format!("GSE9_features.tsv{suffix}"));
    if gz {
        write_gz(&matrix, MTX);
        write_gz(&barcodes, BARCODES);
        write_gz(&features, FEATURES);
    } else {
        write_plain(&matrix, MTX);
        write_plain(&barcodes, BARCODES);
        write_plain(&features, FEATURES);
    }
    vec![matrix, barcodes, features]
}

fn triplet_sample(id: &str, files: &[PathBuf]) -> SampleDescriptor {
    let mut sample = SampleDescriptor::new(id);
    sample.roles.insert(FileRole::Matrix, files[0].clone());
    sample.roles.insert(FileRole::Barcodes, files[1].clone());
    sample.roles.insert(FileRole::Features, files[2].clone());
    sample
}

fn two_sample_descriptor(dir: &Path) -> (FormatDescriptor, Vec<PathBuf>, Vec<PathBuf>) {
    let dir_a = dir.join("a");
    let dir_b = dir.join("b");
    fs::create_dir_all(&dir_a).unwrap();
    fs::create_dir_all(&dir_b).unwrap();
    let files_a = write_triplet(&dir_a, false);
    let files_b = write_triplet(&dir_b, false);

    let format = FormatDescriptor {
        kind: FormatKind::MatrixTriplet,
        samples: vec![
            triplet_sample("sample1", &files_a),
            triplet_sample("sample2", &files_b),
        ],
        all_files_by_role: BTreeMap::new(),
    };
    (format, files_a, files_b)
}

fn options(staging_root: &Path) -> BuildOptions {
    BuildOptions {
        min_cells: 0,
        min_features: 0,
        label: "proj".to_string(),
        tool_version: "0.0.0".to_string(),
        staging_root: staging_root.to_path_buf(),
    }
}

fn staging_is_empty(staging_root: &Path) -> bool {
    !staging_root.exists() || fs::read_dir(staging_root).unwrap().next().is_none()
}

#[test]
fn triplet_round_trip_at_zero_thresholds() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_triplet(dir.path(), false);
    let staging = dir.path().join("staging");

    let format = classify(&files).unwrap();
    let opts = options(&staging);
    let set = build(&format, &opts, &SprsMatrixBuilder).unwrap();

    let matrix = match set {
        MatrixSet::Single(matrix) => matrix,
        MatrixSet::PerSample(_) => panic!("expected single matrix"),
    };
    assert_eq!(matrix.n_genes(), 3);
    assert_eq!(matrix.n_cells(), 2);
    assert_eq!(matrix.label, "proj");
    assert_eq!(matrix.genes, vec!["TP53", "BRCA1", "EGFR"]);

    let provenance = matrix.provenance.unwrap();
    assert_eq!(provenance.source_files, files);
    assert_eq!(provenance.original_format, None);
    assert!(staging_is_empty(&staging));
}

#[test]
fn compressed_triplet_ingests_identically() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_triplet(dir.path(), true);
    let staging = dir.path().join("staging");

    let format = classify(&files).unwrap();
    let set = build(&format, &options(&staging), &SprsMatrixBuilder).unwrap();

    let matrix = match set {
        MatrixSet::Single(matrix) => matrix,
        MatrixSet::PerSample(_) => panic!("expected single matrix"),
    };
    assert_eq!(matrix.n_genes(), 3);
    assert_eq!(matrix.n_cells(), 2);
    assert!(staging_is_empty(&staging));
}

#[test]
fn strict_thresholds_still_return_a_single_matrix() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_triplet(dir.path(), true);
    let staging = dir.path().join("staging");

    let format = classify(&files).unwrap();
    let mut opts = options(&staging);
    opts.min_cells = 3;
    opts.min_features = 200;

    // Thresholds the tiny fixture cannot meet still produce one
    // well-formed (empty) matrix, not an error.
    let set = build(&format, &opts, &SprsMatrixBuilder).unwrap();
    assert_matches!(set, MatrixSet::Single(_));
}

#[test]
fn multi_sample_descriptor_yields_per_sample_matrices_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().join("staging");
    let (format, files_a, files_b) = two_sample_descriptor(dir.path());

    let set = build(&format, &options(&staging), &SprsMatrixBuilder).unwrap();
    let entries = match set {
        MatrixSet::PerSample(entries) => entries,
        MatrixSet::Single(_) => panic!("expected per-sample matrices"),
    };

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].0, "sample1");
    assert_eq!(entries[1].0, "sample2");
    assert_eq!(entries[0].1.label, "proj_sample1");
    assert_eq!(entries[1].1.label, "proj_sample2");
    assert_eq!(entries[0].1.provenance.as_ref().unwrap().source_files, files_a);
    assert_eq!(entries[1].1.provenance.as_ref().unwrap().source_files, files_b);
    assert!(staging_is_empty(&staging));
}

#[test]
fn multi_sample_build_aborts_on_first_broken_sample() {
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().join("staging");
    let (format, files_a, _files_b) = two_sample_descriptor(dir.path());
    fs::write(&files_a[0], "this is not a matrix\n").unwrap();

    let err = build(&format, &options(&staging), &SprsMatrixBuilder).unwrap_err();
    assert_matches!(err, GexError::Ingestion(_));
    assert!(staging_is_empty(&staging));
}

#[test]
fn build_is_idempotent_up_to_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_triplet(dir.path(), false);
    let staging = dir.path().join("staging");

    let format = classify(&files).unwrap();
    let opts = options(&staging);
    let first = build(&format, &opts, &SprsMatrixBuilder).unwrap();
    let second = build(&format, &opts, &SprsMatrixBuilder).unwrap();

    let (first, second) = match (first, second) {
        (MatrixSet::Single(a), MatrixSet::Single(b)) => (a, b),
        _ => panic!("expected single matrices"),
    };
    assert_eq!(first.n_genes(), second.n_genes());
    assert_eq!(first.n_cells(), second.n_cells());
    assert_eq!(
        first.provenance.unwrap().source_files,
        second.provenance.unwrap().source_files
    );
}

#[test]
fn missing_role_fails_before_staging() {
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().join("staging");

    let mut sample = SampleDescriptor::new("sample1");
    sample
        .roles
        .insert(FileRole::Matrix, dir.path().join("matrix.mtx"));

    let err = ingest_triplet(&sample, &options(&staging), "proj", &SprsMatrixBuilder).unwrap_err();
    assert_matches!(err, GexError::MissingRoles { ref roles, .. } if roles.contains("barcodes") && roles.contains("features"));
    assert!(staging_is_empty(&staging));
}

#[test]
fn nonexistent_sources_fail_before_staging() {
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().join("staging");

    let mut sample = SampleDescriptor::new("sample1");
    sample
        .roles
        .insert(FileRole::Matrix, dir.path().join("matrix.mtx"));
    sample
        .roles
        .insert(FileRole::Barcodes, dir.path().join("barcodes.tsv"));
    sample
        .roles
        .insert(FileRole::Features, dir.path().join("features.tsv"));

    let err = ingest_triplet(&sample, &options(&staging), "proj", &SprsMatrixBuilder).unwrap_err();
    assert_matches!(err, GexError::SourceMissing(_));
}

#[test]
fn empty_source_fails_copy_and_cleans_staging() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_triplet(dir.path(), false);
    // Corrupt the matrix file.
    fs::write(&files[0], b"").unwrap();
    let staging = dir.path().join("staging");

    let format = classify(&files).unwrap();
    let err = build(&format, &options(&staging), &SprsMatrixBuilder).unwrap_err();
    assert_matches!(err, GexError::Copy(_));
    assert!(staging_is_empty(&staging));
}

#[test]
fn corrupt_matrix_fails_ingestion_and_cleans_staging() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_triplet(dir.path(), false);
    fs::write(&files[0], "this is not a matrix\n").unwrap();
    let staging = dir.path().join("staging");

    let format = classify(&files).unwrap();
    let err = build(&format, &options(&staging), &SprsMatrixBuilder).unwrap_err();
    assert_matches!(err, GexError::Ingestion(_));
    assert!(staging_is_empty(&staging));
}

#[test]
fn dimension_mismatch_is_an_ingestion_error() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_triplet(dir.path(), false);
    // One barcode too few.
    fs::write(&files[1], "AAACCCAAGAAACACT-1\n").unwrap();
    let staging = dir.path().join("staging");

    let format = classify(&files).unwrap();
    let err = build(&format, &options(&staging), &SprsMatrixBuilder).unwrap_err();
    assert_matches!(err, GexError::Ingestion(_));
    assert!(staging_is_empty(&staging));
}
