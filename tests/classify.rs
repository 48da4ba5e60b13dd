use std::path::{Path, PathBuf};

use assert_matches::assert_matches;

use gexfetch::classify::classify;
use gexfetch::domain::{FileRole, FormatKind};
use gexfetch::error::GexError;

fn paths(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(PathBuf::from).collect()
}

#[test]
fn detects_compressed_matrix_triplet() {
    let format = classify(&paths(&[
        "/d/matrix.mtx.gz",
        "/d/barcodes.tsv.gz",
        "/d/features.tsv.gz",
    ]))
    .unwrap();

    assert_eq!(format.kind, FormatKind::MatrixTriplet);
    assert_eq!(format.sample_count(), 1);
    let sample = &format.samples[0];
    assert_eq!(sample.sample_id, "sample1");
    assert_eq!(
        sample.path(FileRole::Matrix).unwrap(),
        Path::new("/d/matrix.mtx.gz")
    );
    assert_eq!(
        sample.path(FileRole::Barcodes).unwrap(),
        Path::new("/d/barcodes.tsv.gz")
    );
    assert_eq!(
        sample.path(FileRole::Features).unwrap(),
        Path::new("/d/features.tsv.gz")
    );
}

#[test]
fn detects_uncompressed_matrix_triplet() {
    let format = classify(&paths(&[
        "/d/GSE1_matrix.mtx",
        "/d/GSE1_barcodes.tsv",
        "/d/GSE1_features.tsv",
        "/d/readme.txt",
    ]))
    .unwrap();
    assert_eq!(format.kind, FormatKind::MatrixTriplet);
    assert_eq!(format.sample_count(), 1);
}

#[test]
fn legacy_genes_tsv_serves_as_features() {
    let format = classify(&paths(&[
        "/d/matrix.mtx.gz",
        "/d/barcodes.tsv.gz",
        "/d/genes.tsv.gz",
    ]))
    .unwrap();
    assert_eq!(
        format.samples[0].path(FileRole::Features).unwrap(),
        Path::new("/d/genes.tsv.gz")
    );
}

#[test]
fn incomplete_triplet_is_not_detected() {
    // Barcodes are present but no matrix and no feature file.
    let err = classify(&paths(&["/d/barcodes.tsv.gz", "/d/readme.txt"])).unwrap_err();
    assert_matches!(err, GexError::NotDetected);
}

#[test]
fn ambiguous_multi_matrix_degenerates_to_first_match() {
    let format = classify(&paths(&[
        "/d/s2_matrix.mtx.gz",
        "/d/s1_matrix.mtx.gz",
        "/d/barcodes.tsv.gz",
        "/d/features.tsv.gz",
    ]))
    .unwrap();

    // One degraded sample built from the first matrix match in list
    // order, not filename order.
    assert_eq!(format.sample_count(), 1);
    assert_eq!(
        format.samples[0].path(FileRole::Matrix).unwrap(),
        Path::new("/d/s2_matrix.mtx.gz")
    );
    // Diagnostics still see every match.
    assert_eq!(format.all_files_by_role[&FileRole::Matrix].len(), 2);
}

#[test]
fn detects_tabular_counts_only() {
    let format = classify(&paths(&["/d/gene_count.csv.gz"])).unwrap();
    assert_eq!(format.kind, FormatKind::Tabular);
    assert_eq!(format.sample_count(), 1);
    let sample = &format.samples[0];
    assert!(sample.path(FileRole::Counts).is_some());
    assert!(sample.path(FileRole::Annotation).is_none());
}

#[test]
fn detects_tabular_with_annotation() {
    let format = classify(&paths(&[
        "/d/GSE2_counts.csv",
        "/d/GSE2_cell_annotation.csv",
    ]))
    .unwrap();
    let sample = &format.samples[0];
    assert_eq!(
        sample.path(FileRole::Annotation).unwrap(),
        Path::new("/d/GSE2_cell_annotation.csv")
    );
}

#[test]
fn unrelated_files_are_not_detected() {
    let err = classify(&paths(&["/d/readme.txt"])).unwrap_err();
    assert_matches!(err, GexError::NotDetected);
}

#[test]
fn classification_depends_on_basenames_only() {
    let first = classify(&paths(&[
        "/a/matrix.mtx.gz",
        "/a/barcodes.tsv.gz",
        "/a/features.tsv.gz",
    ]))
    .unwrap();
    let second = classify(&paths(&[
        "/x/y/z/matrix.mtx.gz",
        "/q/barcodes.tsv.gz",
        "/r/deep/features.tsv.gz",
    ]))
    .unwrap();

    assert_eq!(first.kind, second.kind);
    assert_eq!(first.sample_count(), second.sample_count());
    // Same roles, different stored paths.
    assert_eq!(
        second.samples[0].path(FileRole::Matrix).unwrap(),
        Path::new("/x/y/z/matrix.mtx.gz")
    );
}
