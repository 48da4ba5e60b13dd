use std::io::BufRead;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sprs::{CsMat, TriMat};

use crate::error::GexError;
use crate::fs_util;

/// Unfiltered matrix as loaded from disk: genes are rows, cells columns.
#[derive(Debug, Clone)]
pub struct RawMatrix {
    pub genes: Vec<String>,
    pub cells: Vec<String>,
    pub counts: CsMat<f64>,
}

/// Origin and construction parameters of a produced matrix. The tool
/// version is supplied by the caller at ingestion time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub source_files: Vec<PathBuf>,
    pub created_at: String,
    pub tool: String,
    pub original_format: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExpressionMatrix {
    pub label: String,
    pub genes: Vec<String>,
    pub cells: Vec<String>,
    pub counts: CsMat<f64>,
    pub provenance: Option<Provenance>,
}

impl ExpressionMatrix {
    pub fn n_genes(&self) -> usize {
        self.genes.len()
    }

    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn summary(&self) -> MatrixSummary {
        MatrixSummary {
            label: self.label.clone(),
            n_genes: self.n_genes(),
            n_cells: self.n_cells(),
            source_files: self
                .provenance
                .as_ref()
                .map(|prov| {
                    prov.source_files
                        .iter()
                        .map(|path| path.display().to_string())
                        .collect()
                })
                .unwrap_or_default(),
            created_at: self
                .provenance
                .as_ref()
                .map(|prov| prov.created_at.clone()),
            tool: self.provenance.as_ref().map(|prov| prov.tool.clone()),
            original_format: self
                .provenance
                .as_ref()
                .and_then(|prov| prov.original_format.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatrixSummary {
    pub label: String,
    pub n_genes: usize,
    pub n_cells: usize,
    pub source_files: Vec<String>,
    pub created_at: Option<String>,
    pub tool: Option<String>,
    pub original_format: Option<String>,
}

pub trait MatrixBuilder: Send + Sync {
    /// Loads a staged matrix-triplet directory (fixed names `matrix.mtx`,
    /// `barcodes.tsv`, `features.tsv`, each optionally gzipped).
    fn load_directory(&self, dir: &Path) -> Result<RawMatrix, GexError>;

    /// Loads a delimited counts file: first column gene ids, first row
    /// cell ids.
    fn load_tabular(&self, path: &Path) -> Result<RawMatrix, GexError>;

    /// Applies the inclusive `min_cells`/`min_features` thresholds and
    /// labels the result. A gene survives if it is expressed in at least
    /// `min_cells` cells; a cell survives if it expresses at least
    /// `min_features` genes. Both counts are taken on the raw matrix.
    fn construct(
        &self,
        raw: RawMatrix,
        label: &str,
        min_cells: u32,
        min_features: u32,
    ) -> Result<ExpressionMatrix, GexError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SprsMatrixBuilder;

impl MatrixBuilder for SprsMatrixBuilder {
    fn load_directory(&self, dir: &Path) -> Result<RawMatrix, GexError> {
        let matrix_path = find_staged(dir, "matrix.mtx")?;
        let barcodes_path = find_staged(dir, "barcodes.tsv")?;
        let features_path = find_staged(dir, "features.tsv")?;

        let counts = parse_matrix_market(&matrix_path)?;
        let cells = read_barcodes(&barcodes_path)?;
        let genes = read_features(&features_path)?;

        if counts.rows() != genes.len() {
            return Err(GexError::Ingestion(format!(
                "matrix has {} rows but features file lists {} genes",
                counts.rows(),
                genes.len()
            )));
        }
        if counts.cols() != cells.len() {
            return Err(GexError::Ingestion(format!(
                "matrix has {} columns but barcodes file lists {} cells",
                counts.cols(),
                cells.len()
            )));
        }

        Ok(RawMatrix {
            genes,
            cells,
            counts,
        })
    }

    fn load_tabular(&self, path: &Path) -> Result<RawMatrix, GexError> {
        if !has_csv_suffix(path) {
            return Err(GexError::UnsupportedFormat(format!(
                "tabular counts must be .csv or .csv.gz: {}",
                path.display()
            )));
        }
        let reader = fs_util::open_maybe_gz(path)?;
        parse_tabular(reader)
    }

    fn construct(
        &self,
        raw: RawMatrix,
        label: &str,
        min_cells: u32,
        min_features: u32,
    ) -> Result<ExpressionMatrix, GexError> {
        let (n_genes, n_cells) = (raw.counts.rows(), raw.counts.cols());
        let mut cells_per_gene = vec![0u32; n_genes];
        let mut genes_per_cell = vec![0u32; n_cells];
        for (&value, (gene, cell)) in raw.counts.iter() {
            if value != 0.0 {
                cells_per_gene[gene] += 1;
                genes_per_cell[cell] += 1;
            }
        }

        let gene_index = subset_index(&cells_per_gene, min_cells);
        let cell_index = subset_index(&genes_per_cell, min_features);
        let kept_genes = gene_index.iter().filter(|idx| idx.is_some()).count();
        let kept_cells = cell_index.iter().filter(|idx| idx.is_some()).count();

        let mut filtered = TriMat::new((kept_genes, kept_cells));
        for (&value, (gene, cell)) in raw.counts.iter() {
            if let (Some(g), Some(c)) = (gene_index[gene], cell_index[cell]) {
                if value != 0.0 {
                    filtered.add_triplet(g, c, value);
                }
            }
        }

        let genes = subset_labels(raw.genes, &gene_index);
        let cells = subset_labels(raw.cells, &cell_index);

        Ok(ExpressionMatrix {
            label: label.to_string(),
            genes,
            cells,
            counts: filtered.to_csr(),
            provenance: None,
        })
    }
}

fn subset_index(support: &[u32], threshold: u32) -> Vec<Option<usize>> {
    let mut next = 0usize;
    support
        .iter()
        .map(|&count| {
            if count >= threshold {
                let idx = next;
                next += 1;
                Some(idx)
            } else {
                None
            }
        })
        .collect()
}

fn subset_labels(labels: Vec<String>, index: &[Option<usize>]) -> Vec<String> {
    labels
        .into_iter()
        .zip(index)
        .filter_map(|(label, idx)| idx.map(|_| label))
        .collect()
}

fn has_csv_suffix(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| {
            let lower = name.to_ascii_lowercase();
            lower.ends_with(".csv") || lower.ends_with(".csv.gz")
        })
        .unwrap_or(false)
}

fn find_staged(dir: &Path, stem: &str) -> Result<PathBuf, GexError> {
    let plain = dir.join(stem);
    if plain.exists() {
        return Ok(plain);
    }
    let gz = dir.join(format!("{stem}.gz"));
    if gz.exists() {
        return Ok(gz);
    }
    Err(GexError::Ingestion(format!(
        "staged file not found: {stem}[.gz] in {}",
        dir.display()
    )))
}

fn parse_matrix_market(path: &Path) -> Result<CsMat<f64>, GexError> {
    let reader = fs_util::open_maybe_gz(path)?;
    let mut lines = reader.lines();

    let header = lines
        .next()
        .ok_or_else(|| GexError::Ingestion(format!("empty matrix file: {}", path.display())))?
        .map_err(|err| GexError::Ingestion(err.to_string()))?;
    if !header.starts_with("%%MatrixMarket") || !header.contains("coordinate") {
        return Err(GexError::Ingestion(format!(
            "not a MatrixMarket coordinate file: {}",
            path.display()
        )));
    }

    let mut dims: Option<(usize, usize, usize)> = None;
    let mut triplets: Option<TriMat<f64>> = None;
    let mut seen = 0usize;

    for (line_no, line) in lines.enumerate() {
        let line = line.map_err(|err| GexError::Ingestion(err.to_string()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('%') {
            continue;
        }
        let fields: Vec<&str> = trimmed.split_ascii_whitespace().collect();
        match dims {
            None => {
                let parsed = parse_dims(&fields).ok_or_else(|| {
                    GexError::Ingestion(format!(
                        "invalid dimensions line {} in {}",
                        line_no + 2,
                        path.display()
                    ))
                })?;
                triplets = Some(TriMat::new((parsed.0, parsed.1)));
                dims = Some(parsed);
            }
            Some((rows, cols, _)) => {
                let (row, col, value) = parse_entry(&fields).ok_or_else(|| {
                    GexError::Ingestion(format!(
                        "invalid matrix entry at line {} in {}",
                        line_no + 2,
                        path.display()
                    ))
                })?;
                if row == 0 || col == 0 || row > rows || col > cols {
                    return Err(GexError::Ingestion(format!(
                        "matrix entry ({row}, {col}) out of bounds for {rows}x{cols}"
                    )));
                }
                // MatrixMarket coordinates are 1-based.
                triplets
                    .as_mut()
                    .unwrap()
                    .add_triplet(row - 1, col - 1, value);
                seen += 1;
            }
        }
    }

    let (_, _, declared) = dims.ok_or_else(|| {
        GexError::Ingestion(format!("missing dimensions line in {}", path.display()))
    })?;
    if seen != declared {
        return Err(GexError::Ingestion(format!(
            "matrix declares {declared} entries but {seen} were present: {}",
            path.display()
        )));
    }
    Ok(triplets.unwrap().to_csr())
}

fn parse_dims(fields: &[&str]) -> Option<(usize, usize, usize)> {
    if fields.len() != 3 {
        return None;
    }
    Some((
        fields[0].parse().ok()?,
        fields[1].parse().ok()?,
        fields[2].parse().ok()?,
    ))
}

fn parse_entry(fields: &[&str]) -> Option<(usize, usize, f64)> {
    if fields.len() != 3 {
        return None;
    }
    Some((
        fields[0].parse().ok()?,
        fields[1].parse().ok()?,
        fields[2].parse().ok()?,
    ))
}

fn read_barcodes(path: &Path) -> Result<Vec<String>, GexError> {
    let reader = fs_util::open_maybe_gz(path)?;
    let mut barcodes = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|err| GexError::Ingestion(err.to_string()))?;
        let barcode = line.split('\t').next().unwrap_or("").trim();
        if !barcode.is_empty() {
            barcodes.push(barcode.to_string());
        }
    }
    Ok(barcodes)
}

fn read_features(path: &Path) -> Result<Vec<String>, GexError> {
    let reader = fs_util::open_maybe_gz(path)?;
    let mut genes = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|err| GexError::Ingestion(err.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        // CellRanger feature files carry id, symbol, type; prefer the symbol.
        let gene = if fields.len() > 1 && !fields[1].trim().is_empty() {
            fields[1].trim()
        } else {
            fields[0].trim()
        };
        genes.push(gene.to_string());
    }
    Ok(genes)
}

fn parse_tabular(reader: Box<dyn BufRead>) -> Result<RawMatrix, GexError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(reader);
    let mut records = csv_reader.records();

    let header = records
        .next()
        .ok_or_else(|| GexError::Ingestion("empty counts file".to_string()))?
        .map_err(|err| GexError::Ingestion(err.to_string()))?;
    let cells: Vec<String> = header
        .iter()
        .skip(1)
        .map(|field| field.trim().to_string())
        .collect();
    if cells.is_empty() {
        return Err(GexError::Ingestion(
            "counts file has no cell columns".to_string(),
        ));
    }

    let mut genes = Vec::new();
    let mut triplets: Vec<(usize, usize, f64)> = Vec::new();
    for record in records {
        let record = record.map_err(|err| GexError::Ingestion(err.to_string()))?;
        if record.len() != cells.len() + 1 {
            return Err(GexError::Ingestion(format!(
                "row {} has {} values, expected {}",
                genes.len() + 1,
                record.len().saturating_sub(1),
                cells.len()
            )));
        }
        let gene_row = genes.len();
        genes.push(record.get(0).unwrap_or("").trim().to_string());
        for (cell, field) in record.iter().skip(1).enumerate() {
            let value: f64 = field.trim().parse().map_err(|_| {
                GexError::Ingestion(format!(
                    "non-numeric count '{field}' for gene {}",
                    genes[gene_row]
                ))
            })?;
            if value != 0.0 {
                triplets.push((gene_row, cell, value));
            }
        }
    }

    let mut matrix = TriMat::new((genes.len(), cells.len()));
    for (row, col, value) in triplets {
        matrix.add_triplet(row, col, value);
    }
    Ok(RawMatrix {
        genes,
        cells,
        counts: matrix.to_csr(),
    })
}
