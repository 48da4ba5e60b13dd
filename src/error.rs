use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GexError {
    #[error("invalid GEO series accession: {0}")]
    InvalidAccession(String),

    #[error("no supported expression layout detected among the input files")]
    NotDetected,

    #[error("sample {sample_id} is missing required file roles: {roles}")]
    MissingRoles { sample_id: String, roles: String },

    #[error("source files missing: {0}")]
    SourceMissing(String),

    #[error("staging copy failed: {0}")]
    Copy(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("matrix construction failed: {0}")]
    Ingestion(String),

    #[error("GEO request failed: {0}")]
    GeoHttp(String),

    #[error("GEO returned status {status}: {message}")]
    GeoStatus { status: u16, message: String },

    #[error("{0}")]
    GeoResolution(String),

    #[error("series not found locally: {0}")]
    SeriesNotFound(String),

    #[error("missing config file gexfetch.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
