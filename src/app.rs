use std::fs;
use std::time::Duration;

use camino::Utf8Path;
use serde::Serialize;

use crate::classify::classify;
use crate::domain::GeoSeriesAccession;
use crate::error::GexError;
use crate::geo::{GeoClient, parse_soft};
use crate::ingest::{BuildOptions, MatrixSet};
use crate::matrix::{MatrixBuilder, MatrixSummary};
use crate::store::{SeriesMetadata, Store, atomic_rename_dir};

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub force: bool,
    pub no_cache: bool,
}

#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub min_cells: u32,
    pub min_features: u32,
    pub label: Option<String>,
}

impl Default for BuildRequest {
    fn default() -> Self {
        Self {
            min_cells: 3,
            min_features: 200,
            label: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub accession: String,
    pub action: String,
    pub organism: Option<String>,
    pub file_count: usize,
    pub project_path: Option<String>,
    pub cache_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub accession: String,
    pub format: String,
    pub sample_count: usize,
    pub matrices: Vec<MatrixSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub series: Vec<ListEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub accession: String,
    pub organism: Option<String>,
    pub file_count: usize,
    pub project_path: Option<String>,
    pub cache_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResult {
    pub accession: String,
    pub organism: Option<String>,
    pub downloaded_at: Option<String>,
    pub file_count: usize,
    pub project_path: Option<String>,
    pub cache_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub cleared: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Clone)]
pub struct App<G: GeoClient, B: MatrixBuilder> {
    store: Store,
    geo: G,
    builder: B,
    tool_version: String,
}

impl<G: GeoClient, B: MatrixBuilder> App<G, B> {
    /// `tool_version` is recorded in every provenance record; the caller
    /// supplies it once at startup instead of the library consulting any
    /// global.
    pub fn new(store: Store, geo: G, builder: B, tool_version: impl Into<String>) -> Self {
        Self {
            store,
            geo,
            builder,
            tool_version: tool_version.into(),
        }
    }

    /// Downloads the supplementary files of a series into the project
    /// store, preferring the local cache over the network.
    pub fn fetch(
        &self,
        accession: &GeoSeriesAccession,
        options: &FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<FetchReport, GexError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; series {}", accession.as_str()),
            elapsed: None,
        });
        self.store.ensure_project_root()?;
        self.store.ensure_cache_root()?;

        let project_dir = self.store.project_series_dir(accession);
        let cache_dir = self.store.cache_series_dir(accession);

        if !options.force && Store::exists(&project_dir) {
            sink.event(ProgressEvent {
                message: "phase=Store; already in project store".to_string(),
                elapsed: None,
            });
            let files = Store::list_series_files(&project_dir)?;
            return Ok(FetchReport {
                accession: accession.as_str().to_string(),
                action: "project".to_string(),
                organism: self.known_organism(accession),
                file_count: files.len(),
                project_path: Some(project_dir.to_string()),
                cache_path: Store::exists(&cache_dir).then(|| cache_dir.to_string()),
            });
        }

        if !options.force && Store::exists(&cache_dir) {
            sink.event(ProgressEvent {
                message: "phase=Store; using cached series".to_string(),
                elapsed: None,
            });
            Store::copy_dir_atomic(&cache_dir, &project_dir)?;
            let files = Store::list_series_files(&project_dir)?;
            let organism = self.known_organism(accession);
            let meta = self.series_metadata(accession, organism.clone(), &project_dir, files.len());
            Store::write_metadata(&self.store.project_metadata_path(accession), &meta)?;
            return Ok(FetchReport {
                accession: accession.as_str().to_string(),
                action: "cache".to_string(),
                organism,
                file_count: files.len(),
                project_path: Some(project_dir.to_string()),
                cache_path: Some(cache_dir.to_string()),
            });
        }

        sink.event(ProgressEvent {
            message: "phase=Prepare; fetching series record".to_string(),
            elapsed: None,
        });
        let start = std::time::Instant::now();
        let soft = self.geo.fetch_soft_text(accession)?;
        let record = parse_soft(&soft);
        if record.supplementary_urls.is_empty() {
            return Err(GexError::GeoResolution(format!(
                "no supplementary files listed for {}",
                accession.as_str()
            )));
        }

        let temp_dir = tempfile::Builder::new()
            .prefix("gexfetch-series")
            .tempdir_in(self.store.project_root().as_std_path())
            .map_err(|err| GexError::Filesystem(err.to_string()))?;
        let download_dir = temp_dir.path().join("files");
        fs::create_dir_all(&download_dir).map_err(|err| GexError::Filesystem(err.to_string()))?;

        for url in &record.supplementary_urls {
            let name = url
                .rsplit('/')
                .next()
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    GexError::GeoResolution(format!("unusable supplementary url: {url}"))
                })?;
            sink.event(ProgressEvent {
                message: format!("geo.download {name}"),
                elapsed: None,
            });
            let destination = download_dir.join(name);
            self.geo.download_url(url, &destination)?;

            if name.to_ascii_lowercase().ends_with(".zip") {
                sink.event(ProgressEvent {
                    message: "phase=Verify; validating archive".to_string(),
                    elapsed: None,
                });
                crate::fs_util::validate_zip(&destination)?;
                crate::fs_util::extract_zip(&destination, &download_dir)?;
                fs::remove_file(&destination)
                    .map_err(|err| GexError::Filesystem(err.to_string()))?;
            }
        }
        sink.event(ProgressEvent {
            message: format!(
                "geo.response latency_ms={}",
                start.elapsed().as_millis()
            ),
            elapsed: None,
        });

        sink.event(ProgressEvent {
            message: "phase=Store; writing files".to_string(),
            elapsed: None,
        });
        if let Some(parent) = project_dir.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| GexError::Filesystem(err.to_string()))?;
        }
        atomic_rename_dir(&download_dir, project_dir.as_std_path())
            .map_err(|err| GexError::Filesystem(err.to_string()))?;

        let files = Store::list_series_files(&project_dir)?;
        let meta = self.series_metadata(
            accession,
            record.organism.clone(),
            &project_dir,
            files.len(),
        );
        Store::write_metadata(&self.store.project_metadata_path(accession), &meta)?;

        if !options.no_cache {
            Store::copy_dir_atomic(&project_dir, &cache_dir)?;
            let meta =
                self.series_metadata(accession, record.organism.clone(), &cache_dir, files.len());
            Store::write_metadata(&self.store.cache_metadata_path(accession), &meta)?;
        }

        Ok(FetchReport {
            accession: accession.as_str().to_string(),
            action: "download".to_string(),
            organism: record.organism,
            file_count: files.len(),
            project_path: Some(project_dir.to_string()),
            cache_path: (!options.no_cache).then(|| cache_dir.to_string()),
        })
    }

    /// Classifies the fetched series files and ingests every detected
    /// sample into an expression matrix.
    pub fn build(
        &self,
        accession: &GeoSeriesAccession,
        request: &BuildRequest,
        sink: &dyn ProgressSink,
    ) -> Result<(MatrixSet, BuildReport), GexError> {
        let project_dir = self.store.project_series_dir(accession);
        if !Store::exists(&project_dir) {
            return Err(GexError::SeriesNotFound(accession.as_str().to_string()));
        }

        sink.event(ProgressEvent {
            message: "phase=Classify; detecting layout".to_string(),
            elapsed: None,
        });
        let files = Store::list_series_files(&project_dir)?;
        let format = classify(&files)?;

        sink.event(ProgressEvent {
            message: format!("phase=Ingest; format={}", format.kind),
            elapsed: None,
        });
        let opts = BuildOptions {
            min_cells: request.min_cells,
            min_features: request.min_features,
            label: request
                .label
                .clone()
                .unwrap_or_else(|| accession.as_str().to_string()),
            tool_version: self.tool_version.clone(),
            staging_root: self.store.staging_root().into_std_path_buf(),
        };
        let set = crate::ingest::build(&format, &opts, &self.builder)?;

        let report = BuildReport {
            accession: accession.as_str().to_string(),
            format: format.kind.to_string(),
            sample_count: format.sample_count(),
            matrices: set.matrices().iter().map(|matrix| matrix.summary()).collect(),
        };
        Ok((set, report))
    }

    pub fn fetch_and_build(
        &self,
        accession: &GeoSeriesAccession,
        options: &FetchOptions,
        request: &BuildRequest,
        sink: &dyn ProgressSink,
    ) -> Result<(FetchReport, MatrixSet, BuildReport), GexError> {
        let fetched = self.fetch(accession, options, sink)?;
        let (set, built) = self.build(accession, request, sink)?;
        Ok((fetched, set, built))
    }

    pub fn list(&self, sink: &dyn ProgressSink) -> Result<ListResult, GexError> {
        sink.event(ProgressEvent {
            message: "phase=Resolve; scanning stores".to_string(),
            elapsed: None,
        });

        let project_metadata = Store::list_metadata(self.store.project_root())?;
        let cache_metadata = Store::list_metadata(self.store.cache_root())?;

        let mut map = std::collections::BTreeMap::<String, ListEntry>::new();
        for entry in project_metadata {
            let value = map
                .entry(entry.accession.clone())
                .or_insert_with(|| ListEntry {
                    accession: entry.accession.clone(),
                    organism: entry.organism.clone(),
                    file_count: entry.file_count,
                    project_path: None,
                    cache_path: None,
                });
            value.project_path = Some(entry.resolved_path.clone());
        }
        for entry in cache_metadata {
            let value = map
                .entry(entry.accession.clone())
                .or_insert_with(|| ListEntry {
                    accession: entry.accession.clone(),
                    organism: entry.organism.clone(),
                    file_count: entry.file_count,
                    project_path: None,
                    cache_path: None,
                });
            value.cache_path = Some(entry.resolved_path.clone());
        }

        Ok(ListResult {
            series: map.into_values().collect(),
        })
    }

    pub fn info(
        &self,
        accession: &GeoSeriesAccession,
        sink: &dyn ProgressSink,
    ) -> Result<InfoResult, GexError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; looking up {}", accession.as_str()),
            elapsed: None,
        });

        let project = Store::list_metadata(self.store.project_root())?;
        let cache = Store::list_metadata(self.store.cache_root())?;
        let project_meta = project
            .into_iter()
            .find(|meta| meta.accession == accession.as_str());
        let cache_meta = cache
            .into_iter()
            .find(|meta| meta.accession == accession.as_str());

        if project_meta.is_none() && cache_meta.is_none() {
            return Err(GexError::SeriesNotFound(accession.as_str().to_string()));
        }

        Ok(InfoResult {
            accession: accession.as_str().to_string(),
            organism: project_meta
                .as_ref()
                .and_then(|meta| meta.organism.clone())
                .or_else(|| cache_meta.as_ref().and_then(|meta| meta.organism.clone())),
            downloaded_at: project_meta
                .as_ref()
                .map(|meta| meta.downloaded_at.clone())
                .or_else(|| cache_meta.as_ref().map(|meta| meta.downloaded_at.clone())),
            file_count: project_meta
                .as_ref()
                .map(|meta| meta.file_count)
                .or_else(|| cache_meta.as_ref().map(|meta| meta.file_count))
                .unwrap_or(0),
            project_path: project_meta.map(|meta| meta.resolved_path),
            cache_path: cache_meta.map(|meta| meta.resolved_path),
        })
    }

    pub fn clear(&self, sink: &dyn ProgressSink) -> Result<ClearResult, GexError> {
        sink.event(ProgressEvent {
            message: "phase=Store; clearing project store".to_string(),
            elapsed: None,
        });
        self.store.clear_project()?;
        Ok(ClearResult { cleared: true })
    }

    fn known_organism(&self, accession: &GeoSeriesAccession) -> Option<String> {
        Store::list_metadata(self.store.project_root())
            .ok()?
            .into_iter()
            .chain(
                Store::list_metadata(self.store.cache_root())
                    .ok()
                    .unwrap_or_default(),
            )
            .find(|meta| meta.accession == accession.as_str())
            .and_then(|meta| meta.organism)
    }

    fn series_metadata(
        &self,
        accession: &GeoSeriesAccession,
        organism: Option<String>,
        path: &Utf8Path,
        file_count: usize,
    ) -> SeriesMetadata {
        SeriesMetadata {
            source: "geo".to_string(),
            accession: accession.as_str().to_string(),
            organism,
            downloaded_at: chrono::Utc::now().to_rfc3339(),
            tool: format!("gexfetch/{}", self.tool_version),
            resolved_path: path.to_string(),
            file_count,
        }
    }
}
