use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::domain::GeoSeriesAccession;
use crate::error::GexError;

/// Project-local store (`./.gexfetch`) plus a shared user cache. Series
/// files live under `series/<accession>/`, one metadata record per
/// accession under `metadata/`.
#[derive(Debug, Clone)]
pub struct Store {
    project_root: Utf8PathBuf,
    cache_root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, GexError> {
        let cwd = std::env::current_dir().map_err(|err| GexError::Filesystem(err.to_string()))?;
        let project_root = Utf8PathBuf::from_path_buf(cwd.join(".gexfetch"))
            .map_err(|_| GexError::Filesystem("invalid project path".to_string()))?;

        let cache_root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("gexfetch")).ok()
            })
            .ok_or_else(|| GexError::Filesystem("unable to resolve cache directory".to_string()))?;

        Ok(Self {
            project_root,
            cache_root,
        })
    }

    pub fn new_with_paths(project_root: Utf8PathBuf, cache_root: Utf8PathBuf) -> Self {
        Self {
            project_root,
            cache_root,
        }
    }

    pub fn project_root(&self) -> &Utf8Path {
        &self.project_root
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn project_series_dir(&self, accession: &GeoSeriesAccession) -> Utf8PathBuf {
        self.project_root.join("series").join(accession.as_str())
    }

    pub fn cache_series_dir(&self, accession: &GeoSeriesAccession) -> Utf8PathBuf {
        self.cache_root.join("series").join(accession.as_str())
    }

    pub fn project_metadata_path(&self, accession: &GeoSeriesAccession) -> Utf8PathBuf {
        self.project_root
            .join("metadata")
            .join(format!("{}.json", accession.as_str()))
    }

    pub fn cache_metadata_path(&self, accession: &GeoSeriesAccession) -> Utf8PathBuf {
        self.cache_root
            .join("metadata")
            .join(format!("{}.json", accession.as_str()))
    }

    pub fn staging_root(&self) -> Utf8PathBuf {
        self.project_root.join("staging")
    }

    pub fn ensure_project_root(&self) -> Result<(), GexError> {
        fs::create_dir_all(self.project_root.as_std_path())
            .map_err(|err| GexError::Filesystem(err.to_string()))
    }

    pub fn ensure_cache_root(&self) -> Result<(), GexError> {
        fs::create_dir_all(self.cache_root.as_std_path())
            .map_err(|err| GexError::Filesystem(err.to_string()))
    }

    pub fn exists(path: &Utf8Path) -> bool {
        path.as_std_path().exists()
    }

    pub fn clear_project(&self) -> Result<(), GexError> {
        if self.project_root.as_std_path().exists() {
            fs::remove_dir_all(self.project_root.as_std_path())
                .map_err(|err| GexError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }

    pub fn write_metadata(path: &Utf8Path, metadata: &SeriesMetadata) -> Result<(), GexError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| GexError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(metadata)
            .map_err(|err| GexError::Filesystem(err.to_string()))?;
        fs::write(tmp_path.as_std_path(), &content)
            .map_err(|err| GexError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| GexError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn copy_dir_recursive(source: &Utf8Path, dest: &Utf8Path) -> Result<(), GexError> {
        fs::create_dir_all(dest.as_std_path())
            .map_err(|err| GexError::Filesystem(err.to_string()))?;
        for entry in walk_dir(source.as_std_path())? {
            let relative = entry.strip_prefix(source.as_std_path()).unwrap();
            let target = dest.as_std_path().join(relative);
            if entry.is_dir() {
                fs::create_dir_all(&target)
                    .map_err(|err| GexError::Filesystem(err.to_string()))?;
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|err| GexError::Filesystem(err.to_string()))?;
                }
                fs::copy(entry, &target).map_err(|err| GexError::Filesystem(err.to_string()))?;
            }
        }
        Ok(())
    }

    pub fn copy_dir_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), GexError> {
        let parent = dest
            .parent()
            .ok_or_else(|| GexError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| GexError::Filesystem(err.to_string()))?;
        let temp_dir = Builder::new()
            .prefix("gexfetch-copy")
            .tempdir_in(parent.as_std_path())
            .map_err(|err| GexError::Filesystem(err.to_string()))?;
        let temp_path = Utf8PathBuf::from_path_buf(temp_dir.path().to_path_buf())
            .map_err(|_| GexError::Filesystem("invalid temp dir".to_string()))?;
        Self::copy_dir_recursive(source, &temp_path)?;
        atomic_rename_dir(temp_path.as_std_path(), dest.as_std_path())
            .map_err(|err| GexError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), GexError> {
        let parent = dest
            .parent()
            .ok_or_else(|| GexError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| GexError::Filesystem(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix("gexfetch-file")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| GexError::Filesystem(err.to_string()))?;
        fs::copy(source.as_std_path(), temp.path())
            .map_err(|err| GexError::Filesystem(err.to_string()))?;
        if dest.as_std_path().exists() {
            fs::remove_file(dest.as_std_path())
                .map_err(|err| GexError::Filesystem(err.to_string()))?;
        }
        temp.persist(dest.as_std_path())
            .map_err(|err| GexError::Filesystem(err.to_string()))?;
        Ok(())
    }

    /// All regular files under a series directory, sorted for stable
    /// classification input.
    pub fn list_series_files(dir: &Utf8Path) -> Result<Vec<PathBuf>, GexError> {
        if !dir.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = walk_dir(dir.as_std_path())?
            .into_iter()
            .filter(|path| path.is_file())
            .collect();
        files.sort();
        Ok(files)
    }

    pub fn list_metadata(root: &Utf8Path) -> Result<Vec<SeriesMetadata>, GexError> {
        let metadata_root = root.join("metadata");
        if !metadata_root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for path in walk_dir(metadata_root.as_std_path())? {
            if path.is_file() && path.extension().map(|ext| ext == "json").unwrap_or(false) {
                let content = fs::read_to_string(&path)
                    .map_err(|err| GexError::Filesystem(err.to_string()))?;
                let metadata: SeriesMetadata = serde_json::from_str(&content)
                    .map_err(|err| GexError::Filesystem(err.to_string()))?;
                entries.push(metadata);
            }
        }
        Ok(entries)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesMetadata {
    pub source: String,
    pub accession: String,
    pub organism: Option<String>,
    pub downloaded_at: String,
    pub tool: String,
    pub resolved_path: String,
    pub file_count: usize,
}

fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, GexError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = fs::read_dir(&path).map_err(|err| GexError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| GexError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    Ok(items)
}

pub fn atomic_rename_dir(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        fs::remove_dir_all(to)?;
    }
    fs::rename(from, to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new_with_paths(
            Utf8PathBuf::from("/tmp/project/.gexfetch"),
            Utf8PathBuf::from("/tmp/cache/gexfetch"),
        );
        let acc: GeoSeriesAccession = "GSE164073".parse().unwrap();

        assert!(
            store
                .project_series_dir(&acc)
                .ends_with("series/GSE164073")
        );
        assert!(
            store
                .cache_metadata_path(&acc)
                .ends_with("metadata/GSE164073.json")
        );
    }
}
