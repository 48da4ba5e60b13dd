use std::fs;
use std::io;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use zip::ZipArchive;

use crate::error::GexError;

pub fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

/// Copies `source` into `staging_dir` under the fixed name the matrix
/// loader expects, preserving the source's compression state: a gzipped
/// source stays gzipped (the `.gz` suffix is appended to `target_stem`),
/// an uncompressed source stays uncompressed. Bytes are never
/// decompressed or recompressed. The copy is verified non-empty.
pub fn stage_copy(
    source: &Path,
    staging_dir: &Path,
    target_stem: &str,
) -> Result<PathBuf, GexError> {
    let target_name = if is_gzip(source) {
        format!("{target_stem}.gz")
    } else {
        target_stem.to_string()
    };
    let destination = staging_dir.join(target_name);
    fs::copy(source, &destination).map_err(|err| {
        GexError::Copy(format!(
            "{} -> {}: {err}",
            source.display(),
            destination.display()
        ))
    })?;
    let size = fs::metadata(&destination)
        .map_err(|err| GexError::Copy(format!("{}: {err}", destination.display())))?
        .len();
    if size == 0 {
        return Err(GexError::Copy(format!(
            "staged file is empty: {}",
            destination.display()
        )));
    }
    Ok(destination)
}

/// Opens a file for buffered reading, transparently decoding gzip when
/// the path carries a `.gz` suffix.
pub fn open_maybe_gz(path: &Path) -> Result<Box<dyn BufRead>, GexError> {
    let file = fs::File::open(path)
        .map_err(|err| GexError::Filesystem(format!("open {}: {err}", path.display())))?;
    if is_gzip(path) {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<(), GexError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| GexError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| GexError::Filesystem(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| GexError::Filesystem(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(GexError::Filesystem(
                    "zip entry path traversal detected".to_string(),
                ));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| GexError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| GexError::Filesystem(err.to_string()))?;
        }
        let mut outfile =
            fs::File::create(&entry_path).map_err(|err| GexError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| GexError::Filesystem(err.to_string()))?;
    }
    Ok(())
}

pub fn validate_zip(zip_path: &Path) -> Result<(), GexError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| GexError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| GexError::Filesystem(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| GexError::Filesystem(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink())
            .map_err(|err| GexError::Filesystem(err.to_string()))?;
    }
    Ok(())
}
