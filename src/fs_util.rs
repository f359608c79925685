use std::fs;
use std::io::{self, Write};
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;
use zip::ZipArchive;

use crate::error::GeoError;

/// Writes `content` next to `path` and renames it over the target.
pub fn write_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), GeoError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| GeoError::Filesystem(format!("create {parent}: {err}")))?;
    let mut temp = Builder::new()
        .prefix(".geoprovenance")
        .suffix(".tmp")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| GeoError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| GeoError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| GeoError::Filesystem(format!("write {path}: {}", err.error)))?;
    Ok(())
}

/// Extracts a single archive member into `target_dir`, keeping its relative
/// path. Returns that relative path.
pub fn extract_member(
    zip_path: &Path,
    member: &str,
    target_dir: &Path,
) -> Result<Utf8PathBuf, GeoError> {
    let extraction = |message: String| GeoError::Extraction {
        member: member.to_string(),
        message,
    };

    let file = fs::File::open(zip_path)
        .map_err(|err| extraction(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive = ZipArchive::new(file).map_err(|err| extraction(err.to_string()))?;
    let mut entry = archive
        .by_name(member)
        .map_err(|err| extraction(err.to_string()))?;
    let relative = entry
        .enclosed_name()
        .ok_or_else(|| extraction("zip entry path traversal detected".to_string()))?;
    if entry.is_dir() {
        return Err(extraction("member is a directory".to_string()));
    }
    let relative = Utf8PathBuf::from_path_buf(relative)
        .map_err(|_| extraction("non-utf8 member path".to_string()))?;

    let entry_path = target_dir.join(relative.as_std_path());
    if let Some(parent) = entry_path.parent() {
        fs::create_dir_all(parent).map_err(|err| extraction(err.to_string()))?;
    }
    let mut outfile = fs::File::create(&entry_path).map_err(|err| extraction(err.to_string()))?;
    io::copy(&mut entry, &mut outfile).map_err(|err| extraction(err.to_string()))?;
    Ok(relative)
}
