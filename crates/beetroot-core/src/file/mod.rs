//! Local file helpers.
//!
//! This module handles:
//! - Turning user-supplied paths into queue entries
//! - Reading one chunk-sized byte range
//! - Choosing a safe, non-clobbering name for received files
//! - Size formatting for display

use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{Error, Result};
use crate::transfer::QueuedFile;

/// Name used when a received name has nothing usable left after sanitizing.
const FALLBACK_NAME: &str = "received_file";

/// Build queue entries for the given paths, in order.
///
/// # Errors
///
/// Returns [`Error::FileRead`] for a path that does not exist or is not a
/// regular file.
pub async fn queue_from_paths(paths: &[PathBuf]) -> Result<Vec<QueuedFile>> {
    let mut files = Vec::with_capacity(paths.len());

    for path in paths {
        let display = path.display().to_string();
        let metadata = tokio::fs::metadata(path).await.map_err(|e| Error::FileRead {
            file: display.clone(),
            reason: e.to_string(),
        })?;

        if !metadata.is_file() {
            return Err(Error::FileRead {
                file: display,
                reason: "not a regular file".to_string(),
            });
        }

        let name = path
            .file_name()
            .map_or_else(|| display.clone(), |n| n.to_string_lossy().to_string());
        files.push(QueuedFile::new(name, metadata.len(), path.clone()));
    }

    Ok(files)
}

/// Read up to `len` bytes at `offset`.
///
/// A file that shrank since it was queued yields fewer bytes, which the
/// session reports as a read failure.
pub async fn read_chunk(path: &Path, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(offset)).await?;

    let mut buffer = Vec::with_capacity(len);
    file.take(len as u64).read_to_end(&mut buffer).await?;
    Ok(buffer)
}

/// Reduce a peer-supplied name to a single safe path component.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = last
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect();

    let trimmed = cleaned.trim().trim_matches('.').trim();
    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Path in `dir` for a received file that does not overwrite anything.
///
/// `report.pdf` becomes `report (1).pdf`, `report (2).pdf`, ... when taken.
#[must_use]
pub fn unique_output_path(dir: &Path, name: &str) -> PathBuf {
    let safe = sanitize_file_name(name);
    let candidate = dir.join(&safe);
    if !candidate.exists() {
        return candidate;
    }

    let as_path = Path::new(&safe);
    let stem = as_path
        .file_stem()
        .map_or_else(|| safe.clone(), |s| s.to_string_lossy().to_string());
    let extension = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1u32..)
        .map(|n| dir.join(format!("{stem} ({n}){extension}")))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

/// Write a received file into `dir`, returning where it landed.
pub async fn save_received(dir: &Path, name: &str, data: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = unique_output_path(dir, name);
    tokio::fs::write(&path, data).await?;
    Ok(path)
}

/// Format a file size for display.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
