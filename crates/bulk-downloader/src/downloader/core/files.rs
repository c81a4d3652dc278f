//! File operation utilities
//!
//! Destination files are only ever written through a temporary sibling that
//! is renamed into place, so a partially written file never appears under
//! its final name.

use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::fs;
use tracing::debug;

use crate::downloader::core::{DownloadError, FileOperation, Result};

/// Size of an existing local file, or `None` when nothing is there
pub async fn existing_file_size(path: &Path) -> Result<Option<u64>> {
    match fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => Ok(Some(metadata.len())),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DownloadError::FileSystem {
            path: path.to_path_buf(),
            operation: FileOperation::Metadata,
            source: e,
        }),
    }
}

/// Create a uniquely named temporary file next to `dest_path`
///
/// The returned [`TempPath`] removes the file when dropped, so an aborted
/// transfer leaves nothing behind.
pub fn create_temp_path(dest_path: &Path) -> Result<TempPath> {
    let dir = parent_dir(dest_path);
    let stem = dest_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());

    tempfile::Builder::new()
        .prefix(&format!(".{}.", stem))
        .suffix(".part")
        .tempfile_in(&dir)
        .map(|file| file.into_temp_path())
        .map_err(|e| DownloadError::FileSystem {
            path: dir,
            operation: FileOperation::Create,
            source: e,
        })
}

/// Atomically replace `dest_path` with the temporary file
pub fn atomic_replace(temp_path: TempPath, dest_path: &Path) -> Result<()> {
    let temp_display = temp_path.to_path_buf();
    temp_path.persist(dest_path).map_err(|e| DownloadError::FileSystem {
        path: dest_path.to_path_buf(),
        operation: FileOperation::Move,
        source: e.error,
    })?;
    debug!("Atomically renamed {} to {}", temp_display.display(), dest_path.display());
    Ok(())
}

/// Write `contents` to `dest_path` via a temporary sibling and rename
pub async fn write_atomically(dest_path: &Path, contents: &[u8]) -> Result<()> {
    let dir = parent_dir(dest_path);
    fs::create_dir_all(&dir).await.map_err(|e| DownloadError::FileSystem {
        path: dir.clone(),
        operation: FileOperation::CreateDir,
        source: e,
    })?;

    let temp_path = create_temp_path(dest_path)?;
    fs::write(&temp_path, contents).await.map_err(|e| DownloadError::FileSystem {
        path: temp_path.to_path_buf(),
        operation: FileOperation::Write,
        source: e,
    })?;
    atomic_replace(temp_path, dest_path)
}

/// Remove a stale local file before it is fetched again
pub async fn remove_stale_file(path: &Path) -> Result<()> {
    fs::remove_file(path).await.map_err(|e| DownloadError::FileSystem {
        path: path.to_path_buf(),
        operation: FileOperation::Delete,
        source: e,
    })
}

/// Make sure downloads can actually be written into `dir`
pub fn ensure_writable_dir(dir: &Path) -> Result<()> {
    tempfile::tempfile_in(dir)
        .map(drop)
        .map_err(|e| DownloadError::WorkingDirectoryNotWritable {
            path: dir.to_path_buf(),
            source: e,
        })
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
