//! Model and training-data downloads shared by the engines

use crate::error::OcrError;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Per-user cache directory for downloaded engine data
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("multilingual-ocr")
}

/// Ensure `dir/filename` exists, downloading it from `url` if needed, and
/// return its path
pub fn ensure_downloaded(
    url: &str,
    dir: &Path,
    filename: &str,
    languages: &str,
) -> Result<PathBuf, OcrError> {
    std::fs::create_dir_all(dir).map_err(|e| {
        OcrError::init(languages, format!("Failed to create cache directory: {}", e))
    })?;

    let path = dir.join(filename);

    if !path.exists() {
        tracing::info!("Downloading {} (this may take a moment)...", filename);
        download_file(url, &path, languages)?;
        tracing::info!("Downloaded {} to {:?}", filename, path);
    } else {
        tracing::info!("Using cached {} from {:?}", filename, path);
    }

    Ok(path)
}

/// Download a file from URL to path using ureq
fn download_file(url: &str, path: &Path, languages: &str) -> Result<(), OcrError> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| OcrError::init(languages, format!("Failed to download {}: {}", url, e)))?;

    // Read response body before creating the file so a failed download
    // does not leave an empty file that looks cached
    let buffer = response.into_body().read_to_vec().map_err(|e| {
        OcrError::init(languages, format!("Failed to read response body: {}", e))
    })?;

    let mut file = File::create(path)
        .map_err(|e| OcrError::init(languages, format!("Failed to create {:?}: {}", path, e)))?;

    file.write_all(&buffer)
        .map_err(|e| OcrError::init(languages, format!("Failed to write {:?}: {}", path, e)))?;

    Ok(())
}
