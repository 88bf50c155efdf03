//! Locating and fetching ggml Whisper models.

use crate::error::InvokeError;
use std::path::Path;
use tracing::info;

/// whisper.cpp file name for a model tier, e.g. `tiny.en` -> `ggml-tiny.en.bin`.
pub fn model_file_name(tier: &str) -> String {
    format!("ggml-{}.bin", tier)
}

/// Make sure the model at `path` is on disk, fetching `<base_url>/<file name>` if allowed.
pub fn ensure_model(path: &Path, base_url: &str, auto_download: bool) -> Result<(), InvokeError> {
    if path.exists() {
        return Ok(());
    }

    if !auto_download {
        return Err(InvokeError::DependencyMissing {
            what: "Whisper model",
            path: path.to_path_buf(),
        });
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            InvokeError::ProcessingFailed(format!("Invalid model path: {}", path.display()))
        })?;
    let url = format!("{}/{}", base_url.trim_end_matches('/'), file_name);

    download(&url, path)
}

fn download(url: &str, dest: &Path) -> Result<(), InvokeError> {
    info!("Whisper: Downloading model from {}...", url);

    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| {
        InvokeError::ProcessingFailed(format!(
            "Failed to create model directory {}: {}",
            dir.display(),
            e
        ))
    })?;

    let mut resp = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| InvokeError::ProcessingFailed(format!("Failed to fetch {}: {}", url, e)))?;

    // Stage next to the destination so the final rename stays on one filesystem
    let mut staged = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| InvokeError::ProcessingFailed(format!("Failed to stage model: {}", e)))?;
    let bytes = std::io::copy(&mut resp, &mut staged)
        .map_err(|e| InvokeError::ProcessingFailed(format!("Failed to download model: {}", e)))?;
    staged
        .persist(dest)
        .map_err(|e| InvokeError::ProcessingFailed(format!("Failed to store model: {}", e)))?;

    info!("Whisper: Saved {} bytes to {}", bytes, dest.display());
    Ok(())
}
