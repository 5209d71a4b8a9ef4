//! Input resolution: turn a user-supplied path or URL into an in-memory upload.
//!
//! Manuals and photos are read fully into memory. The upload identity is the
//! file name, or the last path segment for URLs, so re-supplying the same
//! manual is recognised by the session and skipped.

use crate::error::AgentError;
use crate::pipeline::encode::ImageAttachment;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// An uploaded file: identity plus contents.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read a manual from a local path or download it from an HTTP/HTTPS URL.
pub async fn read_manual(input: &str, timeout_secs: u64) -> Result<Upload, AgentError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

/// Read and validate a photo from a local path.
pub async fn read_image(path: impl AsRef<Path>) -> Result<ImageAttachment, AgentError> {
    let upload = read_local(path.as_ref()).await?;
    ImageAttachment::from_bytes(upload.bytes)
}

async fn read_local(path: &Path) -> Result<Upload, AgentError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AgentError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => AgentError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => AgentError::Internal(format!("Failed to read '{}': {}", path.display(), e)),
    })?;

    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(Upload {
        name: file_name(path),
        bytes,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| PathBuf::from(path).display().to_string())
}

/// Download a URL fully into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<Upload, AgentError> {
    info!("Downloading manual from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AgentError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            AgentError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            AgentError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(AgentError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AgentError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());

    Ok(Upload {
        name: url_name(url),
        bytes: bytes.to_vec(),
    })
}

/// Last non-empty path segment of `url`, or the URL itself.
fn url_name(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() {
                    return last.to_string();
                }
            }
        }
    }
    url.to_string()
}
