//! Input resolution and the validation boundary.
//!
//! Every document enters the pipeline as a [`DocumentFile`]: a name, the raw
//! bytes, and whatever size/MIME the uploader declared. [`validate`] is the
//! only gate in front of preprocessing; it runs before the worker pool is
//! touched so rejected uploads cost nothing.

use crate::config::PipelineConfig;
use crate::error::SiteScanError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One uploaded document.
#[derive(Debug, Clone)]
pub struct DocumentFile {
    /// Original file name, used for the extension check and in messages.
    pub name: String,
    pub bytes: Vec<u8>,
    /// Size claimed by the uploader, if any.
    pub declared_size: Option<u64>,
    /// MIME type claimed by the uploader, if any.
    pub mime_type: Option<String>,
}

impl DocumentFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
            declared_size: None,
            mime_type: None,
        }
    }

    pub fn with_declared_size(mut self, size: u64) -> Self {
        self.declared_size = Some(size);
        self
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    /// Lower-case extension from the name, falling back to the declared MIME type.
    pub fn extension(&self) -> Option<String> {
        let from_name = Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .map(|e| e.to_ascii_lowercase());
        from_name.or_else(|| self.mime_type.as_deref().and_then(extension_for_mime))
    }

    /// The larger of the declared size and the actual byte count.
    pub fn effective_size(&self) -> u64 {
        let actual = self.bytes.len() as u64;
        self.declared_size.map_or(actual, |d| d.max(actual))
    }

    /// Resolve a CLI argument: HTTP(S) URL or local path.
    pub async fn resolve(input: &str, timeout_secs: u64) -> Result<Self, SiteScanError> {
        if is_url(input) {
            Self::from_url(input, timeout_secs).await
        } else {
            Self::from_path(input).await
        }
    }

    /// Read a local file.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, SiteScanError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => SiteScanError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => SiteScanError::FileNotFound {
                path: path.to_path_buf(),
            },
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        debug!("Read local document: {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::new(name, bytes))
    }

    /// Download a document over HTTP(S).
    pub async fn from_url(url: &str, timeout_secs: u64) -> Result<Self, SiteScanError> {
        info!("Downloading document from: {}", url);

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SiteScanError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let response = client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                SiteScanError::DownloadTimeout {
                    url: url.to_string(),
                    secs: timeout_secs,
                }
            } else {
                SiteScanError::DownloadFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            return Err(SiteScanError::DownloadFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        let declared_size = response.content_length();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SiteScanError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let mut file = Self::new(filename_from_url(url), bytes.to_vec());
        file.mime_type = mime_type;
        file.declared_size = declared_size;
        info!("Downloaded {} bytes as '{}'", file.bytes.len(), file.name);
        Ok(file)
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Reject documents the pipeline must not process. Returns the extension.
pub fn validate(file: &DocumentFile, config: &PipelineConfig) -> Result<String, SiteScanError> {
    let reject = |reason: String| SiteScanError::Validation {
        file: file.name.clone(),
        reason,
    };

    let ext = file
        .extension()
        .ok_or_else(|| reject("no file extension or recognised MIME type".into()))?;
    if !config.accepts_extension(&ext) {
        return Err(reject(format!(
            "unsupported extension '{}' (allowed: {})",
            ext,
            config.allowed_extensions.join(", ")
        )));
    }

    let size = file.effective_size();
    if size > config.max_file_bytes {
        return Err(reject(format!(
            "file is {} bytes, limit is {} bytes",
            size, config.max_file_bytes
        )));
    }
    if file.bytes.is_empty() {
        return Err(reject("file is empty".into()));
    }

    Ok(ext)
}

fn extension_for_mime(mime: &str) -> Option<String> {
    let ext = match mime.to_ascii_lowercase().as_str() {
        "application/pdf" => "pdf",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/tiff" => "tiff",
        "image/bmp" | "image/x-ms-bmp" => "bmp",
        _ => return None,
    };
    Some(ext.to_string())
}

fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded".to_string()
}

/// Path form of a resolved CLI argument, for messages.
pub fn display_name(input: &str) -> String {
    if is_url(input) {
        filename_from_url(input)
    } else {
        PathBuf::from(input)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.to_string())
    }
}
