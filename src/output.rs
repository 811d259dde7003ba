//! Result types returned to callers.
//!
//! [`JobOutput`] is the serialised contract of a finished job. Field names are
//! camelCase on the wire (`documentId`, `extractedText`, …) because the
//! consumers of this output are web services.

use crate::error::SiteScanError;
use crate::job::JobStatus;
use crate::pipeline::extract::ExtractedData;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// A recognised word and where it sits on the normalised bitmap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Word confidence in `[0, 1]`.
    pub confidence: f32,
}

/// Output of one recognition call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub text: String,
    /// Mean word confidence in `[0, 1]`; `0.0` when nothing was recognised.
    pub confidence: f32,
    pub words: Vec<BoundingBox>,
}

/// Final result of a completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutput {
    pub id: Uuid,
    pub document_id: String,
    pub extracted_text: String,
    pub confidence: f32,
    pub bounding_boxes: Vec<BoundingBox>,
    pub extracted_data: ExtractedData,
    pub processing_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub status: JobStatus,
}

/// Image facts reported by [`crate::controller::inspect`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub file_name: String,
    pub extension: String,
    pub size_bytes: u64,
    pub width: u32,
    pub height: u32,
    /// Dimensions after the long-edge cap is applied.
    pub normalized_width: u32,
    pub normalized_height: u32,
}

/// Serialise `value` as pretty JSON into `path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn write_json_atomic<T: Serialize + ?Sized>(
    path: impl AsRef<Path>,
    value: &T,
) -> Result<(), SiteScanError> {
    let path = path.as_ref();
    let write_err = |source: std::io::Error| SiteScanError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| SiteScanError::Internal(format!("JSON serialisation failed: {}", e)))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}
