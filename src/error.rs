//! Error types for the sitescan library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`SiteScanError`]: **Fatal for one job**: the document cannot be
//!   processed (rejected upload, corrupt image, engine still failing after
//!   retries). The controller records it in the status registry and returns it
//!   to the caller inside [`crate::controller::JobFailure`].
//!
//! * [`EngineError`]: raised by a [`crate::engine::RecognitionEngine`]
//!   implementation. Only [`EngineError::Transient`] is retried; the executor
//!   converts whatever is left into a [`SiteScanError`].
//!
//! * [`ExtractionError`]: **Non-fatal**: one field category failed. It is
//!   logged and swallowed; the category comes back empty and the job still
//!   completes.
//!
//! Soft pool overflow is not an error at all. It is logged as a warning and
//! counted in [`crate::pool::PoolStats`].

use crate::job::JobStatus;
use crate::pipeline::extract::FieldCategory;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse error taxonomy exposed to callers and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    ValidationError,
    DecodeError,
    EngineError,
    Cancelled,
    InputError,
    ConfigError,
    InternalError,
}

/// All errors that fail a job.
#[derive(Debug, Error)]
pub enum SiteScanError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Upload rejected before any processing (bad extension, too large, empty).
    #[error("Invalid document '{file}': {reason}")]
    Validation { file: String, reason: String },

    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Image errors ──────────────────────────────────────────────────────
    /// The bytes passed validation but could not be decoded as an image or PDF.
    #[error("Could not decode '{file}': {detail}")]
    Decode { file: String, detail: String },

    /// The bitmap handed to the recognizer is unusable (zero-sized, etc.).
    #[error("Invalid bitmap: {0}")]
    InvalidBitmap(String),

    // ── Engine errors ─────────────────────────────────────────────────────
    /// Recognition failed and retrying did not help.
    #[error("Recognition failed after {attempts} attempt(s): {detail}")]
    Engine { attempts: u32, detail: String },

    /// No recognition engine could be created for an empty pool.
    #[error("No recognition engine available: {0}")]
    EngineUnavailable(String),

    // ── Job control ───────────────────────────────────────────────────────
    /// The caller cancelled the job; observed before entering `stage`.
    #[error("Job cancelled before the {stage} stage")]
    Cancelled { stage: JobStatus },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SiteScanError {
    /// Map onto the coarse taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SiteScanError::Validation { .. } => ErrorKind::ValidationError,
            SiteScanError::FileNotFound { .. }
            | SiteScanError::PermissionDenied { .. }
            | SiteScanError::DownloadFailed { .. }
            | SiteScanError::DownloadTimeout { .. }
            | SiteScanError::OutputWriteFailed { .. } => ErrorKind::InputError,
            SiteScanError::Decode { .. } | SiteScanError::InvalidBitmap(_) => {
                ErrorKind::DecodeError
            }
            SiteScanError::Engine { .. } | SiteScanError::EngineUnavailable(_) => {
                ErrorKind::EngineError
            }
            SiteScanError::Cancelled { .. } => ErrorKind::Cancelled,
            SiteScanError::InvalidConfig(_) => ErrorKind::ConfigError,
            SiteScanError::Internal(_) => ErrorKind::InternalError,
        }
    }
}

/// Error reported by a recognition engine implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Crash, timeout, or other failure that may succeed on another attempt.
    #[error("transient engine failure: {0}")]
    Transient(String),

    /// The engine rejected its input; retrying the same bitmap cannot help.
    #[error("engine rejected input: {0}")]
    InvalidInput(String),

    /// The engine could not be created or configured (missing models etc.).
    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

/// A non-fatal failure of one extraction category.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ExtractionError {
    /// The extractor panicked; its collection is left empty.
    #[error("{category:?} extractor panicked: {detail}")]
    Panicked {
        category: FieldCategory,
        detail: String,
    },

    /// The extractor task was cancelled by the runtime.
    #[error("{category:?} extractor was cancelled")]
    Cancelled { category: FieldCategory },
}
