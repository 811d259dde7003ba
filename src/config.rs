//! Configuration types for the ingestion pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. One struct means one place to look when two
//! runs behave differently, and it is cheap to share across jobs behind an
//! `Arc`.

use crate::engine::EngineParams;
use crate::error::SiteScanError;
use crate::progress::ProgressCallback;
use crate::registry::RetentionPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Extensions accepted at the validation boundary.
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 6] = ["pdf", "jpg", "jpeg", "png", "tiff", "bmp"];

/// 50 MB upload ceiling.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;

/// Configuration for the ingestion pipeline.
///
/// # Example
/// ```rust
/// use sitescan::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .pool_size(4)
///     .max_attempts(3)
///     .build()
///     .unwrap();
/// assert_eq!(config.pool_size, 4);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Maximum number of idle engine handles the pool retains. Default: 2.
    ///
    /// Each handle holds a loaded recognition model, so this bounds resident
    /// memory. Jobs beyond this count still run; they get an overflow handle
    /// that is disposed on release.
    pub pool_size: usize,

    /// Create `pool_size` handles at startup instead of on first use. Default: true.
    pub warm_up: bool,

    /// Largest accepted upload in bytes. Default: 50 MB.
    pub max_file_bytes: u64,

    /// Accepted file extensions, lower-case, without the dot.
    pub allowed_extensions: Vec<String>,

    /// Longest edge of the normalised bitmap in pixels. Default: 2000.
    pub max_dimension: u32,

    /// Grayscale cut-off for binarisation. Default: 128.
    pub binarize_threshold: u8,

    /// Total recognition attempts for transient engine failures. Default: 3.
    pub max_attempts: u32,

    /// Initial retry delay in milliseconds; doubles after each attempt. Default: 200.
    pub retry_backoff_ms: u64,

    /// Parameters pushed to the engine before every recognition call.
    pub engine: EngineParams,

    /// Field extraction knobs.
    pub extraction: ExtractionConfig,

    /// How long finished jobs stay queryable in the status registry.
    pub retention: RetentionPolicy,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-job event sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pool_size: 2,
            warm_up: true,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_dimension: 2000,
            binarize_threshold: 128,
            max_attempts: 3,
            retry_backoff_ms: 200,
            engine: EngineParams::default(),
            extraction: ExtractionConfig::default(),
            retention: RetentionPolicy::default(),
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("pool_size", &self.pool_size)
            .field("warm_up", &self.warm_up)
            .field("max_file_bytes", &self.max_file_bytes)
            .field("allowed_extensions", &self.allowed_extensions)
            .field("max_dimension", &self.max_dimension)
            .field("binarize_threshold", &self.binarize_threshold)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("engine", &self.engine)
            .field("extraction", &self.extraction)
            .field("retention", &self.retention)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn JobProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether `ext` (any case, no dot) is accepted.
    pub fn accepts_extension(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        self.allowed_extensions.iter().any(|a| *a == ext)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn pool_size(mut self, n: usize) -> Self {
        self.config.pool_size = n.max(1);
        self
    }

    pub fn warm_up(mut self, v: bool) -> Self {
        self.config.warm_up = v;
        self
    }

    pub fn max_file_bytes(mut self, n: u64) -> Self {
        self.config.max_file_bytes = n;
        self
    }

    pub fn allowed_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_extensions = exts
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn max_dimension(mut self, px: u32) -> Self {
        self.config.max_dimension = px.max(100);
        self
    }

    pub fn binarize_threshold(mut self, t: u8) -> Self {
        self.config.binarize_threshold = t;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn engine(mut self, params: EngineParams) -> Self {
        self.config.engine = params;
        self
    }

    pub fn extraction(mut self, extraction: ExtractionConfig) -> Self {
        self.config.extraction = extraction;
        self
    }

    pub fn retention(mut self, retention: RetentionPolicy) -> Self {
        self.config.retention = retention;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, SiteScanError> {
        let c = &self.config;
        if c.pool_size == 0 {
            return Err(SiteScanError::InvalidConfig("Pool size must be ≥ 1".into()));
        }
        if c.max_file_bytes == 0 {
            return Err(SiteScanError::InvalidConfig(
                "Maximum file size must be > 0".into(),
            ));
        }
        if c.allowed_extensions.is_empty() {
            return Err(SiteScanError::InvalidConfig(
                "At least one file extension must be allowed".into(),
            ));
        }
        if c.extraction.table_min_lines == 0 || c.extraction.table_min_segments == 0 {
            return Err(SiteScanError::InvalidConfig(format!(
                "Table thresholds must be ≥ 1, got {} lines / {} segments",
                c.extraction.table_min_lines, c.extraction.table_min_segments
            )));
        }
        Ok(self.config)
    }
}

/// Knobs for [`crate::pipeline::extract`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Minimum consecutive multi-column lines that form a table. Default: 3.
    pub table_min_lines: usize,
    /// Minimum tab / multi-space separated segments per table line. Default: 2.
    pub table_min_segments: usize,
    /// Collapse repeated material/personnel keyword hits. Default: false.
    pub dedupe_keywords: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            table_min_lines: 3,
            table_min_segments: 2,
            dedupe_keywords: false,
        }
    }
}
