//! # sitescan
//!
//! OCR ingestion for construction-site paperwork: daily reports, delivery
//! notes, purchase orders, inspection sheets. A photo or scanned PDF goes in;
//! recognised text, word boxes and typed fields (dates, amounts, materials,
//! personnel, coordinates, specifications, signatures, tables) come out.
//!
//! ## Pipeline Overview
//!
//! ```text
//! DocumentFile
//!  │
//!  ├─ 1. Validate    extension / size gate, before any engine is touched
//!  ├─ 2. Preprocess  decode or rasterise, cap at 2000 px, binarise (spawn_blocking)
//!  ├─ 3. Recognize   pooled engine handle, up to 3 attempts with backoff
//!  ├─ 4. Extract     8 rule-based extractors in parallel, failures isolated
//!  └─ 5. Output      JobOutput + status registry entry
//! ```
//!
//! Recognition engines are expensive to load, so a [`WorkerPool`] keeps a
//! bounded number of them warm. It never blocks a job: when every handle is
//! busy an extra one is created and disposed afterwards.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sitescan::{DocumentFile, EngineFactory, JobController, PipelineConfig};
//! use std::sync::Arc;
//!
//! # async fn run(factory: Arc<dyn EngineFactory>) -> Result<(), Box<dyn std::error::Error>> {
//! let controller = JobController::startup(factory, PipelineConfig::default()).await;
//! let file = DocumentFile::from_path("laporan-harian.jpg").await?;
//! let output = controller.start(file, "site-42/2025-01-15").await?;
//! println!("{}", output.extracted_text);
//! println!("{} dates, {} amounts", output.extracted_data.dates.len(), output.extracted_data.amounts.len());
//! controller.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `sitescan` binary (clap + anyhow + indicatif + tracing-subscriber) |
//! | `ocr`   | off     | Bundles an [`ocrs`](https://crates.io/crates/ocrs) recognition backend |
//!
//! Without `ocr` the library is engine-agnostic: implement
//! [`RecognitionEngine`] and [`EngineFactory`] for your own backend.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod registry;
pub mod retry;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, PipelineConfig, PipelineConfigBuilder};
pub use controller::{inspect, JobController, JobFailure};
pub use engine::{EngineFactory, EngineParams, PageSegmentation, RawRecognition, RawWord, RecognitionEngine};
pub use error::{EngineError, ErrorKind, ExtractionError, SiteScanError};
pub use job::{Job, JobStatus};
pub use output::{BoundingBox, DocumentInfo, JobOutput, RecognitionResult};
pub use pipeline::extract::{ExtractedData, ExtractedField, FieldCategory, FieldKind};
pub use pipeline::input::DocumentFile;
pub use pool::{PoolStats, PooledWorker, WorkerPool};
pub use progress::{JobProgressCallback, NoopProgressCallback, ProgressCallback};
pub use registry::{RetentionPolicy, StatusRegistry};
pub use retry::{retry_with_backoff, RetryPolicy, Retryable};
pub use stream::{process_stream, JobStream};
