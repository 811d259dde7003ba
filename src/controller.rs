//! Job orchestration: one document in, one [`JobOutput`] or [`JobFailure`] out.
//!
//! ```text
//! start ──▶ registry: queued
//!   ├─ validate        (no engine touched on rejection)
//!   ├─ preprocessing   decode, downscale, binarise       [spawn_blocking]
//!   ├─ recognizing     pooled engine + retry             [spawn_blocking]
//!   ├─ extracting      8 extractors, joined              [spawn_blocking ×8]
//!   └─ completed | failed  ──▶ registry + caller
//! ```
//!
//! Every failure is reported twice: it is recorded on the job in the
//! [`StatusRegistry`] for pollers, and returned to the caller that started the
//! job. Stages within a job run strictly in order; separate jobs run fully
//! concurrently and share only the worker pool and the registry.

use crate::config::PipelineConfig;
use crate::engine::EngineFactory;
use crate::error::SiteScanError;
use crate::job::{Job, JobStatus};
use crate::output::{DocumentInfo, JobOutput};
use crate::pipeline::input::{self, DocumentFile};
use crate::pipeline::{extract, preprocess, recognize};
use crate::pool::{PoolStats, WorkerPool};
use crate::registry::StatusRegistry;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

/// A failed job, as returned to the caller that started it.
#[derive(Debug, Error)]
#[error("job {job_id} ({document_id}) failed after {processing_time_ms}ms: {error}")]
pub struct JobFailure {
    pub job_id: Uuid,
    pub document_id: String,
    pub processing_time_ms: u64,
    #[source]
    pub error: SiteScanError,
}

/// Owns the worker pool and the status registry for one pipeline instance.
pub struct JobController {
    config: Arc<PipelineConfig>,
    pool: Arc<WorkerPool>,
    registry: Arc<StatusRegistry>,
}

impl JobController {
    /// Build the pool (warming it when configured) and an empty registry.
    pub async fn startup(factory: Arc<dyn EngineFactory>, config: PipelineConfig) -> Self {
        info!(
            "Starting pipeline: pool_size={}, max_attempts={}, backend={}",
            config.pool_size,
            config.max_attempts,
            factory.name()
        );
        let pool = if config.warm_up {
            WorkerPool::warm_up(factory, config.pool_size).await
        } else {
            WorkerPool::new(factory, config.pool_size)
        };
        let registry = Arc::new(StatusRegistry::new(config.retention));
        Self {
            config: Arc::new(config),
            pool,
            registry,
        }
    }

    /// Process one document to completion.
    pub async fn start(
        &self,
        file: DocumentFile,
        document_id: impl Into<String>,
    ) -> Result<JobOutput, JobFailure> {
        self.start_with_cancel(file, document_id, CancellationToken::new())
            .await
    }

    /// Like [`start`](Self::start), but gives up at the next stage boundary
    /// once `cancel` fires. A recognition call already running is not
    /// interrupted.
    pub async fn start_with_cancel(
        &self,
        file: DocumentFile,
        document_id: impl Into<String>,
        cancel: CancellationToken,
    ) -> Result<JobOutput, JobFailure> {
        let started = Instant::now();
        let job_id = Uuid::new_v4();
        let document_id = document_id.into();

        self.registry.insert(Job::new(job_id, document_id.clone()));
        info!("Job {} queued: document '{}' ({})", job_id, document_id, file.name);
        if let Some(cb) = &self.config.progress_callback {
            cb.on_job_start(job_id, &document_id);
        }

        match self
            .run_stages(job_id, &document_id, &file, &cancel, started)
            .await
        {
            Ok(output) => {
                self.registry.update(&job_id, |job| job.complete(output.clone()));
                info!(
                    "Job {} completed in {}ms: {} chars, confidence {:.2}, {} fields",
                    job_id,
                    output.processing_time_ms,
                    output.extracted_text.len(),
                    output.confidence,
                    output.extracted_data.total()
                );
                if let Some(cb) = &self.config.progress_callback {
                    cb.on_job_complete(
                        job_id,
                        output.processing_time_ms,
                        output.extracted_text.chars().count(),
                    );
                }
                Ok(output)
            }
            Err(err) => {
                let processing_time_ms = elapsed_ms(started);
                let message = err.to_string();
                self.registry
                    .update(&job_id, |job| job.fail(message.clone(), processing_time_ms));
                error!(
                    "Job {} failed after {}ms [{:?}]: {}",
                    job_id,
                    processing_time_ms,
                    err.kind(),
                    message
                );
                if let Some(cb) = &self.config.progress_callback {
                    cb.on_job_failed(job_id, &message);
                }
                Err(JobFailure {
                    job_id,
                    document_id,
                    processing_time_ms,
                    error: err,
                })
            }
        }
    }

    async fn run_stages(
        &self,
        job_id: Uuid,
        document_id: &str,
        file: &DocumentFile,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<JobOutput, SiteScanError> {
        let ext = input::validate(file, &self.config)?;

        self.enter(job_id, JobStatus::Preprocessing, cancel)?;
        let image = preprocess::preprocess(file, &ext, &self.config).await?;
        debug!(
            "Job {}: {}x{} → {}x{}",
            job_id,
            image.original_width,
            image.original_height,
            image.width(),
            image.height()
        );

        self.enter(job_id, JobStatus::Recognizing, cancel)?;
        let recognition =
            recognize::recognize(&self.pool, Arc::new(image.image), &self.config, job_id).await?;

        self.enter(job_id, JobStatus::Extracting, cancel)?;
        let extracted_data = extract::extract(
            &recognition.text,
            &recognition.words,
            &self.config.extraction,
        )
        .await;

        Ok(JobOutput {
            id: job_id,
            document_id: document_id.to_string(),
            extracted_text: recognition.text,
            confidence: recognition.confidence,
            bounding_boxes: recognition.words,
            extracted_data,
            processing_time_ms: elapsed_ms(started),
            timestamp: Utc::now(),
            status: JobStatus::Completed,
        })
    }

    /// Stage boundary: honour cancellation, then record the transition.
    fn enter(
        &self,
        job_id: Uuid,
        stage: JobStatus,
        cancel: &CancellationToken,
    ) -> Result<(), SiteScanError> {
        if cancel.is_cancelled() {
            return Err(SiteScanError::Cancelled { stage });
        }
        self.registry.update(&job_id, |job| job.advance(stage));
        debug!("Job {} → {} ({}%)", job_id, stage, stage.progress());
        if let Some(cb) = &self.config.progress_callback {
            cb.on_stage(job_id, stage, stage.progress());
        }
        Ok(())
    }

    /// Process many documents, at most `concurrency` at a time.
    ///
    /// Results are in input order; one failure does not stop the others.
    pub async fn process_all(
        &self,
        files: Vec<(DocumentFile, String)>,
        concurrency: usize,
    ) -> Vec<Result<JobOutput, JobFailure>> {
        stream::iter(files)
            .map(|(file, document_id)| self.start(file, document_id))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    /// Snapshot of a job's current state.
    pub fn status(&self, job_id: &Uuid) -> Option<Job> {
        self.registry.get(job_id)
    }

    pub fn registry(&self) -> Arc<StatusRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn pool(&self) -> Arc<WorkerPool> {
        Arc::clone(&self.pool)
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Dispose idle engines. Jobs still running return theirs afterwards.
    pub fn shutdown(&self) {
        let stats = self.pool.stats();
        info!(
            "Shutting down: {} engines created ({} overflow), {} jobs in registry",
            stats.created,
            stats.overflow_created,
            self.registry.len()
        );
        self.pool.cleanup();
    }
}

/// Validate and decode a document without recognising it.
pub async fn inspect(file: &DocumentFile, config: &PipelineConfig) -> Result<DocumentInfo, SiteScanError> {
    let ext = input::validate(file, config)?;
    let name = file.name.clone();
    let bytes = file.bytes.clone();
    let decode_ext = ext.clone();
    let max_dimension = config.max_dimension;

    let (width, height) = tokio::task::spawn_blocking(move || {
        preprocess::decode(&name, &decode_ext, &bytes, max_dimension).map(|img| (img.width(), img.height()))
    })
    .await
    .map_err(|e| SiteScanError::Internal(format!("Inspect task panicked: {}", e)))??;

    let (normalized_width, normalized_height) =
        preprocess::target_dimensions(width, height, config.max_dimension);
    Ok(DocumentInfo {
        file_name: file.name.clone(),
        extension: ext,
        size_bytes: file.effective_size(),
        width,
        height,
        normalized_width,
        normalized_height,
    })
}

/// Whole milliseconds since `started`, rounded up; never 0 for a finished job.
fn elapsed_ms(started: Instant) -> u64 {
    (started.elapsed().as_micros() as u64).div_ceil(1000).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbaImage};

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(w, h));
        preprocess::encode_png(&img).unwrap()
    }

    #[tokio::test]
    async fn inspect_reports_normalized_dimensions() {
        let file = DocumentFile::new("denah.png", png(3000, 1500));
        let info = inspect(&file, &PipelineConfig::default()).await.unwrap();
        assert_eq!(info.extension, "png");
        assert_eq!((info.width, info.height), (3000, 1500));
        assert_eq!((info.normalized_width, info.normalized_height), (2000, 1000));
    }

    #[tokio::test]
    async fn inspect_rejects_unsupported_extension() {
        let file = DocumentFile::new("virus.exe", vec![1, 2, 3]);
        let err = inspect(&file, &PipelineConfig::default()).await.unwrap_err();
        assert!(matches!(err, SiteScanError::Validation { .. }));
    }

    #[test]
    fn elapsed_rounds_sub_millisecond_up() {
        assert!(elapsed_ms(Instant::now()) >= 1);
        let earlier = Instant::now() - std::time::Duration::from_micros(2_300);
        assert!(elapsed_ms(earlier) >= 3);
    }

    #[test]
    fn job_failure_display_includes_cause() {
        let failure = JobFailure {
            job_id: Uuid::nil(),
            document_id: "doc-7".into(),
            processing_time_ms: 12,
            error: SiteScanError::InvalidBitmap("bitmap is 0x0".into()),
        };
        let msg = failure.to_string();
        assert!(msg.contains("doc-7"));
        assert!(msg.contains("12ms"));
        assert!(msg.contains("0x0"));
    }
}
