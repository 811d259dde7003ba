//! Progress-callback trait for per-job pipeline events.
//!
//! Inject an [`Arc<dyn JobProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as each job moves through the stages. The same information is
//! available by polling [`crate::registry::StatusRegistry`]; the callback is
//! the push-style alternative for progress bars and webhooks.
//!
//! # Example
//!
//! ```rust
//! use sitescan::{JobProgressCallback, JobStatus, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//! use uuid::Uuid;
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl JobProgressCallback for CountingCallback {
//!     fn on_job_complete(&self, job_id: Uuid, processing_time_ms: u64, text_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{} done in {} ms ({} chars)", job_id, processing_time_ms, text_len);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn JobProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::job::JobStatus;
use std::sync::Arc;
use uuid::Uuid;

/// Called by the job controller as jobs advance.
///
/// Jobs run concurrently, so any method may be called from several tasks at
/// once. All methods default to no-ops.
pub trait JobProgressCallback: Send + Sync {
    /// A job was registered and is about to be validated.
    fn on_job_start(&self, job_id: Uuid, document_id: &str) {
        let _ = (job_id, document_id);
    }

    /// A job entered a new non-terminal stage.
    ///
    /// # Arguments
    /// * `status`   - the stage just entered
    /// * `progress` - the stage's fixed percentage
    fn on_stage(&self, job_id: Uuid, status: JobStatus, progress: u8) {
        let _ = (job_id, status, progress);
    }

    /// A recognition attempt failed transiently and will be retried.
    fn on_retry(&self, job_id: Uuid, attempt: u32, max_attempts: u32, error: &str) {
        let _ = (job_id, attempt, max_attempts, error);
    }

    /// A job completed. `text_len` is the character count of the recognised text.
    fn on_job_complete(&self, job_id: Uuid, processing_time_ms: u64, text_len: usize) {
        let _ = (job_id, processing_time_ms, text_len);
    }

    /// A job failed; `error` is the message stored in the registry.
    fn on_job_failed(&self, job_id: Uuid, error: &str) {
        let _ = (job_id, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl JobProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn JobProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        stages: Mutex<Vec<(JobStatus, u8)>>,
        retries: AtomicUsize,
        completes: AtomicUsize,
        failures: AtomicUsize,
    }

    impl JobProgressCallback for TrackingCallback {
        fn on_stage(&self, _job_id: Uuid, status: JobStatus, progress: u8) {
            self.stages.lock().push((status, progress));
        }

        fn on_retry(&self, _job_id: Uuid, _attempt: u32, _max: u32, _error: &str) {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }

        fn on_job_complete(&self, _job_id: Uuid, _ms: u64, _len: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_job_failed(&self, _job_id: Uuid, _error: &str) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        let id = Uuid::new_v4();
        cb.on_job_start(id, "doc-1");
        cb.on_stage(id, JobStatus::Preprocessing, 10);
        cb.on_retry(id, 1, 3, "engine crashed");
        cb.on_job_complete(id, 120, 42);
        cb.on_job_failed(id, "boom");
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        let id = Uuid::new_v4();

        tracker.on_stage(id, JobStatus::Preprocessing, 10);
        tracker.on_stage(id, JobStatus::Recognizing, 30);
        tracker.on_retry(id, 1, 3, "timeout");
        tracker.on_stage(id, JobStatus::Extracting, 70);
        tracker.on_job_complete(id, 900, 1024);

        assert_eq!(
            *tracker.stages.lock(),
            vec![
                (JobStatus::Preprocessing, 10),
                (JobStatus::Recognizing, 30),
                (JobStatus::Extracting, 70)
            ]
        );
        assert_eq!(tracker.retries.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.failures.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_job_start(Uuid::new_v4(), "doc-2");
    }
}
