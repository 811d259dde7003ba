//! OCR executor: one pooled engine, bounded retries, normalised output.
//!
//! ## Retry strategy
//!
//! Engine calls can fail spuriously (a crashed worker thread, a model load
//! hiccup). Those surface as [`EngineError::Transient`] and are retried with
//! exponential backoff via [`crate::retry::retry_with_backoff`]. Input and
//! availability errors fail on the first attempt.
//!
//! A handle whose call panicked is swapped for a fresh one before the next
//! attempt, and the poisoned one is disposed by the pool.

use crate::config::PipelineConfig;
use crate::engine::{EngineParams, RawRecognition};
use crate::error::{EngineError, SiteScanError};
use crate::output::{BoundingBox, RecognitionResult};
use crate::pool::{PooledWorker, WorkerPool};
use crate::retry::{retry_with_backoff, RetryError, RetryPolicy};
use image::DynamicImage;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Recognise `image` with a handle from `pool`.
///
/// The handle is held for the whole call, retries included, and returned to
/// the pool when this function returns.
pub async fn recognize(
    pool: &Arc<WorkerPool>,
    image: Arc<DynamicImage>,
    config: &PipelineConfig,
    job_id: Uuid,
) -> Result<RecognitionResult, SiteScanError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(SiteScanError::InvalidBitmap(format!(
            "bitmap is {}x{}",
            image.width(),
            image.height()
        )));
    }

    let slot: Arc<Mutex<Option<PooledWorker>>> = Arc::new(Mutex::new(Some(pool.acquire().await?)));
    let params = Arc::new(config.engine.clone());
    let policy = RetryPolicy::new(
        config.max_attempts,
        Duration::from_millis(config.retry_backoff_ms),
    );
    let callback = config.progress_callback.clone();
    let max_attempts = policy.max_attempts;
    let label = format!("recognize {}", job_id);

    let outcome = retry_with_backoff(
        &policy,
        &label,
        |attempt, e: &EngineError| {
            if let Some(cb) = &callback {
                cb.on_retry(job_id, attempt, max_attempts, &e.to_string());
            }
        },
        |attempt| {
            let slot = Arc::clone(&slot);
            let image = Arc::clone(&image);
            let params = Arc::clone(&params);
            let pool = Arc::clone(pool);
            async move {
                let needs_fresh = slot.lock().as_ref().map_or(true, PooledWorker::is_poisoned);
                if needs_fresh {
                    debug!("Attempt {}: replacing poisoned worker", attempt);
                    let fresh = pool
                        .acquire()
                        .await
                        .map_err(|e| EngineError::Unavailable(e.to_string()))?;
                    // Dropping the old handle disposes it.
                    *slot.lock() = Some(fresh);
                }
                tokio::task::spawn_blocking(move || run_once(&slot, &params, &image))
                    .await
                    .map_err(|e| EngineError::Transient(format!("recognition task panicked: {}", e)))?
            }
        },
    )
    .await;

    let raw = outcome.map_err(into_job_error)?;
    let result = normalize(raw);
    debug!(
        "Job {}: recognised {} words, {} chars, confidence {:.2}",
        job_id,
        result.words.len(),
        result.text.len(),
        result.confidence
    );
    Ok(result)
}

fn run_once(
    slot: &Mutex<Option<PooledWorker>>,
    params: &EngineParams,
    image: &DynamicImage,
) -> Result<RawRecognition, EngineError> {
    let mut guard = slot.lock();
    let worker = guard
        .as_mut()
        .ok_or_else(|| EngineError::Unavailable("no worker checked out".into()))?;
    worker.run(|engine| {
        engine.configure(params)?;
        engine.recognize(image)
    })
}

fn into_job_error(err: RetryError<EngineError>) -> SiteScanError {
    match err.last_error {
        EngineError::InvalidInput(detail) => SiteScanError::InvalidBitmap(detail),
        EngineError::Unavailable(detail) => SiteScanError::EngineUnavailable(detail),
        EngineError::Transient(detail) => SiteScanError::Engine {
            attempts: err.attempts,
            detail,
        },
    }
}

/// Convert raw engine output to the public result.
///
/// Empty words are dropped. Overall confidence is the mean of the remaining
/// word confidences, rescaled from 0–100 to `[0, 1]`.
pub fn normalize(raw: RawRecognition) -> RecognitionResult {
    let words: Vec<BoundingBox> = raw
        .words
        .into_iter()
        .filter(|w| !w.text.trim().is_empty())
        .map(|w| {
            let (x, y, width, height) = w.bbox;
            BoundingBox {
                text: w.text,
                x,
                y,
                width,
                height,
                confidence: (w.confidence / 100.0).clamp(0.0, 1.0),
            }
        })
        .collect();

    let confidence = if words.is_empty() {
        0.0
    } else {
        let sum: f32 = words.iter().map(|w| w.confidence).sum();
        (sum / words.len() as f32).clamp(0.0, 1.0)
    };

    RecognitionResult {
        text: raw.text,
        confidence,
        words,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineFactory, RawWord, RecognitionEngine};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn word(text: &str, confidence: f32) -> RawWord {
        RawWord {
            text: text.to_string(),
            bbox: (1.0, 2.0, 30.0, 10.0),
            confidence,
        }
    }

    #[test]
    fn normalize_averages_non_empty_words() {
        let raw = RawRecognition {
            text: "semen portland".into(),
            words: vec![word("semen", 90.0), word("  ", 10.0), word("portland", 70.0)],
        };
        let out = normalize(raw);
        assert_eq!(out.words.len(), 2);
        assert!((out.confidence - 0.8).abs() < 1e-6);
        assert!((out.words[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn normalize_no_words_is_zero() {
        let out = normalize(RawRecognition {
            text: String::new(),
            words: vec![word("", 99.0)],
        });
        assert_eq!(out.confidence, 0.0);
        assert!(out.words.is_empty());
    }

    #[test]
    fn normalize_clamps_out_of_range_confidence() {
        let out = normalize(RawRecognition {
            text: "x".into(),
            words: vec![word("x", 180.0), word("y", -5.0)],
        });
        assert!((0.0..=1.0).contains(&out.confidence));
        assert_eq!(out.words[0].confidence, 1.0);
        assert_eq!(out.words[1].confidence, 0.0);
    }

    /// Panics on the first call it ever receives, then answers normally.
    struct PanicOnceEngine {
        calls: Arc<AtomicUsize>,
    }

    impl RecognitionEngine for PanicOnceEngine {
        fn configure(&mut self, _params: &EngineParams) -> Result<(), EngineError> {
            Ok(())
        }

        fn recognize(&mut self, _image: &DynamicImage) -> Result<RawRecognition, EngineError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("engine segfault stand-in");
            }
            Ok(RawRecognition {
                text: "beton".into(),
                words: vec![word("beton", 88.0)],
            })
        }
    }

    struct PanicOnceFactory {
        calls: Arc<AtomicUsize>,
    }

    impl EngineFactory for PanicOnceFactory {
        fn name(&self) -> &str {
            "panic-once"
        }

        fn create(&self) -> Result<Box<dyn RecognitionEngine>, EngineError> {
            Ok(Box::new(PanicOnceEngine {
                calls: Arc::clone(&self.calls),
            }))
        }
    }

    struct RejectingEngine;

    impl RecognitionEngine for RejectingEngine {
        fn configure(&mut self, _params: &EngineParams) -> Result<(), EngineError> {
            Ok(())
        }

        fn recognize(&mut self, _image: &DynamicImage) -> Result<RawRecognition, EngineError> {
            Err(EngineError::InvalidInput("unsupported pixel layout".into()))
        }
    }

    struct RejectingFactory;

    impl EngineFactory for RejectingFactory {
        fn name(&self) -> &str {
            "rejecting"
        }

        fn create(&self) -> Result<Box<dyn RecognitionEngine>, EngineError> {
            Ok(Box::new(RejectingEngine))
        }
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig::builder().retry_backoff_ms(1).build().unwrap()
    }

    #[tokio::test]
    async fn zero_sized_bitmap_is_rejected_before_acquire() {
        let pool = WorkerPool::new(Arc::new(RejectingFactory), 1);
        let err = recognize(
            &pool,
            Arc::new(DynamicImage::new_rgba8(0, 10)),
            &fast_config(),
            Uuid::new_v4(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SiteScanError::InvalidBitmap(_)));
        assert_eq!(pool.stats().created, 0);
    }

    #[tokio::test]
    async fn invalid_input_is_not_retried() {
        let pool = WorkerPool::new(Arc::new(RejectingFactory), 1);
        let err = recognize(
            &pool,
            Arc::new(DynamicImage::new_rgba8(4, 4)),
            &fast_config(),
            Uuid::new_v4(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SiteScanError::InvalidBitmap(_)));
        assert_eq!(pool.stats().checked_out, 0);
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn panicking_engine_is_replaced_and_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = WorkerPool::new(
            Arc::new(PanicOnceFactory {
                calls: Arc::clone(&calls),
            }),
            2,
        );
        let out = recognize(
            &pool,
            Arc::new(DynamicImage::new_rgba8(8, 8)),
            &fast_config(),
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        assert_eq!(out.text, "beton");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let stats = pool.stats();
        assert_eq!(stats.created, 2);
        assert_eq!(stats.disposed, 1);
        assert_eq!(stats.checked_out, 0);
        assert_eq!(stats.idle, 1);
    }
}
