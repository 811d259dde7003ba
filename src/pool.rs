//! Bounded, reusable pool of recognition engine handles.
//!
//! Loading an engine costs seconds and hundreds of megabytes, so handles are
//! reused across jobs. The pool never makes a caller wait for capacity: when
//! the idle stack is empty a new handle is built on the spot ("soft
//! overflow"), and the surplus is disposed on release so that at most
//! `max_idle` handles are ever retained.
//!
//! ```text
//!  acquire ──▶ pop idle (LIFO) ──▶ PooledWorker ──drop──▶ push back   (idle < max)
//!                 │ empty                              └──▶ dispose     (idle = max, or poisoned)
//!                 └──▶ factory.create()  [spawn_blocking]
//! ```

use crate::engine::{EngineFactory, RecognitionEngine};
use crate::error::{EngineError, SiteScanError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counters describing pool activity since construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolStats {
    pub max_idle: usize,
    pub idle: usize,
    pub checked_out: usize,
    /// Engines built by the factory, warm-up included.
    pub created: usize,
    /// Engines built while the pool was already at capacity.
    pub overflow_created: usize,
    pub disposed: usize,
}

/// Pool of engine handles. Shared as `Arc<WorkerPool>`.
pub struct WorkerPool {
    factory: Arc<dyn EngineFactory>,
    idle: Mutex<Vec<Box<dyn RecognitionEngine>>>,
    max_idle: usize,
    checked_out: AtomicUsize,
    created: AtomicUsize,
    overflow_created: AtomicUsize,
    disposed: AtomicUsize,
}

impl WorkerPool {
    /// Create an empty pool; handles are built lazily on first acquire.
    pub fn new(factory: Arc<dyn EngineFactory>, max_idle: usize) -> Arc<Self> {
        Arc::new(Self {
            factory,
            idle: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle: max_idle.max(1),
            checked_out: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
            overflow_created: AtomicUsize::new(0),
            disposed: AtomicUsize::new(0),
        })
    }

    /// Create a pool and pre-build up to `max_idle` handles.
    ///
    /// Construction failures are logged and tolerated: the pool simply starts
    /// smaller and later acquires try again.
    pub async fn warm_up(factory: Arc<dyn EngineFactory>, max_idle: usize) -> Arc<Self> {
        let pool = Self::new(factory, max_idle);
        for i in 0..pool.max_idle {
            match pool.create_engine().await {
                Ok(engine) => pool.idle.lock().push(engine),
                Err(e) => warn!(
                    "Worker pool warm-up: engine {}/{} failed to start: {}",
                    i + 1,
                    pool.max_idle,
                    e
                ),
            }
        }
        info!(
            "Worker pool ready: {}/{} {} engines warm",
            pool.idle_count(),
            pool.max_idle,
            pool.factory.name()
        );
        pool
    }

    /// Check out a handle, building one if none is idle.
    ///
    /// Never waits for another job to release a handle.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledWorker, SiteScanError> {
        let popped = self.idle.lock().pop();
        let engine = match popped {
            Some(engine) => {
                self.checked_out.fetch_add(1, Ordering::SeqCst);
                engine
            }
            None => {
                // Reserve the slot before building so concurrent callers see it.
                let in_use = self.checked_out.fetch_add(1, Ordering::SeqCst);
                if in_use >= self.max_idle {
                    self.overflow_created.fetch_add(1, Ordering::SeqCst);
                    warn!(
                        "Worker pool exhausted ({} in use, max {}); creating overflow engine",
                        in_use, self.max_idle
                    );
                }
                match self.create_engine().await {
                    Ok(engine) => engine,
                    Err(e) => {
                        self.checked_out.fetch_sub(1, Ordering::SeqCst);
                        return Err(SiteScanError::EngineUnavailable(e.to_string()));
                    }
                }
            }
        };

        debug!(
            "Worker acquired ({} in use, {} idle)",
            self.checked_out.load(Ordering::SeqCst),
            self.idle_count()
        );
        Ok(PooledWorker {
            engine: Some(engine),
            pool: Arc::clone(self),
            poisoned: false,
        })
    }

    /// Return a handle: keep it if there is room, otherwise dispose it.
    ///
    /// Normally called by [`PooledWorker`]'s `Drop`.
    pub fn release(&self, engine: Box<dyn RecognitionEngine>) {
        let surplus = {
            let mut idle = self.idle.lock();
            if idle.len() < self.max_idle {
                idle.push(engine);
                None
            } else {
                Some(engine)
            }
        };
        if let Some(engine) = surplus {
            debug!("Worker pool full; disposing surplus engine");
            self.dispose(engine);
        }
    }

    /// Dispose every idle handle. Handles still checked out are disposed or
    /// kept as they come back.
    pub fn cleanup(&self) {
        let drained = std::mem::take(&mut *self.idle.lock());
        let n = drained.len();
        for engine in drained {
            self.dispose(engine);
        }
        info!("Worker pool cleaned up: {} engines disposed", n);
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn max_idle(&self) -> usize {
        self.max_idle
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            max_idle: self.max_idle,
            idle: self.idle_count(),
            checked_out: self.checked_out.load(Ordering::SeqCst),
            created: self.created.load(Ordering::SeqCst),
            overflow_created: self.overflow_created.load(Ordering::SeqCst),
            disposed: self.disposed.load(Ordering::SeqCst),
        }
    }

    async fn create_engine(&self) -> Result<Box<dyn RecognitionEngine>, EngineError> {
        let factory = Arc::clone(&self.factory);
        let engine = tokio::task::spawn_blocking(move || factory.create())
            .await
            .map_err(|e| EngineError::Unavailable(format!("engine construction panicked: {}", e)))??;
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(engine)
    }

    fn dispose(&self, mut engine: Box<dyn RecognitionEngine>) {
        engine.dispose();
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let remaining = std::mem::take(self.idle.get_mut());
        for mut engine in remaining {
            engine.dispose();
        }
    }
}

/// A checked-out engine handle.
///
/// Returned to the pool exactly once, when dropped. A handle whose last call
/// panicked is disposed instead of being handed to another job.
pub struct PooledWorker {
    engine: Option<Box<dyn RecognitionEngine>>,
    pool: Arc<WorkerPool>,
    poisoned: bool,
}

impl PooledWorker {
    /// Run `f` against the engine.
    pub fn run<R>(
        &mut self,
        f: impl FnOnce(&mut dyn RecognitionEngine) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        let engine = self
            .engine
            .as_deref_mut()
            .ok_or_else(|| EngineError::Unavailable("worker handle already released".into()))?;
        // Stays set if `f` unwinds.
        self.poisoned = true;
        let out = f(engine);
        self.poisoned = false;
        out
    }

    /// Whether the last [`run`](Self::run) unwound instead of returning.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }
}

impl Drop for PooledWorker {
    fn drop(&mut self) {
        let Some(engine) = self.engine.take() else {
            return;
        };
        self.pool.checked_out.fetch_sub(1, Ordering::SeqCst);
        if self.poisoned {
            warn!("Disposing engine whose recognition call panicked");
            self.pool.dispose(engine);
        } else {
            self.pool.release(engine);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineParams, RawRecognition};
    use image::DynamicImage;
    use std::sync::atomic::AtomicBool;

    struct NullEngine {
        disposed: Arc<AtomicUsize>,
    }

    impl RecognitionEngine for NullEngine {
        fn configure(&mut self, _params: &EngineParams) -> Result<(), EngineError> {
            Ok(())
        }

        fn recognize(&mut self, _image: &DynamicImage) -> Result<RawRecognition, EngineError> {
            Ok(RawRecognition::default())
        }

        fn dispose(&mut self) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct NullFactory {
        disposed: Arc<AtomicUsize>,
        fail: AtomicBool,
    }

    impl NullFactory {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                disposed: Arc::new(AtomicUsize::new(0)),
                fail: AtomicBool::new(false),
            })
        }
    }

    impl EngineFactory for NullFactory {
        fn name(&self) -> &str {
            "null"
        }

        fn create(&self) -> Result<Box<dyn RecognitionEngine>, EngineError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(EngineError::Unavailable("models missing".into()));
            }
            Ok(Box::new(NullEngine {
                disposed: Arc::clone(&self.disposed),
            }))
        }
    }

    #[tokio::test]
    async fn warm_up_fills_to_max() {
        let pool = WorkerPool::warm_up(NullFactory::new(), 3).await;
        assert_eq!(pool.idle_count(), 3);
        assert_eq!(pool.stats().created, 3);
    }

    #[tokio::test]
    async fn warm_up_tolerates_factory_failure() {
        let factory = NullFactory::new();
        factory.fail.store(true, Ordering::SeqCst);
        let pool = WorkerPool::warm_up(factory.clone(), 2).await;
        assert_eq!(pool.idle_count(), 0);

        // Later acquires still try to build lazily.
        factory.fail.store(false, Ordering::SeqCst);
        let worker = pool.acquire().await.unwrap();
        drop(worker);
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn acquire_on_empty_pool_with_failing_factory_errors() {
        let factory = NullFactory::new();
        factory.fail.store(true, Ordering::SeqCst);
        let pool = WorkerPool::new(factory, 1);
        let err = pool.acquire().await.err().unwrap();
        assert!(matches!(err, SiteScanError::EngineUnavailable(_)));
        assert_eq!(pool.stats().checked_out, 0);
    }

    #[tokio::test]
    async fn overflow_is_disposed_and_idle_never_exceeds_max() {
        let factory = NullFactory::new();
        let pool = WorkerPool::warm_up(factory.clone(), 2).await;

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        let c = pool.acquire().await.unwrap();
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.stats().overflow_created, 1);
        assert_eq!(pool.stats().checked_out, 3);

        drop(a);
        drop(b);
        drop(c);
        assert_eq!(pool.idle_count(), 2);
        assert_eq!(factory.disposed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().checked_out, 0);
    }

    #[tokio::test]
    async fn acquire_is_lifo() {
        let pool = WorkerPool::new(NullFactory::new(), 2);
        let first = pool.acquire().await.unwrap();
        let first_ptr = first.engine.as_ref().map(|e| &**e as *const dyn RecognitionEngine as *const u8);
        drop(first);
        let again = pool.acquire().await.unwrap();
        let again_ptr = again.engine.as_ref().map(|e| &**e as *const dyn RecognitionEngine as *const u8);
        assert_eq!(first_ptr, again_ptr);
    }

    #[tokio::test]
    async fn cleanup_disposes_all_idle() {
        let factory = NullFactory::new();
        let pool = WorkerPool::warm_up(factory.clone(), 2).await;
        pool.cleanup();
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(factory.disposed.load(Ordering::SeqCst), 2);
        assert_eq!(pool.stats().disposed, 2);
    }

    #[tokio::test]
    async fn poisoned_worker_is_disposed_not_returned() {
        let factory = NullFactory::new();
        let pool = WorkerPool::new(factory.clone(), 2);
        let mut worker = pool.acquire().await.unwrap();
        worker.poisoned = true;
        drop(worker);
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(factory.disposed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_passes_engine_through() {
        let pool = WorkerPool::new(NullFactory::new(), 1);
        let mut worker = pool.acquire().await.unwrap();
        let raw = worker
            .run(|engine| engine.recognize(&DynamicImage::new_rgba8(1, 1)))
            .unwrap();
        assert!(raw.text.is_empty());
        assert!(!worker.poisoned);
    }
}
