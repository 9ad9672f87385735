//! Imaging engine: the worker pool all pixel work runs on, loaded once.

use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{info, warn};

use crate::config;
use crate::error::{OmrError, Result};

/// Worker pool for marker search, warping and sampling.
pub struct Engine {
    pool: ThreadPool,
}

impl Engine {
    /// Build a pool with `threads` workers (0 lets rayon pick).
    pub fn build(threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("omr-engine-{i}"))
            .build()
            .map_err(|e| OmrError::engine_load(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Run `op` inside the pool and wait for it.
    pub fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    /// Run `job` on the pool without waiting.
    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(job);
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("threads", &self.threads())
            .finish()
    }
}

enum LoadState {
    Unloaded,
    Loading,
    Ready(Arc<Engine>),
    Failed(String),
}

type Loader = Box<dyn Fn() -> Result<Engine> + Send + Sync>;

/// Single-flight engine initializer.
///
/// The first caller of [`EngineCell::get`] builds the engine; callers that
/// arrive during the load wait for the same result, up to `timeout`. Success
/// and failure are both memoized until [`EngineCell::reset`].
pub struct EngineCell {
    state: Mutex<LoadState>,
    changed: Condvar,
    timeout: Duration,
    loader: Loader,
}

impl EngineCell {
    pub fn new(threads: usize, timeout: Duration) -> Self {
        Self::with_loader(timeout, move || Engine::build(threads))
    }

    /// Use a custom loader (e.g. to pin the pool differently).
    pub fn with_loader<F>(timeout: Duration, loader: F) -> Self
    where
        F: Fn() -> Result<Engine> + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(LoadState::Unloaded),
            changed: Condvar::new(),
            timeout,
            loader: Box::new(loader),
        }
    }

    /// Get the engine, loading it if nobody has yet.
    pub fn get(&self) -> Result<Arc<Engine>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match &*state {
                LoadState::Ready(engine) => return Ok(Arc::clone(engine)),
                LoadState::Failed(message) => return Err(OmrError::engine_load(message.clone())),
                LoadState::Loading => {
                    let (guard, wait) = self
                        .changed
                        .wait_timeout_while(state, self.timeout, |s| {
                            matches!(s, LoadState::Loading)
                        })
                        .unwrap_or_else(PoisonError::into_inner);
                    state = guard;
                    if wait.timed_out() && matches!(*state, LoadState::Loading) {
                        return Err(OmrError::EngineTimeout {
                            timeout_ms: self.timeout.as_millis() as u64,
                        });
                    }
                }
                LoadState::Unloaded => {
                    *state = LoadState::Loading;
                    drop(state);

                    let loaded = (self.loader)();

                    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                    let result = match loaded {
                        Ok(engine) => {
                            let engine = Arc::new(engine);
                            info!(threads = engine.threads(), "imaging engine ready");
                            *state = LoadState::Ready(Arc::clone(&engine));
                            Ok(engine)
                        }
                        Err(err) => {
                            warn!(error = %err, "imaging engine failed to load");
                            *state = LoadState::Failed(err.to_string());
                            Err(err)
                        }
                    };
                    self.changed.notify_all();
                    return result;
                }
            }
        }
    }

    /// Forget a failed load so the next `get` retries. No effect otherwise.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, LoadState::Failed(_)) {
            *state = LoadState::Unloaded;
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            LoadState::Ready(_)
        )
    }
}

static SHARED: OnceLock<EngineCell> = OnceLock::new();

/// Process-wide engine configured from `OMR_ENGINE_THREADS` and
/// `OMR_ENGINE_TIMEOUT_MS`.
pub fn shared_engine() -> &'static EngineCell {
    SHARED.get_or_init(|| {
        EngineCell::new(
            config::engine_threads(),
            Duration::from_millis(config::engine_timeout_ms()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_load_is_memoized() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let cell = EngineCell::with_loader(Duration::from_secs(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Engine::build(1)
        });

        let a = cell.get().expect("engine");
        let b = cell.get().expect("engine");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(a.install(|| 2 + 2), 4);
    }

    #[test]
    fn test_concurrent_callers_share_one_load() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let cell = Arc::new(EngineCell::with_loader(Duration::from_secs(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            Engine::build(1)
        }));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cell = Arc::clone(&cell);
                thread::spawn(move || cell.get().is_ok())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().expect("thread"));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_is_memoized_until_reset() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let cell = EngineCell::with_loader(Duration::from_secs(5), move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(OmrError::engine_load("no workers"))
            } else {
                Engine::build(1)
            }
        });

        let err = cell.get().expect_err("first load fails");
        assert!(err.is_fatal());
        assert!(cell.get().is_err());
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        cell.reset();
        assert!(cell.get().is_ok());
        assert!(cell.is_ready());
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_waiter_times_out() {
        let cell = Arc::new(EngineCell::with_loader(Duration::from_millis(20), || {
            thread::sleep(Duration::from_millis(300));
            Engine::build(1)
        }));

        let loader = {
            let cell = Arc::clone(&cell);
            thread::spawn(move || cell.get().is_ok())
        };
        thread::sleep(Duration::from_millis(50));
        match cell.get() {
            Err(OmrError::EngineTimeout { timeout_ms }) => assert_eq!(timeout_ms, 20),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(loader.join().expect("thread"));
    }
}
